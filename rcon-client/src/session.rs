use crate::auth;
use crate::command::{self, Exchange};
use crate::transport::{Timeouts, Transport};
use bytes::Bytes;
use rcon_proto::{ProtocolError, Result, DEFAULT_MAX_PACKET_SIZE};
use std::fmt;
use tokio::net::TcpStream;
use tokio::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

/// First request id handed out by a new session. Must stay positive: the
/// server answers a rejected password with id -1.
pub const REQUEST_ID_SEED: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    ConnectedUnauthenticated,
    Authenticated,
}

/// What `execute` does when the response stops arriving before its
/// end-of-response sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Surface `ProtocolError::Timeout`, partial body attached.
    #[default]
    Fail,
    /// Log a warning and return the partial body as the response.
    ReturnPartial,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub timeouts: Timeouts,
    pub timeout_policy: TimeoutPolicy,
    pub max_packet_size: u32,
}

impl SessionOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeouts: Timeouts::uniform(timeout),
            ..Self::default()
        }
    }

    pub fn timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::uniform(DEFAULT_TIMEOUT),
            timeout_policy: TimeoutPolicy::default(),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }
}

/// RCON password. `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

impl From<String> for Password {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One authenticated conversation with an RCON server.
///
/// `connect` opens the socket and authenticates; `execute` may then be
/// called any number of times; `disconnect` closes the socket. Any failure
/// that leaves the stream in an unknown state closes it before the error is
/// returned. Dropping the session also releases the socket.
#[derive(Debug)]
pub struct Session {
    host: String,
    port: u16,
    password: Password,
    options: SessionOptions,
    transport: Option<Transport<TcpStream>>,
    authenticated: bool,
    next_request_id: i32,
}

impl Session {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        password: impl Into<Password>,
        options: SessionOptions,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            options,
            transport: None,
            authenticated: false,
            next_request_id: REQUEST_ID_SEED,
        }
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn state(&self) -> SessionState {
        match (&self.transport, self.authenticated) {
            (None, _) => SessionState::Disconnected,
            (Some(_), false) => SessionState::ConnectedUnauthenticated,
            (Some(_), true) => SessionState::Authenticated,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    /// Connects and authenticates. Reconnects if already connected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            debug!("Reconnecting to {}", self.target());
            self.disconnect().await;
        }

        let auth_id = self.next_request_id()?;

        let transport = Transport::connect(&self.host, self.port, self.options.timeouts)
            .await?
            .with_max_packet_size(self.options.max_packet_size);
        info!("Connected to {}", transport.peer());

        let transport = self.transport.insert(transport);
        match auth::authenticate(transport, auth_id, self.password.expose()).await {
            Ok(()) => {
                self.authenticated = true;
                info!("Authenticated with {}", self.target());
                Ok(())
            }
            Err(e) => {
                self.disconnect().await;
                Err(e)
            }
        }
    }

    /// Runs one command and returns its assembled response body.
    pub async fn execute(&mut self, command: &str) -> Result<Bytes> {
        if !self.is_authenticated() {
            return Err(ProtocolError::NotAuthenticated);
        }

        let exchange = Exchange {
            cmd_id: self.next_request_id()?,
            sentinel_id: self.next_request_id()?,
        };

        let transport = self
            .transport
            .as_mut()
            .ok_or(ProtocolError::NotAuthenticated)?;

        debug!("Executing {:?} (id: {})", command, exchange.cmd_id);
        let result = command::execute(transport, exchange, command).await;

        let err = match result {
            Ok(body) => return Ok(body),
            Err(e) => e,
        };

        if err.poisons_connection() {
            self.disconnect().await;
        }

        match (err, self.options.timeout_policy) {
            (ProtocolError::Timeout { partial, after, .. }, TimeoutPolicy::ReturnPartial) => {
                warn!(
                    "No end-of-response marker from {} within {:?}; returning {} partial bytes",
                    self.target(),
                    after,
                    partial.len()
                );
                Ok(Bytes::from(partial))
            }
            (err, _) => Err(err),
        }
    }

    /// Closes the socket if open and clears authentication. Idempotent.
    pub async fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
            info!("Disconnected from {}", self.target());
        }
        self.authenticated = false;
    }

    fn next_request_id(&mut self) -> Result<i32> {
        let id = self.next_request_id;
        self.next_request_id = id
            .checked_add(1)
            .ok_or(ProtocolError::RequestIdsExhausted)?;
        Ok(id)
    }
}
