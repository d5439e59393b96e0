use crate::session::{Password, Session, SessionOptions, TimeoutPolicy};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use tokio::time::Duration;

/// Contents of an RCON configuration file.
///
/// ```toml
/// password = "changeme"
/// ipaddress = "127.0.0.1"
/// port = 27015
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RconConfig {
    pub password: String,
    #[serde(default)]
    pub ipaddress: Option<String>,
    #[serde(default)]
    pub port: Option<PortSetting>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Return what arrived instead of failing when a response times out
    #[serde(default)]
    pub partial_on_timeout: bool,
}

/// Port as written in the file: `port = 27015` or `port = "27015"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PortSetting {
    Number(i64),
    Text(String),
}

impl fmt::Display for PortSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSetting::Number(n) => write!(f, "{}", n),
            PortSetting::Text(s) => f.write_str(s),
        }
    }
}

fn default_timeout_ms() -> u64 {
    3000
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub address: Option<String>,
    pub port: Option<String>,
    pub timeout_ms: Option<u64>,
    pub partial_on_timeout: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("IP address is not valid: {0}")]
    InvalidAddress(String),

    #[error("RCON port is not valid: {0}")]
    InvalidPort(String),
}

/// Fully validated connection parameters.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub addr: IpAddr,
    pub port: u16,
    pub password: Password,
    pub options: SessionOptions,
}

impl ResolvedTarget {
    pub fn into_session(self) -> Session {
        Session::new(self.addr.to_string(), self.port, self.password, self.options)
    }
}

impl fmt::Display for ResolvedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addr {
            IpAddr::V4(addr) => write!(f, "{}:{}", addr, self.port),
            IpAddr::V6(addr) => write!(f, "[{}]:{}", addr, self.port),
        }
    }
}

impl RconConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let config: RconConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Applies overrides and validates address and port. An empty override
    /// falls back to the file's value.
    pub fn resolve(&self, overrides: &Overrides) -> Result<ResolvedTarget, ResolveError> {
        let address = overrides
            .address
            .clone()
            .filter(|a| !a.trim().is_empty())
            .or_else(|| self.ipaddress.clone())
            .unwrap_or_default();
        let addr: IpAddr = address
            .trim()
            .parse()
            .map_err(|_| ResolveError::InvalidAddress(address.clone()))?;

        let port_text = overrides
            .port
            .clone()
            .filter(|p| !p.trim().is_empty())
            .or_else(|| self.port.as_ref().map(PortSetting::to_string))
            .unwrap_or_default();
        let port = match port_text.trim().parse::<u16>() {
            Ok(port) if port != 0 => port,
            _ => return Err(ResolveError::InvalidPort(port_text)),
        };

        let timeout = Duration::from_millis(overrides.timeout_ms.unwrap_or(self.timeout_ms));
        let policy = if overrides.partial_on_timeout || self.partial_on_timeout {
            TimeoutPolicy::ReturnPartial
        } else {
            TimeoutPolicy::Fail
        };

        Ok(ResolvedTarget {
            addr,
            port,
            password: Password::from(self.password.clone()),
            options: SessionOptions::with_timeout(timeout).timeout_policy(policy),
        })
    }
}
