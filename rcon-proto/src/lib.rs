pub mod packet;
pub mod framing;

pub use packet::*;
pub use framing::*;

use std::time::Duration;

/// Errors raised while building a packet for the wire.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("body contains an embedded NUL byte at offset {0}")]
    EmbeddedNul(usize),

    #[error("body of {len} bytes exceeds the {max}-byte packet ceiling")]
    BodyTooLarge { len: usize, max: usize },
}

/// Errors raised while parsing bytes received from the wire.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodingError {
    #[error("buffer of {0} bytes is too short to hold a size field")]
    Truncated(usize),

    #[error("declared size {declared} does not match the {available} bytes supplied")]
    SizeMismatch { declared: u32, available: usize },

    #[error("declared size {0} is below the {min}-byte minimum", min = MIN_PACKET_SIZE)]
    SizeTooSmall(u32),

    #[error("declared size {0} exceeds the {1}-byte limit")]
    SizeTooLarge(u32, u32),

    #[error("packet is not terminated by two NUL bytes")]
    MissingTerminator,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Decoding error: {0}")]
    Decoding(#[from] DecodingError),

    #[error("TCP connect failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
        /// Response bytes accumulated before the deadline passed.
        partial: Vec<u8>,
    },

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Authentication failed: password rejected")]
    AuthenticationFailed,

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Session is not authenticated")]
    NotAuthenticated,

    #[error("Request ids exhausted for this session")]
    RequestIdsExhausted,
}

impl ProtocolError {
    /// True for failures that leave the connection in an unknown state.
    ///
    /// Encoding failures and caller misuse are detected before any bytes
    /// are written, so they do not invalidate the stream.
    pub fn poisons_connection(&self) -> bool {
        !matches!(
            self,
            ProtocolError::Encoding(_) | ProtocolError::NotAuthenticated
        )
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
