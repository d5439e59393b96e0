//! Source RCON client: transport, authentication, command execution and
//! the session lifecycle that sequences them.

pub mod config;
pub mod session;
pub mod transport;

mod auth;
mod command;

pub use rcon_proto::{ProtocolError, Result};
pub use session::{Password, Session, SessionOptions, SessionState, TimeoutPolicy};
pub use transport::{Timeouts, Transport};
