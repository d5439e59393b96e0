use clap::{ArgAction, CommandFactory, Parser};
use rcon_client::config::Overrides;
use rcon_client::ProtocolError;
use std::path::PathBuf;
use std::process::ExitCode;

const EXAMPLES: &str = "\
Examples:
  rcon -f /etc/rcon.toml -c \"ServerChat Hello\"
  rcon -f /etc/rcon-island.toml -a 127.0.0.1 -p 27162 -c \"Broadcast Hello\"
  rcon -f /etc/rcon-ragnarok.toml -c \"SaveWorld\"
  rcon -f /etc/rcon.toml -c \"ListPlayers\" -p 27160";

/// Send one command to a game server over Source RCON
///
/// `-c`, `-a` and `-p` accept a missing value as empty, so that the absence
/// is reported with that flag's own exit status. `-f` without a value is a
/// parse error, which already exits with the missing-file status.
#[derive(Parser, Debug)]
#[command(name = "rcon", version, disable_help_flag = true, after_help = EXAMPLES)]
pub struct Cli {
    /// Configuration file holding the RCON password
    #[arg(short = 'f', value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Command to send to the server
    #[arg(short = 'c', value_name = "COMMAND", num_args = 0..=1, default_missing_value = "")]
    pub command: Option<String>,

    /// Server IP address (overrides `ipaddress` in the file)
    #[arg(short = 'a', value_name = "IP", num_args = 0..=1, default_missing_value = "")]
    pub address: Option<String>,

    /// Server RCON port (overrides `port` in the file)
    #[arg(short = 'p', value_name = "PORT", num_args = 0..=1, default_missing_value = "")]
    pub port: Option<String>,

    /// Echo resolved parameters and log protocol traffic
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Per-operation socket timeout in milliseconds
    #[arg(short = 't', long = "timeout", value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Print whatever arrived if the response times out
    #[arg(long)]
    pub partial_on_timeout: bool,

    /// Show usage
    #[arg(short = '?', long = "help", action = ArgAction::Help)]
    #[allow(dead_code)]
    help: Option<bool>,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            address: self.address.clone(),
            port: self.port.clone(),
            timeout_ms: self.timeout_ms,
            partial_on_timeout: self.partial_on_timeout,
        }
    }
}

pub fn print_usage() {
    if let Err(e) = Cli::command().print_help() {
        eprintln!("[ERROR] Failed to print usage: {}", e);
    }
    println!();
}

/// Process exit statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    Success = 0,
    MissingFile = 1,
    MissingCommand = 2,
    InvalidAddress = 3,
    InvalidPort = 4,
    BadConfig = 5,
    ConnectFailed = 6,
}

impl ExitStatus {
    /// Status for an argument-parsing failure. `-?` is a usage request and,
    /// like any malformed invocation, exits with 1.
    pub fn for_parse_error(err: &clap::Error) -> Self {
        match err.kind() {
            clap::error::ErrorKind::DisplayVersion => ExitStatus::Success,
            _ => ExitStatus::MissingFile,
        }
    }

    /// Status for a failure while connecting or authenticating.
    pub fn for_connect_error(err: &ProtocolError) -> Self {
        match err {
            // The password from the file cannot be put on the wire
            ProtocolError::Encoding(_) => ExitStatus::BadConfig,
            _ => ExitStatus::ConnectFailed,
        }
    }

    /// Status for a failure while executing the command.
    pub fn for_execute_error(err: &ProtocolError) -> Self {
        match err {
            ProtocolError::Encoding(_) => ExitStatus::MissingCommand,
            _ => ExitStatus::ConnectFailed,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcon_proto::EncodingError;

    #[test]
    fn test_parse_original_flags() {
        let cli = Cli::try_parse_from([
            "rcon", "-f", "/etc/rcon.toml", "-a", "127.0.0.1", "-p", "27015", "-c", "Broadcast Hello", "-v",
        ])
        .unwrap();

        assert_eq!(cli.file, Some(PathBuf::from("/etc/rcon.toml")));
        assert_eq!(cli.command.as_deref(), Some("Broadcast Hello"));
        assert!(cli.verbose);

        let overrides = cli.overrides();
        assert_eq!(overrides.address.as_deref(), Some("127.0.0.1"));
        assert_eq!(overrides.port.as_deref(), Some("27015"));
        assert!(!overrides.partial_on_timeout);
    }

    #[test]
    fn test_file_and_command_optional_at_parse_time() {
        let cli = Cli::try_parse_from(["rcon", "-v"]).unwrap();
        assert!(cli.file.is_none());
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_command_flag_without_value_is_empty() {
        let cli = Cli::try_parse_from(["rcon", "-f", "rcon.toml", "-c"]).unwrap();
        assert_eq!(cli.command.as_deref(), Some(""));
        assert_eq!(cli.file, Some(PathBuf::from("rcon.toml")));

        let cli = Cli::try_parse_from(["rcon", "-c", "-f", "rcon.toml"]).unwrap();
        assert_eq!(cli.command.as_deref(), Some(""));
        assert_eq!(cli.file, Some(PathBuf::from("rcon.toml")));
    }

    #[test]
    fn test_address_and_port_without_value_are_empty() {
        let cli = Cli::try_parse_from(["rcon", "-f", "rcon.toml", "-c", "SaveWorld", "-a", "-p"]).unwrap();
        let overrides = cli.overrides();

        assert_eq!(overrides.address.as_deref(), Some(""));
        assert_eq!(overrides.port.as_deref(), Some(""));
    }

    #[test]
    fn test_parse_error_statuses() {
        let no_file = Cli::try_parse_from(["rcon", "-c", "SaveWorld", "-f"]).unwrap_err();
        assert_eq!(ExitStatus::for_parse_error(&no_file), ExitStatus::MissingFile);

        let help = Cli::try_parse_from(["rcon", "-?"]).unwrap_err();
        assert_eq!(ExitStatus::for_parse_error(&help), ExitStatus::MissingFile);

        let version = Cli::try_parse_from(["rcon", "--version"]).unwrap_err();
        assert_eq!(ExitStatus::for_parse_error(&version), ExitStatus::Success);
    }

    #[test]
    fn test_question_mark_shows_help() {
        let err = Cli::try_parse_from(["rcon", "-?"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_error_exit_statuses() {
        let encoding = ProtocolError::Encoding(EncodingError::EmbeddedNul(0));

        assert_eq!(ExitStatus::for_execute_error(&encoding), ExitStatus::MissingCommand);
        assert_eq!(ExitStatus::for_connect_error(&encoding), ExitStatus::BadConfig);
        assert_eq!(
            ExitStatus::for_connect_error(&ProtocolError::AuthenticationFailed),
            ExitStatus::ConnectFailed
        );
        assert_eq!(
            ExitStatus::for_execute_error(&ProtocolError::ConnectionClosed),
            ExitStatus::ConnectFailed
        );
        assert_eq!(ExitStatus::InvalidPort as u8, 4);
    }
}
