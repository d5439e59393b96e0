mod cli;

use crate::cli::{Cli, ExitStatus};
use clap::Parser;
use rcon_client::config::{RconConfig, ResolveError};
use std::io::Write;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    run().await.into()
}

async fn run() -> ExitStatus {
    if std::env::args_os().len() <= 1 {
        cli::print_usage();
        return ExitStatus::MissingFile;
    }

    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) => {
            if let Err(print_err) = e.print() {
                eprintln!("[ERROR] Failed to print usage: {}", print_err);
            }
            return ExitStatus::for_parse_error(&e);
        }
    };

    init_logging(args.verbose);

    let Some(file) = args.file.as_ref() else {
        cli::print_usage();
        eprintln!("[ERROR] Required file parameter is missing.");
        return ExitStatus::MissingFile;
    };

    if !file.exists() {
        eprintln!("[ERROR] File does not exist: {}", file.display());
        return ExitStatus::BadConfig;
    }

    let Some(command) = args.command.as_deref().filter(|c| !c.is_empty()) else {
        cli::print_usage();
        eprintln!("[ERROR] Required command parameter is missing.");
        return ExitStatus::MissingCommand;
    };

    let config = match RconConfig::from_file(file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[ERROR] Invalid file or format: {:#}", e);
            return ExitStatus::BadConfig;
        }
    };

    let target = match config.resolve(&args.overrides()) {
        Ok(target) => target,
        Err(e) => {
            cli::print_usage();
            eprintln!("[ERROR] {}", e);
            return match e {
                ResolveError::InvalidAddress(_) => ExitStatus::InvalidAddress,
                ResolveError::InvalidPort(_) => ExitStatus::InvalidPort,
            };
        }
    };

    if args.verbose {
        println!(
            "\n[INFO] rconfile:{}, rconip:{}, rconport:{}, rconcmd:{}",
            file.display(),
            target.addr,
            target.port,
            command
        );
    }

    let endpoint = target.to_string();
    let mut session = target.into_session();

    if let Err(e) = session.connect().await {
        eprintln!("[ERROR] Failed to connect to {}: {}", endpoint, e);
        return ExitStatus::for_connect_error(&e);
    }

    let result = session.execute(command).await;
    session.disconnect().await;

    match result {
        Ok(body) => {
            debug!("Received {} response bytes from {}", body.len(), endpoint);
            if let Err(e) = write_response(&body) {
                error!("Failed to write response: {}", e);
            }
            ExitStatus::Success
        }
        Err(e) => {
            eprintln!("[ERROR] Command failed on {}: {}", endpoint, e);
            ExitStatus::for_execute_error(&e)
        }
    }
}

/// Writes the raw response body; game servers are not guaranteed to send UTF-8.
fn write_response(body: &[u8]) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(body)?;
    stdout.write_all(b"\n")?;
    stdout.flush()
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        "warn,rcon=debug,rcon_client=debug,rcon_proto=debug"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}
