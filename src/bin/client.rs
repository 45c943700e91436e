//! Rendezvous Relay Client Binary
//!
//! Usage: rendezvous-client [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>  Path to configuration file
//!   --log-dir <DIR>      Also write logs to a timestamped file in DIR
//!   -h, --help           Print help information

use std::env;
use std::path::PathBuf;

use rendezvous::client::Client;
use rendezvous::config::ConfigFile;
use rendezvous::shutdown::shutdown_signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<String> = None;
    let mut log_dir: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                return Ok(());
            }
            "-c" | "--config" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --config requires a file path");
                    return Ok(());
                }
                config_path = Some(args[i + 1].clone());
                i += 1;
            }
            "--log-dir" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --log-dir requires a directory");
                    return Ok(());
                }
                log_dir = Some(PathBuf::from(&args[i + 1]));
                i += 1;
            }
            other => {
                eprintln!("Unknown option: {}", other);
                print_usage();
                return Ok(());
            }
        }
        i += 1;
    }

    let mut config_file = match &config_path {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };
    config_file.apply_env();
    if log_dir.is_some() {
        config_file.log.dir = log_dir;
    }

    if let Some(path) = rendezvous::logging::init("client", config_file.log.dir.as_deref())? {
        tracing::info!("Writing log to {}", path.display());
    }

    let config = config_file.to_client_config();
    tracing::info!("Forwarding between {} and {}", config.first, config.second);

    match Client::new(config).run_until(shutdown_signal()).await {
        Ok(Some(report)) => {
            tracing::info!(
                "Both directions stopped ({} and {})",
                report.forward.0,
                report.backward.0
            );
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            tracing::error!("Client error: {}", e);
            Err(e.into())
        }
    }
}

fn print_usage() {
    println!(
        r#"Rendezvous Relay Client

Connects to two endpoints and forwards bytes between them.

USAGE:
    rendezvous-client [OPTIONS]

OPTIONS:
    -c, --config <FILE>  Path to configuration file (TOML, [client] section)
    --log-dir <DIR>      Also write logs to a timestamped file in DIR
    -h, --help           Print help information

CONFIGURATION FILE FORMAT:
    [client]
    first = {{ host = "localhost", port = 443 }}
    second = {{ host = "localhost", port = 5432 }}

EXAMPLES:
    Connect with defaults (localhost:443 then localhost:5432):
        rendezvous-client

    Connect using a configuration file:
        rendezvous-client --config relay.toml
"#
    );
}
