//! Rendezvous Relay Server Binary
//!
//! Usage: rendezvous-server [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>   Path to configuration file
//!   --log-dir <DIR>       Also write logs to a timestamped file in DIR
//!   -g, --generate        Print the default configuration
//!   -h, --help            Print help information

use std::env;
use std::path::PathBuf;

use rendezvous::config::ConfigFile;
use rendezvous::server::RelayServer;
use rendezvous::shutdown::shutdown_signal;

fn main() -> anyhow::Result<()> {
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
            "-g" | "--generate" => {
                return generate_config();
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

    if let Some(path) = rendezvous::logging::init("server", config_file.log.dir.as_deref())? {
        tracing::info!("Writing log to {}", path.display());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_server(config_file))
}

fn print_usage() {
    println!(
        r#"Rendezvous Relay Server

Pairs connections arriving on two ports and forwards bytes between them.

USAGE:
    rendezvous-server [OPTIONS]

OPTIONS:
    -c, --config <FILE>     Path to configuration file (TOML)
    --log-dir <DIR>         Also write logs to a timestamped file in DIR
    -g, --generate          Print the default configuration
    -h, --help              Print help information

ENVIRONMENT:
    RENDEZVOUS_HOST, RENDEZVOUS_SERVICE_PORT, RENDEZVOUS_PUBLIC_PORT,
    RENDEZVOUS_LOG_DIR override the configuration file.
    RUST_LOG sets the log filter (default: info).

EXAMPLES:
    Generate a configuration:
        rendezvous-server --generate > relay.toml

    Run with defaults (ports 5432 and 443 on localhost):
        rendezvous-server

    Run with a configuration file:
        rendezvous-server --config relay.toml
"#
    );
}

fn generate_config() -> anyhow::Result<()> {
    let config_file = ConfigFile::default();

    println!("# Rendezvous Relay Configuration");
    println!("# Generated: {}", chrono::Utc::now());
    println!();
    println!("{}", config_file.to_toml()?);

    Ok(())
}

async fn run_server(config_file: ConfigFile) -> anyhow::Result<()> {
    let config = config_file.to_relay_config();

    tracing::info!(
        "Starting relay on {} (ports {} and {})",
        config.host,
        config.service_port,
        config.public_port
    );

    let server = RelayServer::bind(config).await?;
    server.run_until(shutdown_signal()).await?;

    Ok(())
}
