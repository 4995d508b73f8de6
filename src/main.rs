//! Entry point for `tftp`.
//!
//! Parses CLI arguments and runs exactly one transfer.  All protocol work is
//! delegated to library modules; `main.rs` owns only process setup (logging,
//! argument parsing, exit status).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tftp_client::config::{DEFAULT_MAX_RETRIES, DEFAULT_PORT};
use tftp_client::{client, Mode, TransferConfig};

/// Minimal TFTP client.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Server host name or IP address.
    host: String,

    /// Whether to fetch or send the file.
    #[arg(value_enum)]
    action: Action,

    /// Name of the file on the server.
    filename: String,

    /// Server port number.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Seconds to wait for each datagram.
    #[arg(
        short,
        long,
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: u64,

    /// Retransmissions of one block before an upload gives up.
    #[arg(short, long, default_value_t = DEFAULT_MAX_RETRIES)]
    retries: u32,

    /// Transfer mode written into the request.
    #[arg(short, long, value_enum, default_value_t = CliMode::Netascii)]
    mode: CliMode,

    /// Local path (defaults to FILENAME).
    #[arg(short, long)]
    local: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Action {
    /// Download the file from the server.
    Get,
    /// Upload the file to the server.
    Put,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliMode {
    Netascii,
    Octet,
}

impl From<CliMode> for Mode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Netascii => Mode::Netascii,
            CliMode::Octet => Mode::Octet,
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = TransferConfig::default()
        .with_port(cli.port)
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_max_retries(cli.retries)
        .with_mode(cli.mode.into());
    let local = cli.local.unwrap_or_else(|| PathBuf::from(&cli.filename));

    let stats = match cli.action {
        Action::Get => {
            log::info!("Fetching {} from {}:{}", cli.filename, cli.host, cli.port);
            client::get(&cli.host, &cli.filename, &local, config).await?
        }
        Action::Put => {
            log::info!("Sending {} to {}:{}", local.display(), cli.host, cli.port);
            client::put(&cli.host, &local, &cli.filename, config).await?
        }
    };

    log::info!(
        "Transferred {} bytes in {} blocks ({} retransmits)",
        stats.bytes,
        stats.blocks,
        stats.retransmits
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
