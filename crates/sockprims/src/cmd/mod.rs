use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand};
use sockprims_transport::StopSignal;

use crate::exit::{io_error, signal_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod dgram_listen;
pub mod dgram_send;
pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

/// How often foreground loops re-check the stop signal.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a multiplexed TCP echo server.
    Echo(EchoArgs),
    /// Send one length-prefixed frame over TCP.
    Send(SendArgs),
    /// Accept framed TCP clients and print received frames.
    Listen(ListenArgs),
    /// Send one fragmented message over UDP.
    DgramSend(DgramSendArgs),
    /// Receive fragmented UDP messages and print them.
    DgramListen(DgramListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::DgramSend(args) => dgram_send::run(args, format),
        Command::DgramListen(args) => dgram_listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Address to listen on (port 0 picks one).
    pub addr: SocketAddr,
    /// Maximum bytes per read.
    #[arg(long, default_value_t = sockprims_mux::DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Server address.
    pub addr: SocketAddr,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Wait for one response frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to listen on (port 0 picks one).
    pub addr: SocketAddr,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct DgramSendArgs {
    /// Receiver address.
    pub target: SocketAddr,
    /// Local address to send from.
    #[arg(long, default_value = "0.0.0.0:0", env = "SOCKPRIMS_DGRAM_BIND")]
    pub bind: SocketAddr,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DgramListenArgs {
    /// Address to receive on (port 0 picks one).
    pub addr: SocketAddr,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Drop incomplete messages older than this (e.g. 30s, 500ms).
    #[arg(long)]
    pub message_ttl: Option<String>,
    /// Keep at most N incomplete messages.
    #[arg(long)]
    pub max_pending: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn resolve_payload(data: Option<&str>, file: Option<&Path>) -> CliResult<Vec<u8>> {
    if let Some(data) = data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Flip `stop` on Ctrl-C.
pub fn install_ctrlc_handler(stop: StopSignal) -> CliResult<()> {
    ctrlc::set_handler(move || stop.stop()).map_err(signal_error)
}
