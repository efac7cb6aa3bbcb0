use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, Layer, Registry};

/// Crates logged at the requested level. Everything else is capped at `warn`.
const SOCKPRIMS_TARGETS: &[&str] = &[
    "sockprims",
    "sockprims_transport",
    "sockprims_mux",
    "sockprims_frame",
    "sockprims_datagram",
    "sockprims_peer",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// `level` for the sockprims crates, `warn` capped by `level` elsewhere.
fn targets(level: LogLevel) -> Targets {
    let level = LevelFilter::from(level);
    let others = level.min(LevelFilter::WARN);
    SOCKPRIMS_TARGETS
        .iter()
        .fold(Targets::new().with_default(others), |targets, name| {
            targets.with_target(*name, level)
        })
}

/// Install the stderr subscriber.
///
/// Event loops and receive loops run on runner threads, so thread names are
/// part of every line.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(false)
            .with_thread_names(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(true)
            .boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(layer)
        .with(targets(level))
        .try_init();
}
