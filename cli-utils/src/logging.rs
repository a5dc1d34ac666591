use common::eyre::Result;
use common::serde::{Deserialize, Serialize};
use common::strum::{Display, EnumString};

/// The maximum log level to emit, mirroring this codebase's
/// `LoggingLevel`/`LoggingFormat` enum-plus-layer-swap pattern (§10),
/// trimmed to the stderr-only surface this crate's CLI needs.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, EnumString, Deserialize, Serialize,
)]
#[strum(serialize_all = "lowercase", crate = "common::strum")]
#[serde(rename_all = "lowercase", crate = "common::serde")]
pub enum LoggingLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LoggingLevel {
    fn default() -> Self {
        LoggingLevel::Info
    }
}

impl LoggingLevel {
    fn as_filter_directive(&self) -> &'static str {
        match self {
            LoggingLevel::Trace => "trace",
            LoggingLevel::Debug => "debug",
            LoggingLevel::Info => "info",
            LoggingLevel::Warn => "warn",
            LoggingLevel::Error => "error",
        }
    }
}

/// The stderr log format: `Plain` for interactive use, `Json` for
/// ingestion by a log collector (§10).
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, EnumString, Deserialize, Serialize)]
#[strum(serialize_all = "lowercase", crate = "common::strum")]
#[serde(rename_all = "lowercase", crate = "common::serde")]
pub enum LoggingFormat {
    Plain,
    Json,
}

impl Default for LoggingFormat {
    fn default() -> Self {
        LoggingFormat::Plain
    }
}

/// Install the global `tracing` subscriber: an `EnvFilter` seeded from
/// `level` and overridable by `RUST_LOG`, `tracing-error`'s `ErrorLayer` so
/// `eyre` reports carry a span trace, and a plain- or JSON-formatted
/// stderr layer depending on `format` (§10). Must be called at most once,
/// and only from the binary crate's `main` — library crates never install
/// a global subscriber.
pub fn init_logging(level: LoggingLevel, format: LoggingFormat) -> Result<()> {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter_directive()));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default());

    match format {
        LoggingFormat::Json => {
            registry.with(fmt::layer().json().with_writer(std::io::stderr)).init()
        }
        LoggingFormat::Plain => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
    }

    Ok(())
}

/// Install `color-eyre`'s panic hook and report handler (§7). Only the
/// `radiome` binary's `main` calls this; library crates propagate plain
/// `eyre::Result` and never install a process-wide hook.
pub fn install_error_handling() -> Result<()> {
    color_eyre::install()
}
