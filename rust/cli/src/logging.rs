//! Logging bootstrap for the `kubexm` binary.

use clap::ValueEnum;
use eyre::{Context, Result};
use strum::AsRefStr;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, registry};

/// Setup logging
///
/// # Arguments
///
/// - `level`: The minimum log level for log entries emitted by kubexm
/// - `filter`: The filter to apply to log entries emitted by other crates
/// - `format`: The format to output log entries
pub fn setup(level: LoggingLevel, filter: &str, format: LoggingFormat) -> Result<()> {
    let directives = format!(
        "{}{}{}",
        level.as_ref(),
        if filter.is_empty() { "" } else { "," },
        filter
    );
    let filter_layer = EnvFilter::builder()
        .parse(&directives)
        .wrap_err_with(|| format!("Unable to parse logging filter: {directives}"))?;

    let registry = registry().with(filter_layer).with(ErrorLayer::default());
    let format_layer = fmt::layer().with_writer(std::io::stderr);
    match format {
        LoggingFormat::Compact => registry.with(format_layer.compact()).init(),
        LoggingFormat::Pretty => registry.with(format_layer.pretty()).init(),
        LoggingFormat::Full => registry.with(format_layer).init(),
        LoggingFormat::Json => registry.with(format_layer.json()).init(),
    }

    Ok(())
}

/// A `tracing` log level
#[derive(Debug, Copy, Clone, ValueEnum, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum LoggingLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// A `tracing-subscriber` format
#[derive(Debug, Copy, Clone, ValueEnum, AsRefStr)]
pub enum LoggingFormat {
    Compact,
    Pretty,
    Full,
    Json,
}
