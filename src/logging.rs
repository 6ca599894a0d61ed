use anyhow::{Context, Result};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::fs::File;
use std::path::Path;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// USB stack crates that are only interesting when tracing transfers.
const NOISY_TARGETS: &[&str] = &["nusb"];

/// Builds the filter for `speck`. Without `RUST_LOG` the CLI and `speck_lib` log at
/// the verbosity level, while the USB stack stays at `warn` below `-vv`.
fn speck_filter(level: LevelFilter) -> Result<EnvFilter> {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return Ok(EnvFilter::from_default_env());
    }
    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse(format!("speck={level},speck_lib={level}"))
        .context("Invalid log filter")?;
    let usb_level = if level >= LevelFilter::TRACE { level } else { LevelFilter::WARN };
    for target in NOISY_TARGETS {
        filter = filter.add_directive(format!("{target}={usb_level}").parse()?);
    }
    Ok(filter)
}

/// Logs to stderr, keeping stdout for CSV and JSON output. With `log_file` a plain
/// copy including timestamps and targets is written there too.
///
/// The returned guard must live until exit or buffered file output is lost.
pub fn setup_logging(log_file: Option<&Path>, verbosity: &Verbosity<InfoLevel>) -> Result<Option<WorkerGuard>> {
    let level = verbosity.tracing_level_filter();
    // targets only help once per-module debug output is on
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(level >= LevelFilter::DEBUG)
        .without_time();

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(speck_filter(level)?)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file {
        tracing::debug!(path = %path.display(), "Writing log file");
    }
    Ok(guard)
}
