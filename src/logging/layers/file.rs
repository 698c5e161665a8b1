use crate::logging::config::{FileFormat, LoggingConfig};
use crate::logging::layers::{noop_layer, BoxLayer};
use crate::Result;
use anyhow::{anyhow, Context};
use dirs_next::home_dir;
use std::fs::{create_dir_all, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self as tracing_fmt, writer::BoxMakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

const LOG_FILE_NAME: &str = "cwl2nf.log";

/// Determine the file the logging file sink appends to.
pub fn log_file_path(config: &LoggingConfig, workdir: Option<&Path>) -> Result<PathBuf> {
    let directory = resolve_log_dir(config, workdir)?;
    Ok(directory.join(LOG_FILE_NAME))
}

/// Build a tracing layer that appends to `log_file` via a non-blocking writer.
pub fn file_layer<S>(
    log_file: &Path,
    format: FileFormat,
) -> Result<(BoxLayer<S>, WorkerGuard)>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    ensure_log_dir(log_file)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let writer = BoxMakeWriter::new(move || non_blocking.clone());
    let layer = tracing_fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);
    let layer = match format {
        FileFormat::Text => layer.boxed(),
        FileFormat::Json => layer.json().boxed(),
    };
    Ok((layer, guard))
}

/// Disabled file sink.
pub fn disabled<S>() -> BoxLayer<S>
where
    S: Subscriber + 'static,
{
    noop_layer()
}

fn ensure_log_dir(log_file: &Path) -> Result<()> {
    let directory = log_file.parent().ok_or_else(|| {
        anyhow!(
            "log file path {} has no parent directory",
            log_file.display()
        )
    })?;
    create_dir_all(directory)
        .with_context(|| format!("failed to create log directory {}", directory.display()))?;
    Ok(())
}

fn resolve_log_dir(config: &LoggingConfig, workdir: Option<&Path>) -> Result<PathBuf> {
    let base_dir = match (&config.log_dir, workdir) {
        (Some(custom), _) if custom.is_absolute() => custom.clone(),
        (Some(custom), Some(workdir)) => workdir.join(custom),
        (Some(custom), None) => home_base()?.join(custom),
        (None, Some(workdir)) => workdir.join(".cwl2nf").join("logs"),
        (None, None) => home_base()?.join(".cwl2nf").join("logs"),
    };
    Ok(base_dir)
}

fn home_base() -> Result<PathBuf> {
    home_dir().ok_or_else(|| anyhow!("$HOME directory unavailable"))
}
