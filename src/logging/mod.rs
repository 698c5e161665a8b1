pub mod config;
pub mod context;
pub mod layers;

pub use context::{detect_context, ExecutionContext};
pub use layers::console::ConsoleOutput;

use crate::cli::Args;
use crate::logging::config::LoggingConfig;
use crate::logging::layers::{console, file, BoxLayer};
use crate::Result;
use anyhow::{anyhow, Context};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Guards that keep logging sinks active for the duration of the command.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
    console_output: ConsoleOutput,
    log_file_path: Option<PathBuf>,
}

impl LoggingGuard {
    /// Returns the console output configuration used during initialization.
    pub fn console_output(&self) -> ConsoleOutput {
        self.console_output
    }

    /// Returns the log file path backed by the file sink, when it is enabled.
    pub fn log_file_path(&self) -> Option<&Path> {
        self.log_file_path.as_deref()
    }
}

/// Initialize the logging framework for the parsed command line.
///
/// Filters, the optional file sink and the console sink are configured with deterministic
/// precedence. It errors when invoked more than once per process.
pub fn init(args: &Args) -> Result<LoggingGuard> {
    if LOGGER_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(anyhow!("logging already initialized"));
    }

    let context = detect_context(&args.command);
    let workdir = env::current_dir().ok();
    let config = LoggingConfig::load(workdir.as_deref(), args.verbose)?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_level))
        .context("failed to configure tracing level")?;

    let mut sinks: Vec<BoxLayer<Registry>> = Vec::with_capacity(2);
    let (file_guard, log_file_path) = if config.enable_file {
        let path = file::log_file_path(&config, workdir.as_deref())?;
        let (layer, guard) = file::file_layer::<Registry>(&path, config.file_format)?;
        sinks.push(layer);
        (Some(guard), Some(path))
    } else {
        sinks.push(file::disabled());
        (None, None)
    };

    let console_output = console::select_console_output(context, config.console_output, args.quiet);
    sinks.push(console::console_layer::<Registry>(console_output));

    tracing_subscriber::registry()
        .with(sinks)
        .with(env_filter)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        console_output,
        log_file_path,
    })
}
