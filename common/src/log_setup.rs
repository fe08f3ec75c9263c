use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LogSetupError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    #[error("Failed to create log directory {path}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to create log file appender")]
    Appender(#[from] rolling::InitError),
    #[error("Logging already initialized")]
    AlreadyInitialized,
}

/// Where and how logs are written.
#[derive(Debug, Clone)]
pub struct LogOptions<'a> {
    /// Filter used when `RUST_LOG` is not set, e.g. `"info"` or `"astralign=debug"`.
    pub base_level: &'a str,
    /// Daily-rotated log files go here. `None` disables the file layer.
    pub log_dir: Option<&'a Path>,
    pub file_prefix: &'a str,
}

impl Default for LogOptions<'_> {
    fn default() -> Self {
        Self {
            base_level: "info",
            log_dir: Some(Path::new("logs")),
            file_prefix: "astralign",
        }
    }
}

/// Installs the global subscriber: stdout (warnings and errors go to stderr)
/// plus an optional rolling file. Can succeed only once per process.
pub fn setup_logging(options: &LogOptions<'_>) -> Result<(), LogSetupError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(options.base_level))?;

    let console_writer = std::io::stderr
        .with_max_level(Level::WARN)
        .or_else(std::io::stdout);
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true)
        .with_writer(console_writer);

    let file_layer = match options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| LogSetupError::Directory {
                path: dir.to_path_buf(),
                source,
            })?;

            let file_appender = rolling::Builder::new()
                .rotation(Rotation::DAILY)
                .filename_prefix(options.file_prefix)
                .filename_suffix("log")
                .max_log_files(5)
                .build(dir)?;

            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            LOG_GUARD
                .set(guard)
                .map_err(|_| LogSetupError::AlreadyInitialized)?;

            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_ansi(false)
                    .with_writer(file_writer),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|_| LogSetupError::AlreadyInitialized)
}
