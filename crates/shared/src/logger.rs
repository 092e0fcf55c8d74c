use std::{fs::create_dir_all, io, path::Path};

use thiserror::Error;
use tracing::{Level, subscriber::set_global_default};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{layer::SubscriberExt, registry};

/// Create and set the global loggers, writing rolling log files into `directory`.
///
/// The returned guards must be held for as long as logs should be flushed.
pub fn init_logger(directory: &Path) -> Result<Vec<WorkerGuard>, LoggerError> {
    create_dir_all(directory).map_err(LoggerError::CreateDirectory)?;

    let filter = tracing_subscriber::filter::Targets::new().with_default(Level::INFO);

    // File layer
    let (file_guard, file_layer) = {
        let appender = RollingFileAppender::builder()
            .filename_prefix("runtime-backup")
            .filename_suffix("log")
            .rotation(Rotation::DAILY)
            .max_log_files(90)
            .build(directory)?;

        let (writer, guard) = tracing_appender::non_blocking(appender);

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false);

        (guard, layer)
    };

    // Std layer
    let (std_guard, std_layer) = {
        let (writer, guard) = tracing_appender::non_blocking(io::stdout());

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(true)
            .with_target(false);

        (guard, layer)
    };

    let registry = registry().with(file_layer).with(std_layer).with(filter);

    set_global_default(registry)?;

    Ok(vec![file_guard, std_guard])
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Failed to create rolling appender:\n{0}")]
    CreateRollingAppender(#[from] tracing_appender::rolling::InitError),

    #[error("Failed to create log directory:\n{0}")]
    CreateDirectory(#[source] io::Error),

    #[error("Failed to set the global subscriber:\n{0}")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}
