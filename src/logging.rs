/// Run logging configuration.
///
/// Logs are stored under the data root in `logs/`.
/// Each run appends to the log file with a clear separator.
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_NAME: &str = "crawler-stats.log";

/// Path of the log file for a data root.
pub fn log_file_path(data_root: &Path) -> PathBuf {
    data_root.join("logs").join(LOG_FILE_NAME)
}

/// Initializes file logging for a run.
///
/// Logs are written to `{data_root}/logs/crawler-stats.log`.
/// Each run starts with a separator containing the timestamp and the command.
///
/// # Arguments
///
/// * `data_root` - Directory holding the local store and logs
/// * `command` - Name of the subcommand, for log context
pub fn init_logging(data_root: &Path, command: &str) -> Result<()> {
    let log_dir = data_root.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    // Write the separator before the subscriber opens the file
    let separator = format!(
        "\n{sep}\n[{ts}] New run: {command}\n{sep}\n",
        sep = "=".repeat(80),
        ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        command = command
    );
    use std::io::Write;
    if let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE_NAME))
    {
        let _ = writeln!(file, "{}", separator);
    }

    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE_NAME);

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false) // No ANSI codes in log files
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true);

    // Default to INFO level, but allow override via RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .ok(); // Ignore error if already initialized

    tracing::info!("Logging initialized for command: {}", command);

    Ok(())
}
