//! Logging Module
//!
//! Structured logging utilities built on the `tracing` crate.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use super::error::{DermaCareError, Result};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Verbose config for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Install a global subscriber built from `config`
///
/// Fails if a global subscriber was already set.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| DermaCareError::Config(format!("Failed to initialize logging: {}", e)))
}

/// Logs numbered steps of a multi-step sequence with their durations
pub struct StepLogger {
    operation: String,
    total: usize,
    current: usize,
    step_start: Instant,
    start: Instant,
}

impl StepLogger {
    pub fn new(operation: &str, total: usize) -> Self {
        let now = Instant::now();
        Self {
            operation: operation.to_string(),
            total,
            current: 0,
            step_start: now,
            start: now,
        }
    }

    /// Announce the next step
    pub fn step(&mut self, description: &str) {
        self.current += 1;
        self.step_start = Instant::now();
        tracing::info!(
            "{} [{}/{}]: {}",
            self.operation,
            self.current,
            self.total,
            description
        );
    }

    /// Mark the current step as done
    pub fn done(&self, detail: &str) {
        tracing::debug!(
            "{} [{}/{}]: {} ({:.1} ms)",
            self.operation,
            self.current,
            self.total,
            detail,
            self.step_start.elapsed().as_secs_f64() * 1000.0
        );
    }

    /// Log completion of the whole sequence
    pub fn finish(&self) {
        tracing::info!(
            "{}: completed {} steps in {:.2}s",
            self.operation,
            self.current,
            self.start.elapsed().as_secs_f64()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(LogLevel::Debug.to_tracing_level(), Level::DEBUG);
        assert_eq!(LogLevel::Warn.to_tracing_level(), Level::WARN);
        assert_eq!(LogLevel::Error.to_string(), "ERROR");
    }

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert!(config.ansi_colors);
        assert_eq!(LogConfig::verbose().level, LogLevel::Debug);
    }

    #[test]
    fn test_step_logger_counts() {
        let mut logger = StepLogger::new("Startup", 3);
        logger.step("first");
        logger.done("ok");
        logger.step("second");
        assert_eq!(logger.current, 2);
    }
}
