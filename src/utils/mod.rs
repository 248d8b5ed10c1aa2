//! Utilities module for logging and error handling

pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use error::{DermaCareError, ErrorKind, Result};
pub use logging::{init_logging, LogConfig, LogLevel};

/// Format a duration in milliseconds for log output
pub fn format_millis(seconds: f64) -> String {
    if seconds < 1.0 {
        format!("{:.1} ms", seconds * 1000.0)
    } else {
        format!("{:.2} s", seconds)
    }
}
