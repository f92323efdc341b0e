//! Injectable logging (§3a, §6.3, Design Note #5).
//!
//! The runtime logs through this trait rather than calling `tracing` macros directly so that
//! tests can assert on a specific log call having happened (§8 scenario 5: "logger's `error` is
//! called once with a validation message"). The default implementation forwards to `tracing`.

use std::sync::{Arc, Mutex};

/// A logger with the four levels the source's console logger exposes (§6.3).
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Default logger: forwards every call to `tracing`'s equivalent macro.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!("{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }
}

/// A single recorded call to the logger, captured by `RecordingLogger`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: &'static str,
    pub message: String,
}

/// Test-only logger that records every call for assertions. Not gated behind `#[cfg(test)]`
/// since downstream integration tests (in `core/tests/`) need it as a plain dependency.
#[derive(Debug, Default, Clone)]
pub struct RecordingLogger {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().expect("logger mutex poisoned").clone()
    }

    pub fn count(&self, level: &str) -> usize {
        self.records().iter().filter(|r| r.level == level).count()
    }

    fn push(&self, level: &'static str, message: &str) {
        self.records
            .lock()
            .expect("logger mutex poisoned")
            .push(LogRecord { level, message: message.to_string() });
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, message: &str) {
        self.push("debug", message);
    }

    fn info(&self, message: &str) {
        self.push("info", message);
    }

    fn warn(&self, message: &str) {
        self.push("warn", message);
    }

    fn error(&self, message: &str) {
        self.push("error", message);
    }
}

pub type SharedLogger = Arc<dyn Logger>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_logger_captures_calls_by_level() {
        let logger = RecordingLogger::new();
        logger.error("bad payload");
        logger.debug("frame dropped");
        assert_eq!(logger.count("error"), 1);
        assert_eq!(logger.count("debug"), 1);
        assert_eq!(logger.records()[0].message, "bad payload");
    }
}
