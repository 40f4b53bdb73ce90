//! Append-only alert file sink.
//!
//! One alert per line: `timestamp severity message key=value ...`.
//! Writing is best-effort: an unwritable file degrades to a tracing
//! warning and trading continues. Nothing in this module returns an
//! error to its caller.

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Best-effort append-only alert writer.
pub struct AlertSink {
    path: Option<PathBuf>,
    file: Mutex<Option<File>>,
}

impl AlertSink {
    /// Open (or create) the alert file in append mode.
    ///
    /// Open failure is logged and yields a sink that only warns;
    /// alerting must never be able to stop the engine from starting.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(f) => Some(f),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "alert file unavailable, alerts degrade to logs");
                None
            }
        };
        Self {
            path: Some(path),
            file: Mutex::new(file),
        }
    }

    /// A sink that writes nothing (tests, alerting disabled).
    pub fn disabled() -> Self {
        Self {
            path: None,
            file: Mutex::new(None),
        }
    }

    /// Emit an alert line.
    ///
    /// IO errors are swallowed here after a log warning.
    pub fn alert(&self, severity: Severity, message: &str, fields: &[(&str, String)]) {
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut line = format!("{ts} {severity} {message}");
        for (k, v) in fields {
            line.push_str(&format!(" {k}={v}"));
        }

        match severity {
            Severity::Info => tracing::info!(alert = %line, "alert"),
            Severity::Warn => tracing::warn!(alert = %line, "alert"),
            Severity::Critical => tracing::error!(alert = %line, "alert"),
        }

        let mut guard = self.file.lock();
        if let Some(file) = guard.as_mut() {
            if let Err(e) = writeln!(file, "{line}").and_then(|_| file.flush()) {
                warn!(
                    path = ?self.path,
                    error = %e,
                    "failed to write alert line"
                );
            }
        }
    }
}
