//! Structured error reporting sink shared by the pool, the walker and the resolver.

use std::fmt;
use std::sync::Mutex;

use crate::utils::logging;

/// One reported failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub component: String,
    pub context: String,
    pub message: String,
}

/// Capability for reporting failures to an operational backend
pub trait ErrorReporter: Send + Sync + fmt::Debug {
    fn report(&self, component: &str, context: &str, error: &dyn fmt::Display);
}

/// Default reporter that writes to the error log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, component: &str, context: &str, error: &dyn fmt::Display) {
        logging::log_error(&format!("[{}] {}: {}", component, context, error));
    }
}

/// Keeps reports in memory so callers can inspect them
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<ErrorReport>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }

    pub fn count_for(&self, component: &str) -> usize {
        self.reports()
            .iter()
            .filter(|report| report.component == component)
            .count()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, component: &str, context: &str, error: &dyn fmt::Display) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(ErrorReport {
                component: component.to_string(),
                context: context.to_string(),
                message: error.to_string(),
            });
        }
    }
}
