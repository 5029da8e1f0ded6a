//! Error observability seam.
//!
//! Remote check failures are handed to an [`ErrorReporter`] (in production a
//! Sentry-style client) instead of being raised. [`ReportFilter`] drops noise
//! and keeps development builds quiet.

use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Severity of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    /// Degraded but handled.
    Warning,
    /// Needs attention.
    Error,
}

/// An error handed to the observability collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Error message.
    pub message: String,
    /// Severity.
    pub level: ReportLevel,
    /// Diagnostic tags, e.g. `check=vpn`.
    pub tags: BTreeMap<String, String>,
}

impl ErrorReport {
    /// Report with no tags.
    pub fn new(message: impl Into<String>, level: ReportLevel) -> Self {
        Self {
            message: message.into(),
            level,
            tags: BTreeMap::new(),
        }
    }

    /// Add a tag.
    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }
}

/// Receives error reports.
pub trait ErrorReporter: Send + Sync {
    /// Record one report.
    fn report(&self, report: &ErrorReport);
}

/// Reporter that writes reports to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, report: &ErrorReport) {
        match report.level {
            ReportLevel::Warning => warn!(tags = ?report.tags, "{}", report.message),
            ReportLevel::Error => error!(tags = ?report.tags, "{}", report.message),
        }
    }
}

/// Reporter that keeps reports in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<ErrorReport>>,
}

impl RecordingReporter {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything reported so far.
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, report: &ErrorReport) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report.clone());
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Deployment environment name.
    pub environment: &'static str,
    /// Send reports outside production as well.
    pub debug: bool,
    /// Messages containing any of these are dropped.
    pub ignored_messages: &'static [&'static str],
    /// Messages starting with any of these are dropped.
    pub ignored_prefixes: &'static [&'static str],
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            environment: "development",
            debug: false,
            ignored_messages: &[
                "Network Error",
                "Failed to fetch",
                "Load failed",
                "AbortError",
                "The operation was aborted",
            ],
            ignored_prefixes: &["chrome-extension://", "moz-extension://"],
        }
    }
}

/// Drops noisy or out-of-environment reports before they reach the inner
/// reporter.
pub struct ReportFilter<R> {
    config: ObservabilityConfig,
    inner: R,
}

impl<R: ErrorReporter> ReportFilter<R> {
    /// Wrap `inner`.
    pub fn new(config: ObservabilityConfig, inner: R) -> Self {
        Self { config, inner }
    }

    /// Whether `report` would be forwarded.
    pub fn accepts(&self, report: &ErrorReport) -> bool {
        if self.config.environment != "production" && !self.config.debug {
            return false;
        }
        let message = report.message.as_str();
        !self.config.ignored_messages.iter().any(|m| message.contains(m))
            && !self.config.ignored_prefixes.iter().any(|p| message.starts_with(p))
    }

    /// The wrapped reporter.
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: ErrorReporter> ErrorReporter for ReportFilter<R> {
    fn report(&self, report: &ErrorReport) {
        if self.accepts(report) {
            self.inner.report(report);
        } else {
            info!(message = %report.message, "error report filtered");
        }
    }
}
