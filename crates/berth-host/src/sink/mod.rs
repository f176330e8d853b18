//! Observability sink for conditions the host tolerates.
//!
//! Every non-fatal condition raised by the router, dispatcher, or mounter is
//! reported here with a source tag naming the reporting component. The
//! default [`TracingSink`] forwards reports to `tracing`; embedding hosts can
//! supply their own implementation.

use std::fmt;

use tracing::{error, info, warn};

/// Tracing target for sink output.
const SINK_TARGET: &str = "berth_host::sink";

/// Source tag used by the host request router.
pub const ROUTER_SOURCE: &str = "Router";
/// Source tag used by the host call dispatcher.
pub const DISPATCHER_SOURCE: &str = "Dispatcher";
/// Source tag used by the guest module lifecycle manager.
pub const MOUNTER_SOURCE: &str = "Mounter";

/// Severity attached to a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Routine lifecycle information.
    Log,
    /// A tolerated condition worth surfacing.
    Warn,
    /// A failure that aborted an operation.
    Error,
    /// A failure the component cannot recover from.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Log => "log",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        })
    }
}

/// Destination for host reports.
pub trait ObservabilitySink {
    /// Records a report from `source`.
    fn report(&self, severity: Severity, source: &str, message: &str);

    /// Records a [`Severity::Log`] report.
    fn log(&self, source: &str, message: &str) {
        self.report(Severity::Log, source, message);
    }

    /// Records a [`Severity::Warn`] report.
    fn warn(&self, source: &str, message: &str) {
        self.report(Severity::Warn, source, message);
    }

    /// Records a [`Severity::Error`] report.
    fn error(&self, source: &str, message: &str) {
        self.report(Severity::Error, source, message);
    }

    /// Records a [`Severity::Fatal`] report.
    fn fatal(&self, source: &str, message: &str) {
        self.report(Severity::Fatal, source, message);
    }
}

/// Sink that emits every report as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn report(&self, severity: Severity, source: &str, message: &str) {
        match severity {
            Severity::Log => info!(target: SINK_TARGET, source, "{message}"),
            Severity::Warn => warn!(target: SINK_TARGET, source, "{message}"),
            Severity::Error => error!(target: SINK_TARGET, source, "{message}"),
            Severity::Fatal => {
                error!(target: SINK_TARGET, source, fatal = true, "{message}");
            }
        }
    }
}

/// A report captured by [`RecordingSink`].
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Severity of the report.
    pub severity: Severity,
    /// Reporting component.
    pub source: String,
    /// Report text.
    pub message: String,
}

/// Sink that keeps every report in memory for assertions.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: std::cell::RefCell<Vec<Report>>,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingSink {
    /// Creates an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every report recorded so far.
    #[must_use]
    pub fn reports(&self) -> Vec<Report> {
        self.reports.borrow().clone()
    }

    /// Returns reports at or above [`Severity::Warn`].
    #[must_use]
    pub fn problems(&self) -> Vec<Report> {
        self.reports
            .borrow()
            .iter()
            .filter(|report| report.severity >= Severity::Warn)
            .cloned()
            .collect()
    }

    /// Returns reports whose message contains `needle`.
    #[must_use]
    pub fn matching(&self, needle: &str) -> Vec<Report> {
        self.reports
            .borrow()
            .iter()
            .filter(|report| report.message.contains(needle))
            .cloned()
            .collect()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ObservabilitySink for RecordingSink {
    fn report(&self, severity: Severity, source: &str, message: &str) {
        tracing::debug!(target: SINK_TARGET, %severity, source, "{message}");
        self.reports.borrow_mut().push(Report {
            severity,
            source: source.to_owned(),
            message: message.to_owned(),
        });
    }
}
