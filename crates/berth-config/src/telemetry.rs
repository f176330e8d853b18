//! Global tracing subscriber for host applications.
//!
//! [`initialise`] installs one process-wide `fmt` subscriber described by a
//! [`HostConfig`]. Host events carry their module target
//! (`berth_host::mounter`, `berth_host::router`, ...) and the sink's
//! `source` field, so the filter directive can select them per module.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};

use crate::HostConfig;
use crate::logging::LogFormat;

/// Settings of the subscriber that won the installation.
static INSTALLED: OnceCell<TelemetryHandle> = OnceCell::new();

/// Describes the installed subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryHandle {
    filter: String,
    format: LogFormat,
}

impl TelemetryHandle {
    /// Filter directive the subscriber was installed with.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Output format the subscriber was installed with.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The filter directive does not parse.
    #[error("invalid log filter '{directive}': {message}")]
    Filter {
        /// Directive taken from the configuration.
        directive: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Something other than this crate installed a global subscriber first.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Installs the global subscriber described by `config`.
///
/// The first successful call wins. Later calls return the winner's handle
/// and ignore `config`, so callers can compare the two. A failed call
/// installs nothing and may be retried with a corrected configuration.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparsable filter and
/// [`TelemetryError::Subscriber`] when a foreign global subscriber exists.
pub fn initialise(config: &HostConfig) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| -> Result<TelemetryHandle, TelemetryError> {
            tracing::subscriber::set_global_default(build_subscriber(config)?)?;
            Ok(TelemetryHandle {
                filter: config.log_filter().to_owned(),
                format: config.log_format(),
            })
        })
        .cloned()
}

/// Returns the installed subscriber's settings, if any.
#[must_use]
pub fn installed() -> Option<TelemetryHandle> {
    INSTALLED.get().cloned()
}

/// Builds, without installing, the subscriber described by `config`.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparsable filter.
pub fn build_subscriber(
    config: &HostConfig,
) -> Result<Box<dyn Subscriber + Send + Sync>, TelemetryError> {
    let directive = config.log_filter();
    let filter = EnvFilter::try_new(directive).map_err(|error| TelemetryError::Filter {
        directive: directive.to_owned(),
        message: error.to_string(),
    })?;

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());

    Ok(match config.log_format() {
        LogFormat::Json => Box::new(
            builder
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .finish(),
        ),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    })
}
