//! Default values and environment variable names.

use crate::logging::LogFormat;

/// Log filter used when neither the document nor the environment sets one.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Environment variable overriding [`HostConfig::log_filter`](crate::HostConfig::log_filter).
pub const LOG_FILTER_ENV: &str = "BERTH_LOG_FILTER";

/// Environment variable overriding [`HostConfig::log_format`](crate::HostConfig::log_format).
pub const LOG_FORMAT_ENV: &str = "BERTH_LOG_FORMAT";

/// Owned default filter for serde.
#[must_use]
pub fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default subscriber format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
