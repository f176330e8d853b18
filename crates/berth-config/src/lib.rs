//! Configuration and telemetry for applications embedding `berth-host`.
//!
//! A [`HostConfig`] is read from a JSON document, then adjusted by the
//! `BERTH_LOG_FILTER` and `BERTH_LOG_FORMAT` environment variables. It
//! carries the log settings consumed by [`telemetry::initialise`] and the
//! host-wide [`QuirksTable`] handed to
//! [`HostServices`](berth_host::HostServices).
//!
//! ```json
//! {
//!   "log_filter": "berth_host=debug",
//!   "log_format": "compact",
//!   "quirks": [
//!     { "guest_id": "quiz", "max_version": "1.4.0", "behaviour": "skip_readiness_wait" }
//!   ]
//! }
//! ```

pub mod defaults;
pub mod logging;
pub mod telemetry;

use std::fs;
use std::io;

use berth_host::{HostServices, QuirksTable};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::logging::{LogFormat, LogFormatParseError};

use self::defaults::{LOG_FILTER_ENV, LOG_FORMAT_ENV, default_log_filter, default_log_format};

/// Errors raised while loading a [`HostConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file '{path}': {source}")]
    Read {
        /// Path that was opened.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The document is not a valid configuration.
    #[error("invalid configuration in {origin}: {source}")]
    Parse {
        /// File path, or `<inline>` for in-memory documents.
        origin: String,
        /// Underlying JSON failure.
        #[source]
        source: serde_json::Error,
    },

    /// An environment override holds an unusable value.
    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidOverride {
        /// Variable name.
        name: &'static str,
        /// Rejected value.
        value: String,
    },

    /// The log filter is empty.
    #[error("log filter must not be empty")]
    EmptyLogFilter,
}

/// Host-wide configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// `tracing-subscriber` filter directive.
    pub log_filter: String,
    /// Subscriber output format.
    pub log_format: LogFormat,
    /// Behaviour overrides for known-defective guests.
    pub quirks: QuirksTable,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            log_format: default_log_format(),
            quirks: QuirksTable::default(),
        }
    }
}

impl HostConfig {
    /// Parses an in-memory JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed documents and
    /// [`ConfigError::EmptyLogFilter`] when `log_filter` is blank.
    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        Self::parse(document, "<inline>")
    }

    /// Reads and parses the JSON document at `path`.
    ///
    /// Environment overrides are not applied; see [`Self::resolve`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, otherwise
    /// as [`Self::from_json_str`].
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let document = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&document, path.as_str())
    }

    /// Loads `path` when given, falling back to defaults, then applies the
    /// process environment.
    ///
    /// # Errors
    ///
    /// As [`Self::load`] and [`Self::apply_env_overrides`].
    pub fn resolve(path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let mut config = path.map_or_else(|| Ok(Self::default()), Self::load)?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies `BERTH_LOG_FILTER` and `BERTH_LOG_FORMAT` as returned by
    /// `lookup`. Unset variables leave the document's values in place.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] for an unknown log format or
    /// a blank filter. The configuration is unchanged on error.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let filter = match lookup(LOG_FILTER_ENV) {
            Some(value) if value.trim().is_empty() => {
                return Err(ConfigError::InvalidOverride {
                    name: LOG_FILTER_ENV,
                    value,
                });
            }
            other => other,
        };
        let format = lookup(LOG_FORMAT_ENV)
            .map(|value| {
                LogFormat::parse_override(&value).map_err(|_| ConfigError::InvalidOverride {
                    name: LOG_FORMAT_ENV,
                    value,
                })
            })
            .transpose()?;

        if let Some(value) = filter {
            self.log_filter = value;
        }
        if let Some(value) = format {
            self.log_format = value;
        }
        Ok(())
    }

    /// Returns the log filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Returns the log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the quirks table.
    #[must_use]
    pub const fn quirks(&self) -> &QuirksTable {
        &self.quirks
    }

    /// Installs this configuration's quirks table into `services`.
    #[must_use]
    pub fn configure(&self, services: HostServices) -> HostServices {
        services.with_quirks(self.quirks.clone())
    }

    fn parse(document: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(document).map_err(|source| ConfigError::Parse {
                origin: origin.to_owned(),
                source,
            })?;
        if config.log_filter.trim().is_empty() {
            return Err(ConfigError::EmptyLogFilter);
        }
        Ok(config)
    }
}
