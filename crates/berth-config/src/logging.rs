//! Log output formats accepted by the host configuration.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Output format of the global tracing subscriber.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened.
    #[default]
    Json,
    /// Single-line human-readable output for terminals.
    Compact,
}

impl LogFormat {
    /// Parses an override value such as `BERTH_LOG_FORMAT=Compact`.
    ///
    /// Surrounding whitespace is ignored and matching is case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns [`LogFormatParseError`] for names other than `json` and
    /// `compact`.
    pub fn parse_override(value: &str) -> Result<Self, LogFormatParseError> {
        value.trim().parse()
    }
}

/// Error returned when text names no [`LogFormat`].
pub type LogFormatParseError = strum::ParseError;
