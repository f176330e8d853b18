//! Host-wide behaviour overrides for known-defective guests.
//!
//! Some legacy guests never send the readiness signal. Rather than special
//! casing them inside the mount state machine, the host consults a
//! [`QuirksTable`] of `guest id + version range → behaviour` rules loaded
//! from configuration.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::version::Version;

/// Behaviour a quirk rule applies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuirkBehaviour {
    /// Mark the guest ready as soon as its mount function returns.
    SkipReadinessWait,
}

/// One rule of the quirks table.
///
/// Version bounds are inclusive and compare `major.minor.patch` only. An
/// absent bound is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuirkRule {
    guest_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_version: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_version: Option<Version>,
    behaviour: QuirkBehaviour,
}

impl QuirkRule {
    /// Creates a rule covering every version of `guest_id`.
    #[must_use]
    pub fn new(guest_id: impl Into<String>, behaviour: QuirkBehaviour) -> Self {
        Self {
            guest_id: guest_id.into(),
            min_version: None,
            max_version: None,
            behaviour,
        }
    }

    /// Sets the inclusive lower bound.
    #[must_use]
    pub fn with_min_version(mut self, version: Version) -> Self {
        self.min_version = Some(version);
        self
    }

    /// Sets the inclusive upper bound.
    #[must_use]
    pub fn with_max_version(mut self, version: Version) -> Self {
        self.max_version = Some(version);
        self
    }

    /// Returns the guest this rule targets.
    #[must_use]
    pub const fn guest_id(&self) -> &str {
        self.guest_id.as_str()
    }

    /// Returns the behaviour applied on a match.
    #[must_use]
    pub const fn behaviour(&self) -> QuirkBehaviour {
        self.behaviour
    }

    /// Returns `true` when the rule covers `guest_id` at `version`.
    #[must_use]
    pub fn matches(&self, guest_id: &str, version: &Version) -> bool {
        self.guest_id == guest_id
            && self
                .min_version
                .as_ref()
                .is_none_or(|min| !min.is_newer_than(version))
            && self
                .max_version
                .as_ref()
                .is_none_or(|max| !version.is_newer_than(max))
    }
}

/// Ordered list of quirk rules.
///
/// Serialises as a plain JSON array of rules.
///
/// # Example
///
/// ```
/// use berth_host::quirks::QuirksTable;
/// use berth_host::version::Version;
///
/// let table = QuirksTable::from_json(
///     r#"[{"guest_id": "legacy-quiz", "max_version": "1.4.0",
///          "behaviour": "skip_readiness_wait"}]"#,
/// )
/// .expect("valid table");
/// let old = Version::parse("1.2.0").expect("version");
/// let new = Version::parse("2.0.0").expect("version");
/// assert!(table.skips_readiness_wait("legacy-quiz", &old));
/// assert!(!table.skips_readiness_wait("legacy-quiz", &new));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuirksTable {
    rules: Vec<QuirkRule>,
}

impl QuirksTable {
    /// Creates a table from `rules`.
    #[must_use]
    pub const fn new(rules: Vec<QuirkRule>) -> Self {
        Self { rules }
    }

    /// Parses a table from its JSON array form.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the document is malformed.
    pub fn from_json(document: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(document)
    }

    /// Appends a rule.
    pub fn push(&mut self, rule: QuirkRule) {
        self.rules.push(rule);
    }

    /// Returns the rules in table order.
    #[must_use]
    pub const fn rules(&self) -> &[QuirkRule] {
        self.rules.as_slice()
    }

    /// Returns the number of rules.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` when the table has no rules.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns `true` when any rule grants `behaviour` to `guest_id` at
    /// `version`.
    #[must_use]
    pub fn applies(&self, behaviour: QuirkBehaviour, guest_id: &str, version: &Version) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.behaviour == behaviour && rule.matches(guest_id, version))
    }

    /// Returns `true` when `guest_id` at `version` skips the readiness wait.
    #[must_use]
    pub fn skips_readiness_wait(&self, guest_id: &str, version: &Version) -> bool {
        self.applies(QuirkBehaviour::SkipReadinessWait, guest_id, version)
    }
}

#[cfg(test)]
mod tests;
