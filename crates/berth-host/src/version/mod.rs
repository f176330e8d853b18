//! Guest version value object and resolution rules.
//!
//! A [`Version`] is only ever obtained by parsing a `major.minor.patch`
//! string with an optional `-stage[-label]` suffix, so every instance in the
//! host is known to be well formed. Ordering follows the host's "newer than"
//! rule: only `major`, `minor` and `patch` participate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::error::HostError;

/// Release stage of a guest version.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Stage {
    /// Generally available build.
    #[default]
    Released,
    /// Feature-complete preview.
    Beta,
    /// Early preview.
    Alpha,
}

/// Errors produced when parsing a [`Version`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    /// The numeric core did not have exactly three components.
    #[error("version '{input}' must have exactly three dot-separated components")]
    WrongArity {
        /// Text that failed to parse.
        input: String,
    },
    /// A numeric component was not an unsigned integer.
    #[error("version '{input}' has non-numeric component '{component}'")]
    NonNumeric {
        /// Text that failed to parse.
        input: String,
        /// Offending component.
        component: String,
    },
    /// The stage suffix was not recognised.
    #[error("version '{input}' has unknown stage '{stage}'")]
    UnknownStage {
        /// Text that failed to parse.
        input: String,
        /// Offending stage token.
        stage: String,
    },
}

/// Immutable guest version.
///
/// # Example
///
/// ```
/// use berth_host::version::{Stage, Version};
///
/// let version: Version = "1.4.2-beta-rc1".parse().expect("valid version");
/// assert_eq!(version.major(), 1);
/// assert_eq!(version.stage(), Stage::Beta);
/// assert_eq!(version.label(), Some("rc1"));
/// assert_eq!(version.to_string(), "1.4.2-beta-rc1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    major: u32,
    minor: u32,
    patch: u32,
    stage: Stage,
    label: Option<String>,
}

impl Version {
    /// Parses a version string.
    ///
    /// # Errors
    ///
    /// Returns a [`VersionParseError`] when the numeric core is not three
    /// unsigned integers or the stage suffix is unknown.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let (core, suffix) = match input.split_once('-') {
            Some((core, suffix)) => (core, Some(suffix)),
            None => (input, None),
        };

        let components: Vec<&str> = core.split('.').collect();
        let [major, minor, patch] = components.as_slice() else {
            return Err(VersionParseError::WrongArity {
                input: input.to_owned(),
            });
        };

        let (stage, label) = parse_suffix(input, suffix)?;
        Ok(Self {
            major: parse_component(input, major)?,
            minor: parse_component(input, minor)?,
            patch: parse_component(input, patch)?,
            stage,
            label,
        })
    }

    /// Returns the major component.
    #[must_use]
    pub const fn major(&self) -> u32 {
        self.major
    }

    /// Returns the minor component.
    #[must_use]
    pub const fn minor(&self) -> u32 {
        self.minor
    }

    /// Returns the patch component.
    #[must_use]
    pub const fn patch(&self) -> u32 {
        self.patch
    }

    /// Returns the release stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Returns the optional pre-release label.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Returns `true` when the version is a released build.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.stage == Stage::Released
    }

    /// Returns `true` only when `self` is strictly greater than `other` on
    /// `(major, minor, patch)`.
    ///
    /// Stage and label never break ties: two versions differing only in
    /// stage are not newer than each other.
    #[must_use]
    pub const fn is_newer_than(&self, other: &Self) -> bool {
        if self.major > other.major {
            return true;
        }
        if self.major < other.major {
            return false;
        }
        if self.minor > other.minor {
            return true;
        }
        if self.minor < other.minor {
            return false;
        }
        self.patch > other.patch
    }

    /// Returns the newest version in `versions`.
    ///
    /// Versions that are not released are skipped unless their stage equals
    /// `allow_stage`. On ties the earliest candidate wins.
    #[must_use]
    pub fn latest<'a, I>(versions: I, allow_stage: Option<Stage>) -> Option<&'a Self>
    where
        I: IntoIterator<Item = &'a Self>,
    {
        versions
            .into_iter()
            .filter(|v| v.is_released() || allow_stage == Some(v.stage))
            .fold(None, |best: Option<&Self>, candidate| match best {
                Some(current) if !candidate.is_newer_than(current) => Some(current),
                _ => Some(candidate),
            })
    }
}

fn parse_component(input: &str, component: &str) -> Result<u32, VersionParseError> {
    let non_numeric = || VersionParseError::NonNumeric {
        input: input.to_owned(),
        component: component.to_owned(),
    };
    // `u32::from_str` accepts a leading `+`.
    if component.is_empty() || !component.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(non_numeric());
    }
    component.parse::<u32>().map_err(|_| non_numeric())
}

fn parse_suffix(
    input: &str,
    suffix: Option<&str>,
) -> Result<(Stage, Option<String>), VersionParseError> {
    let Some(text) = suffix else {
        return Ok((Stage::Released, None));
    };
    let (stage_text, label) = match text.split_once('-') {
        Some((stage_text, label)) if !label.is_empty() => (stage_text, Some(label.to_owned())),
        Some((stage_text, _)) => (stage_text, None),
        None => (text, None),
    };
    let stage = Stage::from_str(stage_text).map_err(|_| VersionParseError::UnknownStage {
        input: input.to_owned(),
        stage: stage_text.to_owned(),
    })?;
    Ok((stage, label))
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.stage != Stage::Released {
            write!(f, "-{}", self.stage)?;
        }
        if let Some(label) = &self.label {
            write!(f, "-{label}")?;
        }
        Ok(())
    }
}

/// Picks the version to mount for a requested `major.minor`.
///
/// Exact `major.minor` matches win with the highest patch. Otherwise the
/// highest `(minor, patch)` sharing `major` is chosen. Only released versions
/// are considered.
///
/// # Errors
///
/// Returns [`HostError::VersionNotFound`] when neither tier matches.
pub fn resolve<'a, I>(
    guest_id: &str,
    available: I,
    major: u32,
    minor: u32,
) -> Result<Version, HostError>
where
    I: IntoIterator<Item = &'a Version>,
    I::IntoIter: Clone,
{
    let candidates = available.into_iter();
    let exact = Version::latest(
        candidates
            .clone()
            .filter(|v| v.major == major && v.minor == minor),
        None,
    );
    exact
        .or_else(|| Version::latest(candidates.filter(|v| v.major == major), None))
        .cloned()
        .ok_or_else(|| HostError::VersionNotFound {
            guest_id: guest_id.to_owned(),
            major,
            minor,
        })
}
