//! Entrypoint classification and URL resolution.
//!
//! A module descriptor lists entrypoints without saying what they are. The
//! host inspects each file extension: scripts are loaded as code,
//! stylesheets are recorded on the registry entry, and anything else is
//! reported and dropped.

use std::path::Path;

use url::Url;

use crate::error::LoadError;
use crate::sink::{MOUNTER_SOURCE, ObservabilitySink};

/// File extensions loaded as executable code.
const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs"];
/// File extensions recorded as stylesheets.
const STYLE_EXTENSIONS: &[&str] = &["css"];

/// Entrypoints split by resource kind, in descriptor order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionedEntrypoints {
    /// Executable code resources.
    pub scripts: Vec<String>,
    /// Stylesheet resources.
    pub styles: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceKind {
    Script,
    Style,
}

fn classify(entrypoint: &str) -> Option<ResourceKind> {
    let path = entrypoint
        .split(['?', '#'])
        .next()
        .unwrap_or(entrypoint);
    let extension = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    if SCRIPT_EXTENSIONS.contains(&extension.as_str()) {
        Some(ResourceKind::Script)
    } else if STYLE_EXTENSIONS.contains(&extension.as_str()) {
        Some(ResourceKind::Style)
    } else {
        None
    }
}

/// Splits `entrypoints` into scripts and stylesheets.
///
/// Each unrecognised entrypoint produces one report through `sink`.
///
/// # Example
///
/// ```
/// use berth_host::entrypoints::partition;
/// use berth_host::sink::TracingSink;
///
/// let parts = partition("quiz", &["a.js".into(), "b.css".into()], &TracingSink);
/// assert_eq!(parts.scripts, vec!["a.js"]);
/// assert_eq!(parts.styles, vec!["b.css"]);
/// ```
#[must_use]
pub fn partition(
    guest_id: &str,
    entrypoints: &[String],
    sink: &dyn ObservabilitySink,
) -> PartitionedEntrypoints {
    let mut parts = PartitionedEntrypoints::default();
    for entrypoint in entrypoints {
        match classify(entrypoint) {
            Some(ResourceKind::Script) => parts.scripts.push(entrypoint.clone()),
            Some(ResourceKind::Style) => parts.styles.push(entrypoint.clone()),
            None => sink.warn(
                MOUNTER_SOURCE,
                &format!("guest '{guest_id}': unrecognised entrypoint '{entrypoint}' dropped"),
            ),
        }
    }
    parts
}

/// Resolves `entrypoint` against `asset_base_url`.
///
/// Absolute entrypoints are returned unchanged.
///
/// # Errors
///
/// Returns [`LoadError::InvalidUrl`] when the base URL is not absolute or
/// the joined URL is invalid.
pub fn resolve_url(asset_base_url: &str, entrypoint: &str) -> Result<String, LoadError> {
    let base = Url::parse(asset_base_url).map_err(|error| LoadError::InvalidUrl {
        reference: asset_base_url.to_owned(),
        message: format!("invalid asset base URL: {error}"),
    })?;
    base.join(entrypoint)
        .map(String::from)
        .map_err(|error| LoadError::InvalidUrl {
            reference: entrypoint.to_owned(),
            message: format!("invalid entrypoint: {error}"),
        })
}
