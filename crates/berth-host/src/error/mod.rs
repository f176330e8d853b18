//! Domain errors raised by guest lifecycle and dispatch operations.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. Conditions the host tolerates
//! (unsupported request types, missing call-handles, declined negotiation) are
//! not errors: they are reported through the
//! [`ObservabilitySink`](crate::sink::ObservabilitySink) and dropped.

use thiserror::Error;

/// Errors that abort a host operation such as `mount`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// No released version satisfies the requested `major.minor`.
    #[error("guest '{guest_id}' has no released version matching {major}.{minor}")]
    VersionNotFound {
        /// Guest identity that was resolved against.
        guest_id: String,
        /// Requested major version.
        major: u32,
        /// Requested minor version.
        minor: u32,
    },

    /// Fetching the module descriptor or loading guest code failed.
    #[error("failed to load guest '{guest_id}': {message}")]
    ResourceLoad {
        /// Guest identity being loaded.
        guest_id: String,
        /// Human-readable failure description.
        message: String,
    },

    /// A collaborator required by the guest slot is absent.
    #[error("guest '{guest_id}' slot is missing its {capability}")]
    MissingCapability {
        /// Guest identity owning the slot.
        guest_id: String,
        /// Name of the absent collaborator.
        capability: &'static str,
    },

    /// The guest identity was never registered with the host.
    #[error("guest '{guest_id}' is not registered with the host")]
    NotRegistered {
        /// Guest identity that was looked up.
        guest_id: String,
    },

    /// The guest identity already owns a slot.
    #[error("guest '{guest_id}' is already registered with the host")]
    AlreadyRegistered {
        /// Guest identity that was registered twice.
        guest_id: String,
    },

    /// A later mount or unmount of the same slot took over while this mount
    /// was still loading.
    #[error("mount of guest '{guest_id}' was superseded")]
    Superseded {
        /// Guest identity being mounted.
        guest_id: String,
    },

    /// The readiness wait ended without the guest signalling readiness.
    #[error("guest '{guest_id}' readiness wait was abandoned before the guest became ready")]
    ReadinessAbandoned {
        /// Guest identity being mounted.
        guest_id: String,
    },
}

impl HostError {
    /// Builds a [`HostError::ResourceLoad`] from any displayable cause.
    #[must_use]
    pub fn resource_load(guest_id: &str, cause: impl std::fmt::Display) -> Self {
        Self::ResourceLoad {
            guest_id: guest_id.to_owned(),
            message: cause.to_string(),
        }
    }
}

/// Failures reported by the code/metadata collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The resource could not be retrieved.
    #[error("transport failure for '{url}': {message}")]
    Transport {
        /// Location that was requested.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// The retrieved document could not be parsed.
    #[error("malformed module descriptor: {message}")]
    Parse {
        /// Description of the parse failure.
        message: String,
    },

    /// An entrypoint could not be resolved to an absolute URL.
    #[error("cannot resolve '{reference}': {message}")]
    InvalidUrl {
        /// Asset base URL or entrypoint that failed to resolve.
        reference: String,
        /// Description of the URL error.
        message: String,
    },

    /// The resource was retrieved but failed to execute.
    #[error("code resource '{url}' failed to execute: {message}")]
    Execution {
        /// Location of the code resource.
        url: String,
        /// Description of the failure.
        message: String,
    },
}

/// A guest rejected an outbound call synchronously.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("guest rejected '{request_type}': {message}")]
pub struct GuestCallError {
    /// Type of the rejected request.
    pub request_type: String,
    /// Reason given by the guest.
    pub message: String,
}

impl GuestCallError {
    /// Creates a rejection for the given request type.
    #[must_use]
    pub fn new(request_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_type: request_type.into(),
            message: message.into(),
        }
    }
}

/// Failure raised by an inbound request handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    /// Description of the failure.
    pub message: String,
}

impl HandlerError {
    /// Creates a handler error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
