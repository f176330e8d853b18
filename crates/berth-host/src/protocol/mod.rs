//! Message envelope shared by outbound dispatch and inbound routing.
//!
//! Every message exchanged with a guest is a [`Request`]: a type
//! discriminator, the payload schema version for that type, and an optional
//! JSON payload. Requests that expect an answer carry a [`CallbackId`] under
//! [`CALLBACK_ID_FIELD`]; the guest answers with an inbound
//! [`CALLBACK_RESULT`] request naming the same id.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Host asks the guest for its protocol version.
pub const GET_APP_HANDLER_VERSION: &str = "GET_APP_HANDLER_VERSION";
/// Payload version of [`GET_APP_HANDLER_VERSION`].
pub const GET_APP_HANDLER_VERSION_V: u32 = 1;

/// Host asks the guest for its per-type payload versions.
pub const GET_APP_PAYLOAD_VERSION: &str = "GET_APP_PAYLOAD_VERSION";
/// Payload version of [`GET_APP_PAYLOAD_VERSION`].
pub const GET_APP_PAYLOAD_VERSION_V: u32 = 2;

/// Guest signals that it finished mounting.
pub const APP_READY: &str = "APP_READY";
/// Payload version of [`APP_READY`].
pub const APP_READY_V: u32 = 1;

/// Guest answers an outstanding callback.
pub const CALLBACK_RESULT: &str = "CALLBACK_RESULT";
/// Payload version of [`CALLBACK_RESULT`].
pub const CALLBACK_RESULT_V: u32 = 1;

/// Payload field naming the callback a request expects to be answered on.
pub const CALLBACK_ID_FIELD: &str = "callback_id";
/// Payload field of [`CALLBACK_RESULT`] carrying the answer.
pub const CALLBACK_VALUE_FIELD: &str = "value";

/// Typed, versioned message exchanged with a guest.
///
/// # Example
///
/// ```
/// use berth_host::protocol::Request;
/// use serde_json::json;
///
/// let request = Request::new("SET_THEME", 2, Some(json!({"theme": "dark"})));
/// assert_eq!(request.kind(), "SET_THEME");
/// assert_eq!(request.version(), 2);
/// let wire = serde_json::to_value(&request).expect("serialise");
/// assert_eq!(wire["type"], "SET_THEME");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "type")]
    kind: String,
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
}

impl Request {
    /// Creates a request.
    #[must_use]
    pub fn new(kind: impl Into<String>, version: u32, payload: Option<Value>) -> Self {
        Self {
            kind: kind.into(),
            version,
            payload,
        }
    }

    /// Creates a request that expects an answer on `callback`.
    ///
    /// The callback id is merged into an object payload; any other payload
    /// shape is wrapped under a `data` field.
    #[must_use]
    pub fn with_callback(
        kind: impl Into<String>,
        version: u32,
        payload: Option<Value>,
        callback: CallbackId,
    ) -> Self {
        let mut fields = match payload {
            Some(Value::Object(fields)) => fields,
            Some(other) => Map::from_iter([(String::from("data"), other)]),
            None => Map::new(),
        };
        fields.insert(CALLBACK_ID_FIELD.to_owned(), Value::from(callback.get()));
        Self::new(kind, version, Some(Value::Object(fields)))
    }

    /// Creates the inbound answer to a callback.
    #[must_use]
    pub fn callback_result(callback: CallbackId, value: Value) -> Self {
        let mut fields = Map::new();
        fields.insert(CALLBACK_ID_FIELD.to_owned(), Value::from(callback.get()));
        fields.insert(CALLBACK_VALUE_FIELD.to_owned(), value);
        Self::new(CALLBACK_RESULT, CALLBACK_RESULT_V, Some(Value::Object(fields)))
    }

    /// Creates the inbound readiness signal.
    #[must_use]
    pub fn ready() -> Self {
        Self::new(APP_READY, APP_READY_V, None)
    }

    /// Returns the type discriminator.
    #[must_use]
    pub const fn kind(&self) -> &str {
        self.kind.as_str()
    }

    /// Returns the payload schema version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Returns the payload, if any.
    #[must_use]
    pub const fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Returns the callback this request expects to be answered on.
    #[must_use]
    pub fn callback_id(&self) -> Option<CallbackId> {
        callback_id_of(self.payload.as_ref())
    }
}

/// Extracts a callback id from a payload.
#[must_use]
pub fn callback_id_of(payload: Option<&Value>) -> Option<CallbackId> {
    payload
        .and_then(|value| value.get(CALLBACK_ID_FIELD))
        .and_then(Value::as_u64)
        .map(CallbackId::new)
}

/// Identifier of an outstanding callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(u64);

impl CallbackId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
