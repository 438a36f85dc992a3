//! IPC protocol definitions.
//!
//! A JSON-RPC-like protocol: requests flow from display processes to the
//! host, events are pushed from the host to subscribed display processes.

use serde::{Deserialize, Serialize};

/// The push channel carrying store events.
pub const STORE_CHANNEL: &str = "store";

/// IPC method types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    // Store replication
    #[serde(rename = "store.subscribe")]
    StoreSubscribe,
    #[serde(rename = "store.update")]
    StoreUpdate,

    // Capture commands
    #[serde(rename = "capture.area")]
    CaptureArea,
    #[serde(rename = "capture.window")]
    CaptureWindow,
    #[serde(rename = "capture.full_screen")]
    CaptureFullScreen,
    #[serde(rename = "capture.cancel")]
    CaptureCancel,
}

/// Server-push event frame for store subscriptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Frame kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Frame payload: a snapshot for `Init`, a records diff for `Changes`.
    pub data: serde_json::Value,
}

/// Kinds of frames pushed to a subscribed display process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Full snapshot, sent once immediately after subscribing.
    Init,
    /// Incremental diff of locally-originated host changes.
    Changes,
}

impl Event {
    /// Create a new event frame.
    pub fn new(kind: EventKind, data: serde_json::Value) -> Self {
        Self { kind, data }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// IPC request message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation.
    pub id: String,
    /// Method to invoke.
    pub method: Method,
    /// Method parameters (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    /// Create a new request with auto-generated ID.
    pub fn new(method: Method) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method,
            params: None,
        }
    }

    /// Create a new request with parameters.
    pub fn with_params(method: Method, params: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method,
            params: Some(params),
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// IPC response message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Request ID for correlation.
    pub id: String,
    /// Result data (if successful).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error information (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Error information in a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code.
    pub code: i32,
    /// Error message.
    pub message: String,
}

impl Response {
    /// Create a successful response.
    pub fn success(id: &str, result: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: &str, code: i32, message: &str) -> Self {
        Self {
            id: id.to_string(),
            result: None,
            error: Some(ErrorInfo {
                code,
                message: message.to_string(),
            }),
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// Standard error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const NOT_FOUND: i32 = -32002;
    pub const SCHEMA_VIOLATION: i32 = -32010;
}
