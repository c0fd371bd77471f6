//! The request/response envelope carried over the transport (§4.2).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single request frame. Every field mirrors the wire contract exactly;
/// `params` is left as a loosely-typed object so individual handlers can
/// validate their own shape and raise `INVALID_PARAMS` with a precise
/// message rather than failing generic deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub request_id: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_origin: Option<String>,
    pub capability: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub token: String,
}

/// The `{code, message}` pair carried in a failed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: String,
    pub message: String,
}

/// A single response frame. `request_id` always echoes the request that
/// produced it; a client observing a mismatch must close the connection
/// (Testable Property 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    pub fn ok(request_id: impl Into<String>, result: Value) -> Self {
        Self {
            request_id: request_id.into(),
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(request_id: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ok: false,
            result: None,
            error: Some(ResponseError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}
