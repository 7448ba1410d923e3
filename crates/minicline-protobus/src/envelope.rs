//! Wire envelopes exchanged between the extension host and the webview.
//!
//! Requests travel webview → host as
//! `{"type":"grpc_request","grpc_request":{service,method,message,request_id}}` and responses
//! travel host → webview as
//! `{"type":"grpc_response","grpc_response":{message?,error?,request_id,sequence_number?}}`.
//! Payloads stay opaque `serde_json::Value`s at this layer.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const GRPC_REQUEST_TYPE: &str = "grpc_request";
pub const GRPC_RESPONSE_TYPE: &str = "grpc_response";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Messages posted from the webview to the extension host.
pub enum WebviewMessage {
    GrpcRequest { grpc_request: GrpcRequest },
}

impl WebviewMessage {
    pub fn grpc_request(request: GrpcRequest) -> Self {
        Self::GrpcRequest {
            grpc_request: request,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Messages posted from the extension host to the webview.
pub enum ExtensionMessage {
    GrpcResponse { grpc_response: GrpcResponse },
}

impl ExtensionMessage {
    pub fn grpc_response(response: GrpcResponse) -> Self {
        Self::GrpcResponse {
            grpc_response: response,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrpcRequest {
    pub service: String,
    pub method: String,
    #[serde(default)]
    pub message: Value,
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrpcResponse {
    /// A present `message` key is a result even when its value is `null`.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub request_id: String,
    /// Reserved for streamed responses; the unary path never sets it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Terminal classification of a response envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponseOutcome<'a> {
    Message(&'a Value),
    Error(&'a str),
    Malformed,
}

impl GrpcResponse {
    pub fn success(request_id: impl Into<String>, message: Value) -> Self {
        Self {
            message: Some(message),
            error: None,
            request_id: request_id.into(),
            sequence_number: None,
        }
    }

    pub fn failure(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            message: None,
            error: Some(error.into()),
            request_id: request_id.into(),
            sequence_number: None,
        }
    }

    /// `message` wins when a peer sets both fields.
    pub fn outcome(&self) -> ResponseOutcome<'_> {
        match (&self.message, &self.error) {
            (Some(message), _) => ResponseOutcome::Message(message),
            (None, Some(error)) => ResponseOutcome::Error(error),
            (None, None) => ResponseOutcome::Malformed,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome(), ResponseOutcome::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("unhandled webview message type: {0}")]
    UnhandledType(String),
    #[error("grpc_request message is missing its grpc_request payload")]
    MissingPayload,
    #[error("{reason}")]
    Malformed {
        request_id: Option<String>,
        reason: String,
    },
}

/// Parses and validates one raw message posted by the webview.
pub fn parse_webview_message(raw: &Value) -> Result<WebviewMessage, EnvelopeError> {
    let kind = match raw.get("type") {
        Some(Value::String(kind)) => kind.as_str(),
        Some(other) => return Err(EnvelopeError::UnhandledType(other.to_string())),
        None => return Err(EnvelopeError::UnhandledType("<missing>".to_string())),
    };
    if kind != GRPC_REQUEST_TYPE {
        return Err(EnvelopeError::UnhandledType(kind.to_string()));
    }
    let payload = match raw.get(GRPC_REQUEST_TYPE) {
        Some(Value::Null) | None => return Err(EnvelopeError::MissingPayload),
        Some(payload) => payload,
    };

    let request =
        GrpcRequest::deserialize(payload).map_err(|error| EnvelopeError::Malformed {
            request_id: best_effort_request_id(raw),
            reason: error.to_string(),
        })?;
    if request.request_id.trim().is_empty() {
        return Err(EnvelopeError::Malformed {
            request_id: None,
            reason: "request_id must be non-empty".to_string(),
        });
    }
    if request.service.trim().is_empty() {
        return Err(EnvelopeError::Malformed {
            request_id: Some(request.request_id),
            reason: "service must be non-empty".to_string(),
        });
    }
    if request.method.trim().is_empty() {
        return Err(EnvelopeError::Malformed {
            request_id: Some(request.request_id),
            reason: "method must be non-empty".to_string(),
        });
    }
    Ok(WebviewMessage::grpc_request(request))
}

/// Recovers a request id from a request that failed validation, byte-for-byte as sent.
pub fn best_effort_request_id(raw: &Value) -> Option<String> {
    raw.get(GRPC_REQUEST_TYPE)
        .and_then(|payload| payload.get("request_id"))
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
}

/// Returns the correlation token of a `grpc_response` envelope, `None` for any other traffic.
pub fn response_request_id(raw: &Value) -> Option<&str> {
    if raw.get("type").and_then(Value::as_str) != Some(GRPC_RESPONSE_TYPE) {
        return None;
    }
    raw.get(GRPC_RESPONSE_TYPE)?
        .get("request_id")
        .and_then(Value::as_str)
}
