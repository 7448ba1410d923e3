use thiserror::Error;

/// Host-side failure converted into an error-carrying response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("Unknown service: {service}")]
    ServiceNotFound { service: String },
    #[error("Unknown rpc: {service}.{method}")]
    MethodNotFound { service: String, method: String },
    #[error("{0}")]
    HandlerFailure(String),
    #[error("malformed grpc_request: {0}")]
    MalformedRequest(String),
}

/// Error raised by a unary handler. The message is forwarded verbatim to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<HandlerError> for RpcError {
    fn from(error: HandlerError) -> Self {
        RpcError::HandlerFailure(error.message)
    }
}

/// Rejected dispatch table construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("service name must be non-empty")]
    EmptyServiceName,
    #[error("method name must be non-empty for service '{service}'")]
    EmptyMethodName { service: String },
    #[error("duplicate handler registration for {service}.{method}")]
    DuplicateHandler { service: String, method: String },
}

/// Failure of the underlying message channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("message channel is closed")]
    Closed,
}

/// Failure observed by a client-side pending call.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("{message}")]
    Remote { request_id: String, message: String },
    #[error("malformed grpc_response for request '{request_id}': neither message nor error is set")]
    MalformedResponse { request_id: String },
    #[error("request '{request_id}' timed out after {timeout_ms}ms")]
    TimedOut { request_id: String, timeout_ms: u64 },
    #[error("message channel closed before request '{request_id}' was answered")]
    ChannelClosed { request_id: String },
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("failed to encode request payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode response payload: {0}")]
    Decode(#[source] serde_json::Error),
}

impl CallError {
    /// Returns the correlation token of the call this error belongs to, when known.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            CallError::Remote { request_id, .. }
            | CallError::MalformedResponse { request_id }
            | CallError::TimedOut { request_id, .. }
            | CallError::ChannelClosed { request_id } => Some(request_id),
            CallError::Channel(_) | CallError::Encode(_) | CallError::Decode(_) => None,
        }
    }
}
