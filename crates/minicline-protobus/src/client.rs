//! Webview side of the bus: turns a unary call into a single-resolution future.

use std::{sync::Arc, time::Duration};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{
    response_request_id, CallError, ExtensionMessage, GrpcRequest, GrpcResponse, MessageListener,
    MessagePort, WebviewMessage,
};

/// What a pending call does with a matching response that carries neither `message` nor `error`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedResponsePolicy {
    /// Log the envelope and keep waiting for a well-formed response.
    #[default]
    LogAndWait,
    /// Fail the call with [`CallError::MalformedResponse`].
    Reject,
}

#[derive(Debug, Clone, Default)]
pub struct ProtoBusClientConfig {
    pub malformed_response_policy: MalformedResponsePolicy,
    /// Applied by [`PendingCall::response`]. `None` waits indefinitely.
    pub default_timeout: Option<Duration>,
}

/// Successful unary result tagged with the originating correlation token.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryResponse {
    pub request_id: String,
    pub message: Value,
}

/// Client stub issuing correlated requests over a shared message port.
#[derive(Clone)]
pub struct ProtoBusClient {
    port: Arc<dyn MessagePort>,
    config: ProtoBusClientConfig,
}

impl std::fmt::Debug for ProtoBusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtoBusClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ProtoBusClient {
    pub fn new(port: Arc<dyn MessagePort>) -> Self {
        Self::with_config(port, ProtoBusClientConfig::default())
    }

    pub fn with_config(port: Arc<dyn MessagePort>, config: ProtoBusClientConfig) -> Self {
        Self { port, config }
    }

    /// Sends one request and returns the call awaiting its response.
    ///
    /// The response listener is registered before the request is posted, so a response can
    /// never arrive ahead of its listener.
    pub fn call(
        &self,
        service: &str,
        method: &str,
        message: Value,
    ) -> Result<PendingCall, CallError> {
        let request_id = Uuid::new_v4().to_string();
        let listener = self.port.add_listener();
        let envelope = WebviewMessage::grpc_request(GrpcRequest {
            service: service.to_string(),
            method: method.to_string(),
            message,
            request_id: request_id.clone(),
        });
        self.port.post_message(envelope.to_value())?;
        debug!(%request_id, service, method, "posted grpc_request");
        Ok(PendingCall {
            request_id,
            rpc_name: format!("{service}.{method}"),
            listener,
            policy: self.config.malformed_response_policy,
            default_timeout: self.config.default_timeout,
        })
    }

    /// Typed unary call: encodes `request`, awaits the response and decodes it.
    pub async fn make_unary_request<Req, Resp>(
        &self,
        service: &str,
        method: &str,
        request: &Req,
    ) -> Result<Resp, CallError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let message = serde_json::to_value(request).map_err(CallError::Encode)?;
        let response = self.call(service, method, message)?.response().await?;
        serde_json::from_value(response.message).map_err(CallError::Decode)
    }
}

/// In-flight call owning its listener registration.
///
/// The registration is released on the first terminal response, on [`PendingCall::cancel`],
/// on timeout, or when the call is dropped.
#[derive(Debug)]
pub struct PendingCall {
    request_id: String,
    rpc_name: String,
    listener: MessageListener,
    policy: MalformedResponsePolicy,
    default_timeout: Option<Duration>,
}

impl PendingCall {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Waits for the matching response, bounded by the configured default timeout.
    pub async fn response(self) -> Result<UnaryResponse, CallError> {
        match self.default_timeout {
            Some(timeout) => self.response_with_timeout(timeout).await,
            None => self.wait().await,
        }
    }

    /// Waits at most `timeout`; on expiry the listener is released and the call fails.
    pub async fn response_with_timeout(
        self,
        timeout: Duration,
    ) -> Result<UnaryResponse, CallError> {
        let request_id = self.request_id.clone();
        let rpc = self.rpc_name.clone();
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(%request_id, %rpc, timeout_ms, "grpc request timed out");
                Err(CallError::TimedOut {
                    request_id,
                    timeout_ms,
                })
            }
        }
    }

    /// Abandons the call and releases its listener.
    pub fn cancel(self) {
        debug!(request_id = %self.request_id, rpc = %self.rpc_name, "cancelled grpc request");
        self.listener.remove();
    }

    async fn wait(self) -> Result<UnaryResponse, CallError> {
        let PendingCall {
            request_id,
            rpc_name,
            mut listener,
            policy,
            ..
        } = self;

        loop {
            let Some(raw) = listener.recv().await else {
                return Err(CallError::ChannelClosed { request_id });
            };
            if response_request_id(&raw) != Some(request_id.as_str()) {
                continue;
            }

            let response = match serde_json::from_value::<ExtensionMessage>(raw.clone()) {
                Ok(ExtensionMessage::GrpcResponse { grpc_response }) => Some(grpc_response),
                Err(decode_error) => {
                    debug!(%request_id, %decode_error, "matching grpc_response failed to decode");
                    None
                }
            };
            match response {
                Some(GrpcResponse {
                    message: Some(message),
                    ..
                }) => {
                    listener.remove();
                    debug!(%request_id, rpc = %rpc_name, "grpc request fulfilled");
                    return Ok(UnaryResponse {
                        request_id,
                        message,
                    });
                }
                Some(GrpcResponse {
                    error: Some(message),
                    ..
                }) => {
                    listener.remove();
                    debug!(%request_id, rpc = %rpc_name, error = %message, "grpc request rejected");
                    return Err(CallError::Remote {
                        request_id,
                        message,
                    });
                }
                _ => {
                    error!(
                        %request_id,
                        rpc = %rpc_name,
                        payload = %raw,
                        "Received ProtoBus message with no response or error"
                    );
                    if policy == MalformedResponsePolicy::Reject {
                        listener.remove();
                        return Err(CallError::MalformedResponse { request_id });
                    }
                }
            }
        }
    }
}
