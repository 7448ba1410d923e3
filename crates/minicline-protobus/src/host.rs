//! Extension-host side of the bus: answers every webview request with exactly one response.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use futures_util::{stream::FuturesUnordered, FutureExt, StreamExt};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::{
    parse_webview_message, ChannelError, EnvelopeError, ExtensionMessage, GrpcRequest,
    GrpcResponse, MessagePort, RpcError, ServiceHandlers, WebviewMessage,
};

/// Result of handling one raw webview message.
#[derive(Debug, Clone, PartialEq)]
pub enum WebviewMessageOutcome {
    Responded(GrpcResponse),
    Ignored(EnvelopeError),
}

/// Counters accumulated by [`ProtoBusHost::serve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostServeReport {
    pub processed_messages: usize,
    pub responses_sent: usize,
    pub error_responses: usize,
    pub ignored_messages: usize,
    pub post_failures: usize,
}

impl HostServeReport {
    fn record(&mut self, outcome: Result<WebviewMessageOutcome, ChannelError>) {
        match outcome {
            Ok(WebviewMessageOutcome::Responded(response)) => {
                self.responses_sent = self.responses_sent.saturating_add(1);
                if response.is_error() {
                    self.error_responses = self.error_responses.saturating_add(1);
                }
            }
            Ok(WebviewMessageOutcome::Ignored(_)) => {
                self.ignored_messages = self.ignored_messages.saturating_add(1);
            }
            Err(error) => {
                warn!(%error, "failed to post grpc_response to webview");
                self.post_failures = self.post_failures.saturating_add(1);
            }
        }
    }
}

/// Dispatches one request and converts every failure into an error response.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(service = %request.service, method = %request.method, request_id = %request.request_id)
)]
pub async fn resolve_grpc_response<C>(
    controller: Arc<C>,
    handlers: &ServiceHandlers<C>,
    request: GrpcRequest,
) -> GrpcResponse
where
    C: Send + Sync + 'static,
{
    let GrpcRequest {
        service,
        method,
        message,
        request_id,
    } = request;
    match invoke_handler(controller, handlers, &service, &method, message).await {
        Ok(message) => {
            debug!("grpc handler completed");
            GrpcResponse::success(request_id, message)
        }
        Err(error) => {
            warn!(%error, "Protobus error");
            GrpcResponse::failure(request_id, error.to_string())
        }
    }
}

async fn invoke_handler<C>(
    controller: Arc<C>,
    handlers: &ServiceHandlers<C>,
    service: &str,
    method: &str,
    message: Value,
) -> Result<Value, RpcError>
where
    C: Send + Sync + 'static,
{
    let handler = handlers.resolve(service, method)?;
    match AssertUnwindSafe(handler.handle(controller, message))
        .catch_unwind()
        .await
    {
        Ok(result) => result.map_err(RpcError::from),
        Err(panic) => Err(RpcError::HandlerFailure(format!(
            "handler panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Handles one request and posts its response. Exactly one post per call.
pub async fn handle_grpc_request<C>(
    controller: Arc<C>,
    handlers: &ServiceHandlers<C>,
    port: &dyn MessagePort,
    request: GrpcRequest,
) -> Result<GrpcResponse, ChannelError>
where
    C: Send + Sync + 'static,
{
    let response = resolve_grpc_response(controller, handlers, request).await;
    post_response(port, response)
}

fn post_response(
    port: &dyn MessagePort,
    response: GrpcResponse,
) -> Result<GrpcResponse, ChannelError> {
    port.post_message(ExtensionMessage::grpc_response(response.clone()).to_value())?;
    Ok(response)
}

/// Host endpoint bound to a controller, a dispatch table and a message port.
pub struct ProtoBusHost<C> {
    controller: Arc<C>,
    handlers: Arc<ServiceHandlers<C>>,
    port: Arc<dyn MessagePort>,
}

impl<C> Clone for ProtoBusHost<C> {
    fn clone(&self) -> Self {
        Self {
            controller: Arc::clone(&self.controller),
            handlers: Arc::clone(&self.handlers),
            port: Arc::clone(&self.port),
        }
    }
}

impl<C> ProtoBusHost<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(
        controller: Arc<C>,
        handlers: Arc<ServiceHandlers<C>>,
        port: Arc<dyn MessagePort>,
    ) -> Self {
        Self {
            controller,
            handlers,
            port,
        }
    }

    /// Routes one raw message received from the webview.
    pub async fn handle_webview_message(
        &self,
        raw: Value,
    ) -> Result<WebviewMessageOutcome, ChannelError> {
        match parse_webview_message(&raw) {
            Ok(WebviewMessage::GrpcRequest { grpc_request }) => handle_grpc_request(
                Arc::clone(&self.controller),
                &self.handlers,
                self.port.as_ref(),
                grpc_request,
            )
            .await
            .map(WebviewMessageOutcome::Responded),
            Err(EnvelopeError::Malformed {
                request_id: Some(request_id),
                reason,
            }) => {
                let error = RpcError::MalformedRequest(reason);
                warn!(%request_id, %error, "rejecting malformed grpc_request");
                post_response(
                    self.port.as_ref(),
                    GrpcResponse::failure(request_id, error.to_string()),
                )
                .map(WebviewMessageOutcome::Responded)
            }
            Err(envelope_error @ EnvelopeError::UnhandledType(_)) => {
                error!(payload = %raw, "Received unhandled WebviewMessage type");
                Ok(WebviewMessageOutcome::Ignored(envelope_error))
            }
            Err(envelope_error) => {
                warn!(
                    error = %envelope_error,
                    payload = %raw,
                    "dropping uncorrelatable webview message"
                );
                Ok(WebviewMessageOutcome::Ignored(envelope_error))
            }
        }
    }

    /// Pumps webview messages until the channel closes.
    ///
    /// All in-flight requests are multiplexed on the calling task, so a handler that is
    /// waiting on its data source never holds up reading and dispatching later messages.
    pub async fn serve(&self) -> HostServeReport {
        let mut listener = self.port.add_listener();
        let mut in_flight = FuturesUnordered::new();
        let mut report = HostServeReport::default();
        let mut open = true;

        while open || !in_flight.is_empty() {
            tokio::select! {
                incoming = listener.recv(), if open => match incoming {
                    Some(raw) => {
                        report.processed_messages = report.processed_messages.saturating_add(1);
                        in_flight.push(self.handle_webview_message(raw));
                    }
                    None => {
                        debug!(in_flight = in_flight.len(), "webview channel closed");
                        open = false;
                    }
                },
                Some(outcome) = in_flight.next(), if !in_flight.is_empty() => {
                    report.record(outcome);
                }
            }
        }
        report
    }
}
