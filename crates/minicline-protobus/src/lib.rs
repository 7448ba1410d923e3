//! Unary request/response bus between an editor extension host and its webview.
//!
//! The webview posts `grpc_request` envelopes addressed by `(service, method)` and tagged with
//! a correlation id; the host dispatches them through an immutable [`ServiceHandlers`] table and
//! posts exactly one `grpc_response` per request. Both sides share one broadcast channel, so
//! every [`PendingCall`] filters incoming traffic by its own `request_id`.

pub mod channel;
pub mod client;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod host;

pub use channel::*;
pub use client::*;
pub use dispatch::*;
pub use envelope::*;
pub use error::*;
pub use host::*;
