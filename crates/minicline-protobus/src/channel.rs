//! Broadcast message channel between the extension host and the webview.
//!
//! Every listener registered on an endpoint receives every message posted by the opposite
//! endpoint, exactly once and in post order. Listeners filter for themselves.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::ChannelError;

/// Trait contract for one side of a postMessage-style channel.
pub trait MessagePort: Send + Sync {
    /// Delivers `message` to every listener registered on the other side.
    fn post_message(&self, message: Value) -> Result<(), ChannelError>;

    /// Registers a listener for messages arriving on this side.
    fn add_listener(&self) -> MessageListener;
}

#[derive(Default)]
struct RegistryState {
    listeners: HashMap<u64, mpsc::UnboundedSender<Value>>,
    closed: bool,
}

/// Set of live listeners on one side of a channel.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    state: Mutex<RegistryState>,
}

impl ListenerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a new listener. A listener added after `close` observes `None` immediately.
    pub fn register(self: &Arc<Self>) -> MessageListener {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.lock_state();
        if !state.closed {
            state.listeners.insert(id, sender);
        }
        MessageListener {
            id,
            receiver,
            registry: Some(Arc::downgrade(self)),
        }
    }

    /// Sends `message` to every registered listener and returns how many received it.
    pub fn broadcast(&self, message: &Value) -> Result<usize, ChannelError> {
        let state = self.lock_state();
        if state.closed {
            return Err(ChannelError::Closed);
        }
        let delivered = state
            .listeners
            .values()
            .filter(|sender| sender.send(message.clone()).is_ok())
            .count();
        Ok(delivered)
    }

    /// Drops every registration. Pending messages stay readable, then listeners observe `None`.
    pub fn close(&self) {
        let mut state = self.lock_state();
        state.closed = true;
        state.listeners.clear();
    }

    pub fn listener_count(&self) -> usize {
        self.lock_state().listeners.len()
    }

    fn deregister(&self, id: u64) -> bool {
        self.lock_state().listeners.remove(&id).is_some()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        // A poisoned registry still holds a consistent map; keep serving it.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Registration handle for one listener. Dropping it deregisters the listener.
pub struct MessageListener {
    id: u64,
    receiver: mpsc::UnboundedReceiver<Value>,
    registry: Option<Weak<ListenerRegistry>>,
}

impl std::fmt::Debug for MessageListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageListener")
            .field("id", &self.id)
            .field("registered", &self.registry.is_some())
            .finish()
    }
}

impl MessageListener {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next message. Returns `None` once the channel is closed and drained.
    pub async fn recv(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }

    /// Deregisters the listener now instead of at drop.
    pub fn remove(mut self) {
        self.deregister();
    }

    fn deregister(&mut self) {
        if let Some(registry) = self.registry.take().and_then(|weak| weak.upgrade()) {
            registry.deregister(self.id);
        }
    }
}

impl Drop for MessageListener {
    fn drop(&mut self) {
        self.deregister();
    }
}

/// One side of an in-process channel pair.
#[derive(Clone)]
pub struct ChannelEndpoint {
    label: &'static str,
    local: Arc<ListenerRegistry>,
    remote: Arc<ListenerRegistry>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for ChannelEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelEndpoint")
            .field("label", &self.label)
            .field("listeners", &self.local.listener_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ChannelEndpoint {
    /// Number of listeners currently registered on this side.
    pub fn listener_count(&self) -> usize {
        self.local.listener_count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes both directions of the channel.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(endpoint = self.label, "closing message channel");
        }
        self.local.close();
        self.remote.close();
    }
}

impl MessagePort for ChannelEndpoint {
    fn post_message(&self, message: Value) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        let delivered = self.remote.broadcast(&message)?;
        tracing::trace!(endpoint = self.label, delivered, "posted message");
        Ok(())
    }

    fn add_listener(&self) -> MessageListener {
        self.local.register()
    }
}

/// Constructor for connected in-process endpoint pairs.
pub struct MessageChannel;

impl MessageChannel {
    /// Returns `(host, webview)` endpoints wired to each other.
    pub fn pair() -> (ChannelEndpoint, ChannelEndpoint) {
        let host_listeners = ListenerRegistry::new();
        let webview_listeners = ListenerRegistry::new();
        let closed = Arc::new(AtomicBool::new(false));
        let host = ChannelEndpoint {
            label: "host",
            local: Arc::clone(&host_listeners),
            remote: Arc::clone(&webview_listeners),
            closed: Arc::clone(&closed),
        };
        let webview = ChannelEndpoint {
            label: "webview",
            local: webview_listeners,
            remote: host_listeners,
            closed,
        };
        (host, webview)
    }
}
