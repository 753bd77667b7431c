use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use shared::protocol::{Channel, ClientEmit, ReplyEnvelope};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SyncError;

/// A subscriber callback. Identity is the `Arc` allocation itself:
/// cloning a handle and subscribing it again is a no-op, and
/// unsubscribing requires the same handle that was registered.
pub type ChannelHandler = Arc<dyn Fn(ReplyEnvelope) + Send + Sync>;

fn handler_key(handler: &ChannelHandler) -> usize {
    Arc::as_ptr(handler) as *const () as usize
}

struct Subscriber {
    key: usize,
    handler: ChannelHandler,
}

/// Named multi-subscriber publish/subscribe over the single realtime
/// connection. One registry per session, owned by the connection
/// manager; it never outlives a sign-out.
#[derive(Default)]
pub struct ChannelRegistry {
    subscribers: Mutex<HashMap<Channel, Vec<Subscriber>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `channel`, preserving registration
    /// order. Subscribing the same handle twice is a no-op, so a
    /// consumer that re-mounts without unmounting never receives
    /// duplicate deliveries.
    pub fn subscribe(&self, channel: Channel, handler: ChannelHandler) {
        let key = handler_key(&handler);
        let mut subscribers = self.subscribers.lock().unwrap();
        let entries = subscribers.entry(channel).or_default();
        if entries.iter().any(|entry| entry.key == key) {
            return;
        }
        entries.push(Subscriber { key, handler });
    }

    /// Removes the exact (channel, handle) pair; no-op when absent.
    /// Every consumer must call this on teardown: a leaked handler
    /// keeps applying merges to state nobody owns anymore.
    pub fn unsubscribe(&self, channel: Channel, handler: &ChannelHandler) {
        let key = handler_key(handler);
        let mut subscribers = self.subscribers.lock().unwrap();
        if let Some(entries) = subscribers.get_mut(&channel) {
            entries.retain(|entry| entry.key != key);
            if entries.is_empty() {
                subscribers.remove(&channel);
            }
        }
    }

    /// Delivers a server event to every handler registered for its
    /// channel, in subscription order. The subscriber list is
    /// snapshotted under the lock and invoked outside it, so handlers
    /// may subscribe or unsubscribe reentrantly (one-shot query
    /// handlers do exactly that).
    pub fn publish_incoming(&self, channel: Channel, envelope: ReplyEnvelope) {
        let handlers: Vec<ChannelHandler> = {
            let subscribers = self.subscribers.lock().unwrap();
            match subscribers.get(&channel) {
                Some(entries) => entries.iter().map(|e| Arc::clone(&e.handler)).collect(),
                None => {
                    debug!(channel = channel.as_str(), "event with no subscribers");
                    return;
                }
            }
        };

        for handler in handlers {
            handler(envelope.clone());
        }
    }

    /// Sends a request frame to the server over the bound transport.
    /// Raises `NotConnected` rather than queueing: the caller decides
    /// how to surface the failure.
    pub fn emit(&self, emit: ClientEmit) -> Result<(), SyncError> {
        let frame = serde_json::to_string(&emit).map_err(SyncError::Decode)?;
        let outbound = self.outbound.lock().unwrap();
        let Some(sender) = outbound.as_ref() else {
            return Err(SyncError::NotConnected);
        };
        sender.send(frame).map_err(|_| SyncError::NotConnected)
    }

    /// Attaches the outbound side of a freshly opened connection.
    /// Called only by the connection manager.
    pub(crate) fn bind(&self, sender: mpsc::UnboundedSender<String>) {
        *self.outbound.lock().unwrap() = Some(sender);
    }

    /// Detaches the transport; subscriptions survive so a UI surface
    /// keeps its handlers across a reconnect by the outer layers.
    pub(crate) fn unbind(&self) {
        *self.outbound.lock().unwrap() = None;
    }

    pub fn is_bound(&self) -> bool {
        self.outbound.lock().unwrap().is_some()
    }

    /// Drops every subscription. Part of sign-out teardown: after
    /// this, no stale-identity handler can observe a later session.
    pub fn clear(&self) {
        let mut subscribers = self.subscribers.lock().unwrap();
        if !subscribers.is_empty() {
            warn!(
                channels = subscribers.len(),
                "clearing channel subscriptions at teardown"
            );
        }
        subscribers.clear();
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self, channel: Channel) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(&channel)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
