use super::{lock, MessageBus, MessageHandler, Subscription};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A message recorded by [`LocalBus::publish`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub type_name: String,
    pub payload: Value,
}

struct Registration {
    id: u64,
    topic: String,
    handler: MessageHandler,
}

#[derive(Default)]
struct Inner {
    subscribers: Mutex<Vec<Registration>>,
    published: Mutex<Vec<PublishedMessage>>,
    disconnected: AtomicBool,
    next_id: AtomicU64,
}

/// In-process bus: publishes are delivered synchronously to local
/// subscribers and recorded for inspection.
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<Inner>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the transport going away; publishes fail while disconnected
    pub fn set_connected(&self, connected: bool) {
        self.inner.disconnected.store(!connected, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.inner.published).clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<PublishedMessage> {
        lock(&self.inner.published)
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        lock(&self.inner.subscribers)
            .iter()
            .filter(|r| r.topic == topic)
            .count()
    }
}

impl MessageBus for LocalBus {
    fn publish(&self, topic: &str, type_name: &str, payload: Value) -> bool {
        if !self.is_connected() {
            log::warn!("publish to {} dropped: local bus disconnected", topic);
            return false;
        }

        lock(&self.inner.published).push(PublishedMessage {
            topic: topic.to_string(),
            type_name: type_name.to_string(),
            payload: payload.clone(),
        });

        // Handlers run outside the lock so they may subscribe or unsubscribe
        let handlers: Vec<MessageHandler> = lock(&self.inner.subscribers)
            .iter()
            .filter(|r| r.topic == topic)
            .map(|r| r.handler.clone())
            .collect();
        for handler in handlers {
            handler(&payload);
        }
        true
    }

    fn subscribe(&self, topic: &str, _type_name: &str, handler: MessageHandler) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.subscribers).push(Registration {
            id,
            topic: topic.to_string(),
            handler,
        });

        let inner = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                lock(&inner.subscribers).retain(|r| r.id != id);
            }
        })
    }

    fn is_connected(&self) -> bool {
        !self.inner.disconnected.load(Ordering::SeqCst)
    }
}
