//! Message bus transport
//!
//! The orchestrator only ever talks to the bus through [`MessageBus`]:
//! publish a JSON payload, or subscribe a handler and get back a
//! [`Subscription`] that unsubscribes when dropped.

pub mod local;
pub mod rosbridge;

use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

pub use local::LocalBus;
pub use rosbridge::{ConnectionEvent, RosbridgeBus};

/// Callback invoked for every message on a subscribed topic
pub type MessageHandler = Arc<dyn Fn(&Value) + Send + Sync>;

pub trait MessageBus: Send + Sync {
    /// Publish `payload` on `topic`. Returns false when the transport is
    /// unavailable; never retries.
    fn publish(&self, topic: &str, type_name: &str, payload: Value) -> bool;

    /// Register `handler` for `topic` until the returned subscription is
    /// dropped or cancelled
    fn subscribe(&self, topic: &str, type_name: &str, handler: MessageHandler) -> Subscription;

    fn is_connected(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },
}

/// Handle to an active subscription; unsubscribes on drop
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to tear down
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Lock a mutex, recovering the data if a handler panicked while holding it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
