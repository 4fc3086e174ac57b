//! Confirmation gateway
//!
//! Waits for the actuating robot to acknowledge a test on the confirmation
//! topic. At most one wait is outstanding; it resolves on a matching message
//! or on [`ConfirmationGateway::manual_continue`]. A cancelled wait never
//! resolves.

use crate::bus::{lock, MessageBus, MessageHandler, Subscription};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error, PartialEq)]
pub enum GatewayError {
    #[error("already waiting for {expected}")]
    AlreadyPending { expected: String },
}

type Slot = Arc<Mutex<Option<oneshot::Sender<()>>>>;

struct PendingWait {
    expected: String,
    slot: Slot,
    // Held for its Drop
    _subscription: Subscription,
}

impl PendingWait {
    fn is_unresolved(&self) -> bool {
        lock(&self.slot).is_some()
    }
}

pub struct ConfirmationGateway {
    bus: Arc<dyn MessageBus>,
    topic: String,
    type_name: String,
    pending: Option<PendingWait>,
}

impl ConfirmationGateway {
    pub fn new(bus: Arc<dyn MessageBus>, topic: &str, type_name: &str) -> Self {
        Self {
            bus,
            topic: topic.to_string(),
            type_name: type_name.to_string(),
            pending: None,
        }
    }

    /// Subscribe to the confirmation topic and wait for `expected`
    pub fn await_confirmation(&mut self, expected: &str) -> Result<ConfirmationWait, GatewayError> {
        if let Some(pending) = &self.pending {
            if pending.is_unresolved() {
                return Err(GatewayError::AlreadyPending {
                    expected: pending.expected.clone(),
                });
            }
        }
        // A resolved wait still holds its subscription until here
        self.pending = None;

        let (tx, rx) = oneshot::channel();
        let slot: Slot = Arc::new(Mutex::new(Some(tx)));

        let handler_slot = slot.clone();
        let wanted = expected.to_string();
        let handler: MessageHandler = Arc::new(move |msg: &Value| {
            if payload_text(msg) != Some(wanted.as_str()) {
                log::debug!("ignoring confirmation payload {}", msg);
                return;
            }
            if let Some(tx) = lock(&handler_slot).take() {
                log::info!("received {}", wanted);
                let _ = tx.send(());
            }
        });
        let subscription = self.bus.subscribe(&self.topic, &self.type_name, handler);

        self.pending = Some(PendingWait {
            expected: expected.to_string(),
            slot,
            _subscription: subscription,
        });
        Ok(ConfirmationWait { rx })
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(PendingWait::is_unresolved)
    }

    /// Resolve the outstanding wait without a bus message. Returns false
    /// when nothing was waiting.
    pub fn manual_continue(&mut self) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };
        let sender = lock(&pending.slot).take();
        match sender {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Drop the outstanding wait; its future will never resolve
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            if pending.is_unresolved() {
                log::debug!("cancelled wait for {}", pending.expected);
            }
        }
    }
}

impl Drop for ConfirmationGateway {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn payload_text(msg: &Value) -> Option<&str> {
    match msg {
        Value::String(s) => Some(s),
        other => other.get("data").and_then(Value::as_str),
    }
}

/// Future of one confirmation wait.
///
/// Completes when the wait is confirmed. If the gateway cancels the wait the
/// future stays pending forever and the caller is expected to drop it.
#[derive(Debug)]
pub struct ConfirmationWait {
    rx: oneshot::Receiver<()>,
}

impl Future for ConfirmationWait {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(()),
            Poll::Ready(Err(_)) | Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use serde_json::json;
    use std::time::Duration;

    const TOPIC: &str = "/test_confirmation";

    fn gateway(bus: &LocalBus) -> ConfirmationGateway {
        ConfirmationGateway::new(Arc::new(bus.clone()), TOPIC, "std_msgs/String")
    }

    async fn resolves(wait: ConfirmationWait) -> bool {
        tokio::time::timeout(Duration::from_millis(50), wait)
            .await
            .is_ok()
    }

    #[tokio::test]
    async fn test_resolves_on_matching_payload() {
        let bus = LocalBus::new();
        let mut gateway = gateway(&bus);
        let wait = gateway.await_confirmation("touchscreen_confirmed").unwrap();
        assert!(gateway.is_pending());

        bus.publish(TOPIC, "std_msgs/String", json!({"data": "display_confirmed"}));
        assert!(gateway.is_pending());
        bus.publish(TOPIC, "std_msgs/String", json!({"data": "touchscreen_confirmed"}));
        assert!(!gateway.is_pending());
        assert!(resolves(wait).await);
    }

    #[tokio::test]
    async fn test_plain_string_payload_matches() {
        let bus = LocalBus::new();
        let mut gateway = gateway(&bus);
        let wait = gateway.await_confirmation("proximitySensor_confirmed").unwrap();
        bus.publish(TOPIC, "std_msgs/String", json!("proximitySensor_confirmed"));
        assert!(resolves(wait).await);
    }

    #[tokio::test]
    async fn test_manual_continue_resolves() {
        let bus = LocalBus::new();
        let mut gateway = gateway(&bus);
        assert!(!gateway.manual_continue());

        let wait = gateway.await_confirmation("touchscreen_confirmed").unwrap();
        assert!(gateway.manual_continue());
        assert_eq!(bus.subscriber_count(TOPIC), 0);
        assert!(resolves(wait).await);
    }

    #[tokio::test]
    async fn test_second_wait_while_pending_is_rejected() {
        let bus = LocalBus::new();
        let mut gateway = gateway(&bus);
        let _wait = gateway.await_confirmation("touchscreen_confirmed").unwrap();
        assert_eq!(
            gateway.await_confirmation("display_confirmed").unwrap_err(),
            GatewayError::AlreadyPending {
                expected: "touchscreen_confirmed".into()
            }
        );

        // Once resolved, a new wait replaces the old subscription
        bus.publish(TOPIC, "std_msgs/String", json!({"data": "touchscreen_confirmed"}));
        let _next = gateway.await_confirmation("display_confirmed").unwrap();
        assert_eq!(bus.subscriber_count(TOPIC), 1);
    }

    #[tokio::test]
    async fn test_cancelled_wait_never_resolves() {
        let bus = LocalBus::new();
        let mut gateway = gateway(&bus);
        let wait = gateway.await_confirmation("touchscreen_confirmed").unwrap();
        gateway.cancel();
        assert_eq!(bus.subscriber_count(TOPIC), 0);

        bus.publish(TOPIC, "std_msgs/String", json!({"data": "touchscreen_confirmed"}));
        assert!(!resolves(wait).await);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let bus = LocalBus::new();
        let mut gateway = gateway(&bus);
        let _wait = gateway.await_confirmation("touchscreen_confirmed").unwrap();
        drop(gateway);
        assert_eq!(bus.subscriber_count(TOPIC), 0);
    }
}
