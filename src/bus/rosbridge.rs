//! rosbridge v2 websocket client
//!
//! Speaks the JSON protocol of a rosbridge server: `advertise` before the
//! first publish on a topic, `publish`, `subscribe` and `unsubscribe`.
//! Reconnection is driven by the caller through [`RosbridgeBus::reconnect`];
//! registered handlers survive it and are subscribed again.

use super::{lock, BusError, MessageBus, MessageHandler, Subscription};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Connection lifecycle notifications
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Error(String),
    Closed,
}

struct Registration {
    id: u64,
    topic: String,
    type_name: String,
    handler: MessageHandler,
}

struct Shared {
    url: String,
    /// Writer channel of the live connection, if any
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    /// Bumped on every (re)connect so a stale reader cannot clear a newer
    /// connection
    epoch: AtomicU64,
    registrations: Mutex<Vec<Registration>>,
    advertised: Mutex<HashSet<String>>,
    events: broadcast::Sender<ConnectionEvent>,
    next_id: AtomicU64,
}

impl Shared {
    fn send(&self, op: Value) -> bool {
        match lock(&self.outbound).as_ref() {
            Some(tx) => tx.send(op.to_string()).is_ok(),
            None => false,
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    fn dispatch(&self, topic: &str, msg: &Value) {
        let handlers: Vec<MessageHandler> = lock(&self.registrations)
            .iter()
            .filter(|r| r.topic == topic)
            .map(|r| r.handler.clone())
            .collect();
        if handlers.is_empty() {
            log::debug!("no handler for inbound message on {}", topic);
        }
        for handler in handlers {
            handler(msg);
        }
    }

    fn connection_lost(&self, epoch: u64) {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        if lock(&self.outbound).take().is_some() {
            log::warn!("connection to {} closed", self.url);
            self.emit(ConnectionEvent::Closed);
        }
    }
}

#[derive(Clone)]
pub struct RosbridgeBus {
    shared: Arc<Shared>,
}

impl RosbridgeBus {
    /// Create a client without connecting
    pub fn new(url: &str) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            shared: Arc::new(Shared {
                url: url.to_string(),
                outbound: Mutex::new(None),
                epoch: AtomicU64::new(0),
                registrations: Mutex::new(Vec::new()),
                advertised: Mutex::new(HashSet::new()),
                events,
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Create a client and open the connection
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let bus = Self::new(url);
        bus.reconnect().await?;
        Ok(bus)
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    /// Drop the current connection (if any) and open a new one
    pub async fn reconnect(&self) -> Result<(), BusError> {
        let shared = &self.shared;
        let epoch = shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&shared.outbound).take();

        let (socket, _) = match connect_async(shared.url.as_str()).await {
            Ok(ok) => ok,
            Err(e) => {
                shared.emit(ConnectionEvent::Error(e.to_string()));
                return Err(BusError::Connect {
                    url: shared.url.clone(),
                    reason: e.to_string(),
                });
            }
        };
        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    log::warn!("websocket write failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let weak: Weak<Shared> = Arc::downgrade(shared);
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                match frame {
                    Ok(Message::Text(text)) => match parse_inbound(&text) {
                        Some((topic, msg)) => shared.dispatch(&topic, &msg),
                        None => log::debug!("ignoring rosbridge frame: {}", text),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        shared.emit(ConnectionEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
            if let Some(shared) = weak.upgrade() {
                shared.connection_lost(epoch);
            }
        });

        lock(&shared.advertised).clear();
        *lock(&shared.outbound) = Some(tx);

        let resubscribe: Vec<Value> = lock(&shared.registrations)
            .iter()
            .map(|r| subscribe_op(&subscription_id(&r.topic, r.id), &r.topic, &r.type_name))
            .collect();
        for op in resubscribe {
            shared.send(op);
        }

        log::info!("connected to {}", shared.url);
        shared.emit(ConnectionEvent::Connected);
        Ok(())
    }

    /// Close the connection; handlers stay registered for a later reconnect
    pub fn disconnect(&self) {
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        if lock(&self.shared.outbound).take().is_some() {
            self.shared.emit(ConnectionEvent::Closed);
        }
    }
}

impl MessageBus for RosbridgeBus {
    fn publish(&self, topic: &str, type_name: &str, payload: Value) -> bool {
        if !self.is_connected() {
            log::warn!("publish to {} failed: not connected", topic);
            return false;
        }
        let first = lock(&self.shared.advertised).insert(topic.to_string());
        if first && !self.shared.send(advertise_op(topic, type_name)) {
            return false;
        }
        self.shared.send(publish_op(topic, payload))
    }

    fn subscribe(&self, topic: &str, type_name: &str, handler: MessageHandler) -> Subscription {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.shared.registrations).push(Registration {
            id,
            topic: topic.to_string(),
            type_name: type_name.to_string(),
            handler,
        });
        let sub_id = subscription_id(topic, id);
        self.shared.send(subscribe_op(&sub_id, topic, type_name));

        let weak = Arc::downgrade(&self.shared);
        let topic = topic.to_string();
        Subscription::new(move || {
            if let Some(shared) = weak.upgrade() {
                lock(&shared.registrations).retain(|r| r.id != id);
                shared.send(unsubscribe_op(&sub_id, &topic));
            }
        })
    }

    fn is_connected(&self) -> bool {
        lock(&self.shared.outbound).is_some()
    }
}

fn subscription_id(topic: &str, id: u64) -> String {
    format!("subscribe:{}:{}", topic, id)
}

pub fn advertise_op(topic: &str, type_name: &str) -> Value {
    json!({ "op": "advertise", "topic": topic, "type": type_name })
}

pub fn publish_op(topic: &str, msg: Value) -> Value {
    json!({ "op": "publish", "topic": topic, "msg": msg })
}

pub fn subscribe_op(id: &str, topic: &str, type_name: &str) -> Value {
    json!({ "op": "subscribe", "id": id, "topic": topic, "type": type_name })
}

pub fn unsubscribe_op(id: &str, topic: &str) -> Value {
    json!({ "op": "unsubscribe", "id": id, "topic": topic })
}

/// Extract `(topic, msg)` from an inbound `publish` frame
pub fn parse_inbound(text: &str) -> Option<(String, Value)> {
    let mut frame: Value = serde_json::from_str(text).ok()?;
    if frame.get("op")?.as_str()? != "publish" {
        return None;
    }
    let topic = frame.get("topic")?.as_str()?.to_string();
    let msg = frame.get_mut("msg")?.take();
    Some((topic, msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_encoding() {
        assert_eq!(
            advertise_op("/diagnostics", "diagnostic_msgs/DiagnosticArray"),
            json!({"op": "advertise", "topic": "/diagnostics", "type": "diagnostic_msgs/DiagnosticArray"})
        );
        assert_eq!(
            publish_op("/t", json!({"data": "x"})),
            json!({"op": "publish", "topic": "/t", "msg": {"data": "x"}})
        );
        let sub = subscribe_op(&subscription_id("/t", 3), "/t", "std_msgs/String");
        assert_eq!(sub["id"], "subscribe:/t:3");
        assert_eq!(unsubscribe_op("subscribe:/t:3", "/t")["op"], "unsubscribe");
    }

    #[test]
    fn test_parse_inbound() {
        let (topic, msg) = parse_inbound(
            r#"{"op":"publish","topic":"/test_confirmation","msg":{"data":"touchscreen_confirmed"}}"#,
        )
        .unwrap();
        assert_eq!(topic, "/test_confirmation");
        assert_eq!(msg["data"], "touchscreen_confirmed");

        assert!(parse_inbound(r#"{"op":"status","level":"error"}"#).is_none());
        assert!(parse_inbound("not json").is_none());
    }

    #[test]
    fn test_unconnected_bus_fails_publish() {
        let bus = RosbridgeBus::new("ws://127.0.0.1:1");
        assert!(!bus.is_connected());
        assert!(!bus.publish("/diagnostics", "diagnostic_msgs/DiagnosticArray", json!({})));

        // Subscribing while offline registers the handler for the next connect
        let sub = bus.subscribe("/t", "std_msgs/String", Arc::new(|_: &Value| {}));
        assert_eq!(lock(&bus.shared.registrations).len(), 1);
        drop(sub);
        assert!(lock(&bus.shared.registrations).is_empty());
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let bus = RosbridgeBus::new("ws://127.0.0.1:1");
        let mut events = bus.events();
        let err = bus.reconnect().await.unwrap_err();
        assert!(matches!(err, BusError::Connect { .. }));
        assert!(matches!(events.recv().await, Ok(ConnectionEvent::Error(_))));
    }
}
