//! Inbound message decoding and subscriber fan-out.
//!
//! Frames are JSON envelopes `{ "type": ..., "data": ... }`. A frame that
//! doesn't decode is logged and dropped; it never reaches the channel
//! manager as an error.
//!
//! The dispatcher is a cloneable handle. The registry lock is released
//! before any consumer runs, so consumers may subscribe or unsubscribe
//! (through a clone) from inside their own callback.

use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use tracing::{debug, error, warn};

use super::connection::{ChannelEvent, DisconnectReason};
use super::world::Snapshot;
use crate::error::{ProtocolError, SubscriberError};

/// `type` of a world snapshot push.
pub const SNAPSHOT_TYPE: &str = "map_update";

/// `type` of the server's answer to a liveness probe.
pub const PONG_TYPE: &str = "ping";

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Snapshot(Arc<Snapshot>),
    Pong,
    /// A type this client doesn't know yet.
    Other { kind: String, data: JsonValue },
}

impl Message {
    pub fn kind(&self) -> &str {
        match self {
            Self::Snapshot(_) => SNAPSHOT_TYPE,
            Self::Pong => PONG_TYPE,
            Self::Other { kind, .. } => kind,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: JsonValue,
}

/// Decode one frame.
pub fn decode(raw: &str) -> Result<Message, ProtocolError> {
    let envelope: Envelope =
        serde_json::from_str(raw).map_err(|err| ProtocolError::Malformed(err.to_string()))?;

    match envelope.kind.as_str() {
        SNAPSHOT_TYPE => Ok(Message::Snapshot(Arc::new(Snapshot::from_payload(
            envelope.data,
        )?))),
        PONG_TYPE => Ok(Message::Pong),
        _ => Ok(Message::Other {
            kind: envelope.kind,
            data: envelope.data,
        }),
    }
}

/// Everything a consumer can be told about.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Connected { generation: u64 },
    Disconnected { generation: u64, reason: DisconnectReason },
    RetriesExhausted { attempts: u32 },
    Message(Message),
}

impl SyncEvent {
    /// Lifecycle counterpart of a channel event. Frames have none.
    pub fn from_lifecycle(event: &ChannelEvent) -> Option<Self> {
        match *event {
            ChannelEvent::Connected { generation } => Some(Self::Connected { generation }),
            ChannelEvent::Disconnected { generation, reason } => {
                Some(Self::Disconnected { generation, reason })
            }
            ChannelEvent::RetriesExhausted { attempts } => Some(Self::RetriesExhausted { attempts }),
            ChannelEvent::Frame { .. } => None,
        }
    }
}

/// Event kinds a consumer can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Snapshot,
    Pong,
    /// Every decoded message, including unknown types.
    AnyMessage,
    Connected,
    Disconnected,
    RetriesExhausted,
}

impl Topic {
    pub fn matches(&self, event: &SyncEvent) -> bool {
        match (self, event) {
            (Topic::Snapshot, SyncEvent::Message(Message::Snapshot(_))) => true,
            (Topic::Pong, SyncEvent::Message(Message::Pong)) => true,
            (Topic::AnyMessage, SyncEvent::Message(_)) => true,
            (Topic::Connected, SyncEvent::Connected { .. }) => true,
            (Topic::Disconnected, SyncEvent::Disconnected { .. }) => true,
            (Topic::RetriesExhausted, SyncEvent::RetriesExhausted { .. }) => true,
            _ => false,
        }
    }
}

pub type Predicate = Box<dyn Fn(&SyncEvent) -> bool + Send + Sync>;

pub type Consumer = Box<dyn FnMut(&SyncEvent) -> Result<(), SubscriberError> + Send>;

/// What a subscription listens for.
pub enum Filter {
    Topic(Topic),
    Predicate(Predicate),
}

impl Filter {
    pub fn predicate(f: impl Fn(&SyncEvent) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Box::new(f))
    }

    fn matches(&self, event: &SyncEvent) -> bool {
        match self {
            Filter::Topic(topic) => topic.matches(event),
            Filter::Predicate(predicate) => predicate(event),
        }
    }
}

impl From<Topic> for Filter {
    fn from(topic: Topic) -> Self {
        Filter::Topic(topic)
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Filter::Topic(topic) => f.debug_tuple("Topic").field(topic).finish(),
            Filter::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Handle returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

struct Subscription {
    filter: Arc<Filter>,
    consumer: Arc<Mutex<Consumer>>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscriptions: BTreeMap<u64, Subscription>,
}

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

/// Subscriber registry and fan-out.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, filter: impl Into<Filter>, consumer: F) -> SubscriptionHandle
    where
        F: FnMut(&SyncEvent) -> Result<(), SubscriberError> + Send + 'static,
    {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry.subscriptions.insert(
            id,
            Subscription {
                filter: Arc::new(filter.into()),
                consumer: Arc::new(Mutex::new(Box::new(consumer))),
            },
        );
        SubscriptionHandle(id)
    }

    /// Returns false if the handle was already gone.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        lock(&self.registry)
            .subscriptions
            .remove(&handle.0)
            .is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).subscriptions.len()
    }

    fn is_subscribed(&self, id: u64) -> bool {
        lock(&self.registry).subscriptions.contains_key(&id)
    }

    /// Decode `raw` and publish it. Malformed frames are logged and dropped.
    pub fn route(&self, raw: &str) -> Option<Message> {
        match decode(raw) {
            Ok(message) => {
                self.publish(&SyncEvent::Message(message.clone()));
                Some(message)
            }
            Err(err) => {
                warn!(%err, "dropping inbound frame");
                None
            }
        }
    }

    /// Deliver `event` to every matching subscriber.
    ///
    /// A subscriber that errors or panics is logged and skipped; the rest
    /// still receive the event.
    pub fn publish(&self, event: &SyncEvent) -> Delivery {
        if let SyncEvent::Message(Message::Other { kind, .. }) = event {
            debug!(kind = kind.as_str(), "unknown message type");
        }

        let targets: Vec<(u64, Arc<Filter>, Arc<Mutex<Consumer>>)> = lock(&self.registry)
            .subscriptions
            .iter()
            .map(|(id, sub)| (*id, Arc::clone(&sub.filter), Arc::clone(&sub.consumer)))
            .collect();

        let mut delivery = Delivery::default();
        for (id, filter, consumer) in targets {
            if !filter.matches(event) || !self.is_subscribed(id) {
                continue;
            }

            let mut consumer = match consumer.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    warn!(subscriber = id, "skipping re-entrant delivery");
                    continue;
                }
            };

            match catch_unwind(AssertUnwindSafe(|| (*consumer)(event))) {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(err)) => {
                    delivery.failed += 1;
                    error!(subscriber = id, %err, "subscriber failed");
                }
                Err(_) => {
                    delivery.failed += 1;
                    error!(subscriber = id, "subscriber panicked");
                }
            }
        }
        delivery
    }
}
