//! Client-side state for the Minute Empire push channel.
//!
//! This module provides the core state types and managers:
//!
//! - `link` - Connection state machine (validated transitions)
//! - `connection` - Channel manager: connect, keep-alive, reconnect
//! - `dispatch` - Inbound decoding and subscriber fan-out
//! - `world` - Snapshot model and the world store
//! - `clock` - Injectable clocks and server time reconciliation
//! - `grid` / `legality` - Map bounds and per-unit move/attack spots
//! - `command` - Troop command composition
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                             SyncClient                               │
//! │                                                                      │
//! │  ┌──────────────────┐   frames   ┌──────────────────┐                │
//! │  │  ChannelManager  │ ─────────▶ │  decode + guard  │                │
//! │  │                  │            │  (generation)    │                │
//! │  │  Transport       │            └────────┬─────────┘                │
//! │  │  LinkState       │                     │ map_update               │
//! │  │  keep-alive      │                     ▼                          │
//! │  │  reconnect       │            ┌──────────────────┐                │
//! │  └────────┬─────────┘            │    WorldStore    │ ◀── legality   │
//! │           │ lifecycle            │  Arc<Snapshot>   │     queries    │
//! │           ▼                      │  ClockReconciler │                │
//! │  ┌──────────────────┐            └────────┬─────────┘                │
//! │  │ EventDispatcher  │ ◀───────────────────┘ published after apply    │
//! │  │  subscribers     │                                                │
//! │  └──────────────────┘                                                │
//! │                                                                      │
//! │  Disconnected ──▶ Connecting ──▶ Open ──▶ Closing ──▶ Disconnected   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All mutation happens inside [`SyncClient::poll`], `connect` and
//! `disconnect`. Subscribers run on the caller's thread, after the world
//! store already reflects the message they are told about.
//!
//! # Usage
//!
//! ```rust,ignore
//! use minute_empire_sync::{ClientConfig, SyncClient, Topic, WsTransport};
//!
//! let config = ClientConfig::default();
//! let mut client = SyncClient::new(WsTransport::new(), &config);
//! client.subscribe(Topic::Snapshot, |event| {
//!     println!("{event:?}");
//!     Ok(())
//! });
//! client.connect("token")?;
//! loop {
//!     client.poll()?;
//! }
//! ```

pub mod clock;
pub mod command;
pub mod connection;
pub mod dispatch;
pub mod grid;
pub mod legality;
pub mod link;
pub mod world;

#[cfg(test)]
mod testing;

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub use clock::{Clock, ClockReconciler, ManualClock, SystemClock};
pub use command::{compose_attack, compose_move, TroopCommand};
pub use connection::{
    Backoff, ChannelEvent, ChannelManager, ConnectOutcome, DisconnectReason, ReconnectPolicy,
    Transport, TransportEvent, PING_FRAME,
};
pub use dispatch::{
    decode, Delivery, EventDispatcher, Filter, Message, SubscriptionHandle, SyncEvent, Topic,
};
pub use grid::{Bounds, Cell, Position};
pub use legality::{attack_spots, move_spots, UnitKind};
pub use link::{ConnectionState, InvalidTransition, LinkEvent, LinkState};
pub use world::{ActionType, Snapshot, Troop, TroopAction, TroopMode, Village, WorldStore};

use crate::config::ClientConfig;
use crate::error::{CommandError, Result, SubscriberError, SyncError};

/// The push channel, the dispatcher and the world store, driven together.
#[derive(Debug)]
pub struct SyncClient<T: Transport, C: Clock + Clone = SystemClock> {
    channel: ChannelManager<T, C>,
    dispatcher: EventDispatcher,
    world: WorldStore<C>,
    /// Generation of the last delivered `Connected` event. Inbound frames
    /// must carry it.
    live_generation: u64,
}

impl<T: Transport> SyncClient<T, SystemClock> {
    pub fn new(transport: T, config: &ClientConfig) -> Self {
        Self::with_clock(transport, SystemClock, config)
    }
}

impl<T: Transport, C: Clock + Clone> SyncClient<T, C> {
    pub fn with_clock(transport: T, clock: C, config: &ClientConfig) -> Self {
        Self {
            channel: ChannelManager::new(transport, clock.clone(), config),
            dispatcher: EventDispatcher::new(),
            world: WorldStore::with_clock(clock).with_default_bounds(config.map_bounds),
            live_generation: 0,
        }
    }

    /// Open the push channel. Lifecycle events are published before this
    /// returns.
    ///
    /// A failed first attempt is not an error while retries remain; the
    /// reconnect happens on a later `poll`.
    pub fn connect(&mut self, token: &str) -> Result<ConnectOutcome> {
        let outcome = self.channel.connect(token);
        let events = self.channel.take_events();
        self.deliver(events);
        match outcome {
            ConnectOutcome::Exhausted { attempts } => Err(SyncError::ExhaustedRetries { attempts }),
            other => Ok(other),
        }
    }

    pub fn disconnect(&mut self) {
        self.channel.disconnect();
        let events = self.channel.take_events();
        self.deliver(events);
    }

    /// Send a JSON message over the open channel.
    pub fn send(&mut self, message: &serde_json::Value) -> Result<()> {
        Ok(self.channel.send(message)?)
    }

    /// Pump the channel once: drain the transport, fire due timers, apply
    /// snapshots and publish everything that happened.
    ///
    /// Returns the number of events handled, or `ExhaustedRetries` once the
    /// reconnect budget runs out during this pump.
    pub fn poll(&mut self) -> Result<usize> {
        let events = self.channel.poll();
        let count = events.len();
        match self.deliver(events) {
            Some(attempts) => Err(SyncError::ExhaustedRetries { attempts }),
            None => Ok(count),
        }
    }

    /// Apply and publish channel events in order. Returns the attempt count
    /// if retries ran out.
    fn deliver(&mut self, events: Vec<ChannelEvent>) -> Option<u32> {
        let mut exhausted = None;
        for event in events {
            match event {
                ChannelEvent::Frame { generation, text } => self.on_frame(generation, &text),
                lifecycle => {
                    match lifecycle {
                        ChannelEvent::Connected { generation } => self.live_generation = generation,
                        ChannelEvent::RetriesExhausted { attempts } => exhausted = Some(attempts),
                        _ => {}
                    }
                    if let Some(event) = SyncEvent::from_lifecycle(&lifecycle) {
                        self.dispatcher.publish(&event);
                    }
                }
            }
        }
        exhausted
    }

    fn on_frame(&mut self, generation: u64, text: &str) {
        if generation != self.live_generation {
            debug!(
                generation,
                current = self.live_generation,
                "dropping frame from superseded connection"
            );
            return;
        }

        let message = match decode(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(%err, "dropping inbound frame");
                return;
            }
        };
        if let Message::Snapshot(snapshot) = &message {
            self.world.apply_snapshot(Arc::clone(snapshot));
        }
        self.dispatcher.publish(&SyncEvent::Message(message));
    }

    pub fn subscribe<F>(&self, filter: impl Into<Filter>, consumer: F) -> SubscriptionHandle
    where
        F: FnMut(&SyncEvent) -> std::result::Result<(), SubscriberError> + Send + 'static,
    {
        self.dispatcher.subscribe(filter, consumer)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.dispatcher.unsubscribe(handle)
    }

    /// A handle on the dispatcher, for consumers that manage their own
    /// subscriptions.
    pub fn dispatcher(&self) -> EventDispatcher {
        self.dispatcher.clone()
    }

    pub fn world(&self) -> &WorldStore<C> {
        &self.world
    }

    pub fn channel(&self) -> &ChannelManager<T, C> {
        &self.channel
    }

    pub fn state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn move_spots_for(&self, troop_id: &str) -> std::result::Result<BTreeSet<Cell>, CommandError> {
        command::move_spots_for_troop(&self.world, troop_id)
    }

    pub fn attack_spots_for(
        &self,
        troop_id: &str,
    ) -> std::result::Result<BTreeSet<Cell>, CommandError> {
        command::attack_spots_for_troop(&self.world, troop_id)
    }
}
