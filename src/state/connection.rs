//! Push channel management.
//!
//! Owns the single transport handle and drives its lifecycle: connect,
//! keep-alive, unsolicited-close detection, fixed or exponential backoff and
//! reconnection. All state changes go through [`ChannelManager`] methods
//! called from one place, so transitions never interleave.
//!
//! Nothing here blocks on timers. Deadlines are stored and checked on each
//! [`ChannelManager::poll`] against the injected [`Clock`].

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::clock::{after, Clock};
use super::link::{ConnectionState, LinkEvent, LinkState};
use crate::config::ClientConfig;
use crate::error::TransportError;

/// Default keep-alive period (30 seconds).
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Default delay before a reconnect attempt (3 seconds).
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(3);

/// Default ceiling on consecutive reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Liveness probe sent while the channel is open.
pub const PING_FRAME: &str = r#"{"type":"ping"}"#;

/// A bidirectional text transport.
///
/// `open` completes the handshake before returning. Inbound traffic is
/// collected by `poll`; a transport reports its own loss with
/// [`TransportEvent::Closed`] and releases the socket when it does.
pub trait Transport {
    fn open(&mut self, url: &Url) -> Result<(), TransportError>;

    fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Close the current socket, if any. Must be safe to call repeatedly.
    fn close(&mut self);

    /// Drain whatever arrived since the last call.
    fn poll(&mut self) -> Vec<TransportEvent>;
}

/// Raw transport-level occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(String),
    Closed { reason: String },
}

/// Delay schedule between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl ReconnectPolicy {
    /// Delay before the 1-based reconnect `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let shift = attempt.saturating_sub(1).min(31);
                base.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            backoff: Backoff::Fixed(DEFAULT_RECONNECT_INTERVAL),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called.
    Requested,
    /// The server or network closed the connection.
    Dropped,
}

/// Lifecycle and traffic events handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected {
        generation: u64,
    },
    Disconnected {
        generation: u64,
        reason: DisconnectReason,
    },
    Frame {
        generation: u64,
        text: String,
    },
    RetriesExhausted {
        attempts: u32,
    },
}

/// Result of a connect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Already open with the same token; nothing was done.
    Reused,
    Opened,
    /// The attempt failed and a reconnect is scheduled.
    Retrying { attempt: u32, delay: Duration },
    /// The attempt failed and no attempts are left.
    Exhausted { attempts: u32 },
}

impl ConnectOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Reused | Self::Opened)
    }
}

/// Owner of the push channel.
#[derive(Debug)]
pub struct ChannelManager<T: Transport, C: Clock> {
    transport: T,
    clock: C,
    config: ClientConfig,
    policy: ReconnectPolicy,
    keepalive_interval: Duration,

    link: LinkState,
    token: Option<String>,
    attempts: u32,
    exhausted: bool,

    /// Bumped on every dial and every explicit disconnect.
    generation: u64,

    keepalive_due: Option<DateTime<Utc>>,
    reconnect_due: Option<DateTime<Utc>>,

    outbox: VecDeque<ChannelEvent>,
}

impl<T: Transport, C: Clock> ChannelManager<T, C> {
    pub fn new(transport: T, clock: C, config: &ClientConfig) -> Self {
        Self {
            transport,
            clock,
            policy: config.reconnect_policy(),
            keepalive_interval: config.keepalive_interval(),
            config: config.clone(),
            link: LinkState::new(),
            token: None,
            attempts: 0,
            exhausted: false,
            generation: 0,
            keepalive_due: None,
            reconnect_due: None,
            outbox: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_reconnect_pending(&self) -> bool {
        self.reconnect_due.is_some()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Earliest pending timer, for drivers that want to sleep until then.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        match (self.keepalive_due, self.reconnect_due) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Open the channel with `token`.
    ///
    /// Same token while open is a no-op. A different token tears the
    /// current connection down first. Calling this resets the reconnect
    /// counter, including after retries were exhausted.
    pub fn connect(&mut self, token: &str) -> ConnectOutcome {
        if self.state().is_open() && self.token.as_deref() == Some(token) {
            debug!(
                generation = self.generation,
                "already connected with the same token, reusing connection"
            );
            return ConnectOutcome::Reused;
        }

        if !self.state().is_disconnected() {
            info!("connected with a different token, disconnecting first");
            self.disconnect();
        }

        self.reconnect_due = None;
        self.attempts = 0;
        self.exhausted = false;
        self.token = Some(token.to_string());
        self.dial(token)
    }

    /// Tear the channel down without scheduling a reconnect. Idempotent.
    pub fn disconnect(&mut self) {
        self.keepalive_due = None;
        self.reconnect_due = None;

        let was = self.state();
        if !was.is_disconnected() {
            self.transition(LinkEvent::Close);
            self.transport.close();
            self.transition(LinkEvent::Closed);
            if was.is_open() {
                self.outbox.push_back(ChannelEvent::Disconnected {
                    generation: self.generation,
                    reason: DisconnectReason::Requested,
                });
            }
            info!(generation = self.generation, "push channel disconnected");
        }

        self.token = None;
        self.attempts = 0;
        self.exhausted = false;
        self.generation += 1;
    }

    /// Send a JSON message over the open channel.
    pub fn send(&mut self, message: &serde_json::Value) -> Result<(), TransportError> {
        if !self.state().is_open() {
            return Err(TransportError::Closed);
        }
        self.transport.send_text(&message.to_string())
    }

    /// Feed one transport event observed on connection `generation`.
    ///
    /// Events from a superseded connection are discarded.
    pub fn handle_transport_event(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                "dropping event from superseded connection"
            );
            return;
        }
        if !self.state().is_open() {
            debug!(state = %self.state(), "dropping event on a channel that is not open");
            return;
        }

        match event {
            TransportEvent::Frame(text) => {
                self.outbox.push_back(ChannelEvent::Frame { generation, text });
            }
            TransportEvent::Closed { reason } => self.on_dropped(&reason),
        }
    }

    /// Drain transport traffic, fire due timers and return queued events.
    pub fn poll(&mut self) -> Vec<ChannelEvent> {
        for event in self.transport.poll() {
            self.handle_transport_event(self.generation, event);
        }

        let now = self.clock.now();
        if self.keepalive_due.is_some_and(|due| due <= now) {
            self.send_keepalive(now);
        }
        if self.reconnect_due.is_some_and(|due| due <= now) {
            self.reconnect_due = None;
            if let Some(token) = self.token.clone() {
                self.dial(&token);
            }
        }

        self.take_events()
    }

    /// Events queued by `connect`/`disconnect` since the last poll.
    pub fn take_events(&mut self) -> Vec<ChannelEvent> {
        self.outbox.drain(..).collect()
    }

    fn dial(&mut self, token: &str) -> ConnectOutcome {
        self.generation += 1;
        self.transition(LinkEvent::Dial);

        let url = match self.config.endpoint_url(token) {
            Ok(url) => url,
            Err(err) => {
                error!(%err, "cannot build push channel url");
                return self.on_connect_failed(TransportError::Refused(err.to_string()));
            }
        };

        info!(
            generation = self.generation,
            host = url.host_str().unwrap_or_default(),
            path = url.path(),
            attempt = self.attempts,
            "connecting push channel"
        );

        match self.transport.open(&url) {
            Ok(()) => self.on_open(),
            Err(err) => self.on_connect_failed(err),
        }
    }

    fn on_open(&mut self) -> ConnectOutcome {
        self.transition(LinkEvent::Opened);
        self.attempts = 0;
        self.exhausted = false;
        self.keepalive_due = Some(after(self.clock.now(), self.keepalive_interval));
        self.outbox.push_back(ChannelEvent::Connected {
            generation: self.generation,
        });
        info!(generation = self.generation, "push channel open");
        ConnectOutcome::Opened
    }

    fn on_connect_failed(&mut self, err: TransportError) -> ConnectOutcome {
        warn!(%err, generation = self.generation, "push channel connect failed");
        self.transition(LinkEvent::Failed);
        self.schedule_reconnect()
    }

    fn on_dropped(&mut self, reason: &str) {
        info!(generation = self.generation, reason, "push channel closed by peer");
        self.keepalive_due = None;
        self.transition(LinkEvent::Dropped);
        self.outbox.push_back(ChannelEvent::Disconnected {
            generation: self.generation,
            reason: DisconnectReason::Dropped,
        });
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) -> ConnectOutcome {
        if self.attempts < self.policy.max_attempts {
            self.attempts += 1;
            let delay = self.policy.delay_for(self.attempts);
            self.reconnect_due = Some(after(self.clock.now(), delay));
            info!(
                attempt = self.attempts,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "scheduling reconnect"
            );
            ConnectOutcome::Retrying {
                attempt: self.attempts,
                delay,
            }
        } else {
            self.exhausted = true;
            self.reconnect_due = None;
            warn!(attempts = self.attempts, "max reconnect attempts reached");
            self.outbox.push_back(ChannelEvent::RetriesExhausted {
                attempts: self.attempts,
            });
            ConnectOutcome::Exhausted {
                attempts: self.attempts,
            }
        }
    }

    fn send_keepalive(&mut self, now: DateTime<Utc>) {
        match self.transport.send_text(PING_FRAME) {
            Ok(()) => {
                debug!(generation = self.generation, "keep-alive sent");
                self.keepalive_due = Some(after(now, self.keepalive_interval));
            }
            Err(err) => {
                warn!(%err, "keep-alive failed");
                self.transport.close();
                self.on_dropped(&err.to_string());
            }
        }
    }

    fn transition(&mut self, event: LinkEvent) {
        if let Err(err) = self.link.apply_mut(event) {
            error!(%err, "rejected push channel transition");
        }
    }
}
