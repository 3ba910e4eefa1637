//! World snapshot model and store.
//!
//! The server pushes the whole visible world in one `map_update` message.
//! The store keeps only the most recent one and swaps it in as a unit;
//! readers hold an `Arc` to whatever snapshot was current when they asked.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::sync::Arc;
use tracing::debug;

use super::clock::{Clock, ClockReconciler, SystemClock};
use super::grid::{Bounds, Cell, Position};
use crate::error::ProtocolError;

/// Parse a server timestamp.
///
/// Accepts RFC 3339 and the naive ISO 8601 form the server emits for UTC
/// datetimes (`2024-05-01T12:00:00.123456`).
pub fn parse_server_time(raw: &str) -> Result<DateTime<Utc>, ProtocolError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| ProtocolError::BadTimestamp(raw.to_string()))
}

mod wire_time {
    use super::*;
    use serde::{de::Error as _, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_some(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse_server_time(&raw).map(Some).map_err(D::Error::custom),
            None => Ok(None),
        }
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A village on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Village {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub location: Position,
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Fields this client doesn't model (owner name, colour, resources...).
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

impl Village {
    pub fn cell(&self) -> Cell {
        self.location.cell()
    }
}

/// What a troop is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TroopMode {
    #[default]
    Idle,
    Move,
    Attack,
    Defend,
    #[serde(other)]
    Unknown,
}

/// A troop stack on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Troop {
    #[serde(alias = "_id")]
    pub id: String,
    /// Unit kind wire name, e.g. `archer`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub mode: TroopMode,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub home_id: Option<String>,
    pub location: Position,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

impl Troop {
    pub fn cell(&self) -> Cell {
        self.location.cell()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Move,
    Attack,
    #[serde(other)]
    Other,
}

/// A pending troop action (movement or attack in flight).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TroopAction {
    #[serde(alias = "_id", default)]
    pub id: String,
    pub troop_id: String,
    pub action_type: ActionType,
    #[serde(default)]
    pub start_location: Option<Position>,
    #[serde(default)]
    pub target_location: Option<Position>,
    #[serde(default, with = "wire_time")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "wire_time")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processed: bool,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

impl TroopAction {
    /// Time left until completion at server time `now`, floored at zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let left = self.completion_time? - now;
        Some(left.max(chrono::Duration::zero()))
    }

    /// Completion fraction in `[0, 1]` at server time `now`.
    pub fn progress(&self, now: DateTime<Utc>) -> Option<f64> {
        let start = self.started_at?;
        let end = self.completion_time?;
        let total = (end - start).num_milliseconds();
        if total <= 0 {
            return Some(1.0);
        }
        let done = (now - start).num_milliseconds() as f64 / total as f64;
        Some(done.clamp(0.0, 1.0))
    }

    pub fn target_cell(&self) -> Option<Cell> {
        self.target_location.map(|p| p.cell())
    }
}

/// One complete push of world state.
///
/// Missing or `null` collections decode as empty so a snapshot never
/// inherits anything from its predecessor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, with = "wire_time")]
    pub server_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub map_bounds: Option<Bounds>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub villages: Vec<Village>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub troops: Vec<Troop>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub troop_actions: Vec<TroopAction>,
}

impl Snapshot {
    /// Decode a `map_update` payload.
    pub fn from_payload(payload: JsonValue) -> Result<Self, ProtocolError> {
        if !payload.is_object() {
            return Err(ProtocolError::BadPayload {
                kind: "map_update".to_string(),
                reason: "payload is not an object".to_string(),
            });
        }
        serde_json::from_value(payload).map_err(|err| ProtocolError::BadPayload {
            kind: "map_update".to_string(),
            reason: err.to_string(),
        })
    }

    pub fn village(&self, id: &str) -> Option<&Village> {
        self.villages.iter().find(|v| v.id == id)
    }

    pub fn troop(&self, id: &str) -> Option<&Troop> {
        self.troops.iter().find(|t| t.id == id)
    }

    pub fn troops_at(&self, cell: Cell) -> impl Iterator<Item = &Troop> {
        self.troops.iter().filter(move |t| t.cell() == cell)
    }

    pub fn village_at(&self, cell: Cell) -> Option<&Village> {
        self.villages.iter().find(|v| v.cell() == cell)
    }

    pub fn actions_for_troop<'a>(&'a self, troop_id: &'a str) -> impl Iterator<Item = &'a TroopAction> {
        self.troop_actions
            .iter()
            .filter(move |a| a.troop_id == troop_id)
    }

    pub fn is_empty(&self) -> bool {
        self.villages.is_empty() && self.troops.is_empty() && self.troop_actions.is_empty()
    }
}

/// Holder of the last accepted snapshot and the derived server clock.
#[derive(Debug)]
pub struct WorldStore<C: Clock = SystemClock> {
    snapshot: Arc<Snapshot>,
    clock: C,
    reconciler: ClockReconciler,
    default_bounds: Bounds,
    revision: u64,
}

impl WorldStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for WorldStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> WorldStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            snapshot: Arc::new(Snapshot::default()),
            clock,
            reconciler: ClockReconciler::new(),
            default_bounds: Bounds::default(),
            revision: 0,
        }
    }

    /// Bounds used while the latest snapshot carries none.
    pub fn with_default_bounds(mut self, bounds: Bounds) -> Self {
        self.default_bounds = bounds;
        self
    }

    /// Replace the stored snapshot and re-derive the clock offset.
    ///
    /// Returns the new revision.
    pub fn apply_snapshot(&mut self, snapshot: impl Into<Arc<Snapshot>>) -> u64 {
        let snapshot = snapshot.into();
        let received_at = self.clock.now();
        if let Some(server_time) = snapshot.server_time {
            let offset = self.reconciler.observe(server_time, received_at);
            debug!(offset_ms = offset, "server clock offset updated");
        }
        debug!(
            villages = snapshot.villages.len(),
            troops = snapshot.troops.len(),
            actions = snapshot.troop_actions.len(),
            "snapshot applied"
        );
        self.snapshot = snapshot;
        self.revision += 1;
        self.revision
    }

    /// The most recent snapshot.
    pub fn latest(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Best current estimate of server time.
    pub fn current_authoritative_time(&self) -> DateTime<Utc> {
        self.reconciler.current_time(self.clock.now())
    }

    pub fn offset_ms(&self) -> i64 {
        self.reconciler.offset_ms()
    }

    /// Number of snapshots applied so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn bounds(&self) -> Bounds {
        self.snapshot.map_bounds.unwrap_or(self.default_bounds)
    }

    /// True when the troop is mid-action or has unprocessed actions queued.
    pub fn is_troop_busy(&self, troop_id: &str) -> bool {
        let Some(troop) = self.snapshot.troop(troop_id) else {
            return false;
        };
        troop.mode != TroopMode::Idle
            || self
                .snapshot
                .actions_for_troop(troop_id)
                .any(|a| !a.processed)
    }
}
