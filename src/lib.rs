//! Minute Empire Sync Library
//!
//! This crate keeps a client's view of a Minute Empire world in step with
//! the game server and answers where each troop may move or attack.
//!
//! # Overview
//!
//! - **Push Channel** - One WebSocket per client, opened with a session
//!   token, kept alive with a periodic ping and reconnected with bounded
//!   retries after unexpected closes.
//!
//! - **Event Dispatch** - Inbound frames are decoded by type and fanned out
//!   to subscribers. A failing subscriber never affects the others.
//!
//! - **World Store** - The latest snapshot, replaced whole, plus a server
//!   clock estimate derived from each snapshot's timestamp.
//!
//! - **Legality Engine** - Per-unit movement and attack patterns clipped to
//!   the map bounds.
//!
//! # Design Principles
//!
//! 1. **State machines validate transitions** - The connection state only
//!    changes along known edges; anything else is logged and rejected.
//!
//! 2. **Single writer** - Everything is driven from `SyncClient::poll`, so
//!    no lock is held across a subscriber call.
//!
//! 3. **Injectable I/O** - Transport and clock are traits. Tests use a
//!    scripted transport and a manual clock.
//!
//! 4. **Serialization-ready** - Snapshot types round-trip through JSON.
//!
//! # Example
//!
//! ```rust
//! use minute_empire_sync::{move_spots, Bounds, Cell, ManualClock, Snapshot, WorldStore};
//! use serde_json::json;
//!
//! let mut world = WorldStore::with_clock(ManualClock::at_millis(1_000_000));
//! let snapshot = Snapshot::from_payload(json!({
//!     "server_time": "1970-01-01T00:16:45Z",
//!     "troops": [{"id": "t1", "type": "light_cavalry", "location": {"x": 0, "y": 0}}]
//! }))
//! .unwrap();
//! world.apply_snapshot(snapshot);
//! assert_eq!(world.offset_ms(), 5_000);
//!
//! let spots = move_spots("light_cavalry", Cell::new(0, 0), &Bounds::new(0, 10, 0, 10));
//! assert_eq!(spots.into_iter().collect::<Vec<_>>(), vec![Cell::new(1, 2), Cell::new(2, 1)]);
//! ```

pub mod config;
pub mod error;
pub mod state;
pub mod transport;

pub use config::ClientConfig;
pub use error::{CommandError, ConfigError, ProtocolError, SyncError, TransportError};
pub use state::*;
pub use transport::WsTransport;
