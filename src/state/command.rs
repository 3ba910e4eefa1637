//! Troop command composition.
//!
//! Builds the textual commands the API accepts, checked against the
//! legality engine first so an illegal target never costs a round-trip.
//! Sending is the caller's business.

use std::collections::BTreeSet;
use std::fmt;

use super::clock::Clock;
use super::grid::Cell;
use super::legality::{attack_spots, move_spots};
use super::world::WorldStore;
use crate::error::CommandError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TroopCommand {
    Move { troop_id: String, target: Cell },
    Attack { troop_id: String, target: Cell },
}

impl TroopCommand {
    pub fn troop_id(&self) -> &str {
        match self {
            Self::Move { troop_id, .. } | Self::Attack { troop_id, .. } => troop_id,
        }
    }

    pub fn target(&self) -> Cell {
        match self {
            Self::Move { target, .. } | Self::Attack { target, .. } => *target,
        }
    }
}

impl fmt::Display for TroopCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move { troop_id, target } => write!(f, "move {troop_id} to {target}"),
            Self::Attack { troop_id, target } => write!(f, "attack {troop_id} at {target}"),
        }
    }
}

/// Legal move targets for a troop in the latest snapshot.
pub fn move_spots_for_troop<C: Clock>(
    world: &WorldStore<C>,
    troop_id: &str,
) -> Result<BTreeSet<Cell>, CommandError> {
    let snapshot = world.latest();
    let troop = snapshot
        .troop(troop_id)
        .ok_or_else(|| CommandError::UnknownTroop(troop_id.to_string()))?;
    Ok(move_spots(&troop.kind, troop.cell(), &world.bounds()))
}

/// Legal attack targets for a troop in the latest snapshot.
pub fn attack_spots_for_troop<C: Clock>(
    world: &WorldStore<C>,
    troop_id: &str,
) -> Result<BTreeSet<Cell>, CommandError> {
    let snapshot = world.latest();
    let troop = snapshot
        .troop(troop_id)
        .ok_or_else(|| CommandError::UnknownTroop(troop_id.to_string()))?;
    Ok(attack_spots(&troop.kind, troop.cell(), &world.bounds()))
}

pub fn compose_move<C: Clock>(
    world: &WorldStore<C>,
    troop_id: &str,
    target: Cell,
) -> Result<TroopCommand, CommandError> {
    let spots = move_spots_for_troop(world, troop_id)?;
    check(world, troop_id, "move", target, &spots)?;
    Ok(TroopCommand::Move {
        troop_id: troop_id.to_string(),
        target,
    })
}

pub fn compose_attack<C: Clock>(
    world: &WorldStore<C>,
    troop_id: &str,
    target: Cell,
) -> Result<TroopCommand, CommandError> {
    let spots = attack_spots_for_troop(world, troop_id)?;
    check(world, troop_id, "attack", target, &spots)?;
    Ok(TroopCommand::Attack {
        troop_id: troop_id.to_string(),
        target,
    })
}

fn check<C: Clock>(
    world: &WorldStore<C>,
    troop_id: &str,
    action: &'static str,
    target: Cell,
    spots: &BTreeSet<Cell>,
) -> Result<(), CommandError> {
    if world.is_troop_busy(troop_id) {
        return Err(CommandError::Busy(troop_id.to_string()));
    }
    if !spots.contains(&target) {
        return Err(CommandError::IllegalTarget {
            troop_id: troop_id.to_string(),
            action,
            x: target.x,
            y: target.y,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::clock::ManualClock;
    use crate::state::world::Snapshot;
    use serde_json::json;

    fn world() -> WorldStore<ManualClock> {
        let mut store = WorldStore::with_clock(ManualClock::at_millis(0));
        store.apply_snapshot(
            Snapshot::from_payload(json!({
                "map_bounds": {"x_min": 0, "x_max": 10, "y_min": 0, "y_max": 10},
                "troops": [
                    {"id": "t1", "type": "archer", "mode": "idle", "location": {"x": 5.4, "y": 5.6}},
                    {"id": "t2", "type": "light_cavalry", "mode": "move", "location": {"x": 0, "y": 0}},
                    {"id": "t3", "type": "siege_tower", "location": {"x": 3, "y": 3}}
                ]
            }))
            .unwrap(),
        );
        store
    }

    #[test]
    fn test_command_text() {
        let cmd = TroopCommand::Move {
            troop_id: "t1".into(),
            target: Cell::new(3, -4),
        };
        assert_eq!(cmd.to_string(), "move t1 to 3,-4");

        let cmd = TroopCommand::Attack {
            troop_id: "t1".into(),
            target: Cell::new(6, 6),
        };
        assert_eq!(cmd.to_string(), "attack t1 at 6,6");
        assert_eq!(cmd.troop_id(), "t1");
        assert_eq!(cmd.target(), Cell::new(6, 6));
    }

    #[test]
    fn test_compose_legal_move() {
        let world = world();
        let cmd = compose_move(&world, "t1", Cell::new(5, 6)).unwrap();
        assert_eq!(cmd.to_string(), "move t1 to 5,6");
    }

    #[test]
    fn test_compose_illegal_move() {
        let world = world();
        assert_eq!(
            compose_move(&world, "t1", Cell::new(6, 6)),
            Err(CommandError::IllegalTarget {
                troop_id: "t1".into(),
                action: "move",
                x: 6,
                y: 6
            })
        );
        assert!(compose_move(&world, "t1", Cell::new(5, 5)).is_err());
    }

    #[test]
    fn test_compose_attack_diagonal() {
        let world = world();
        assert!(compose_attack(&world, "t1", Cell::new(6, 6)).is_ok());
        assert!(compose_attack(&world, "t1", Cell::new(5, 5)).is_err());
    }

    #[test]
    fn test_busy_and_unknown_troops() {
        let world = world();
        assert_eq!(
            compose_move(&world, "t2", Cell::new(2, 1)),
            Err(CommandError::Busy("t2".into()))
        );
        assert_eq!(
            compose_move(&world, "ghost", Cell::new(1, 1)),
            Err(CommandError::UnknownTroop("ghost".into()))
        );
    }

    #[test]
    fn test_unknown_kind_has_no_spots() {
        let world = world();
        assert!(move_spots_for_troop(&world, "t3").unwrap().is_empty());
        assert!(attack_spots_for_troop(&world, "t3").unwrap().is_empty());
    }

    #[test]
    fn test_spots_use_snapshot_bounds() {
        let world = world();
        let spots = move_spots_for_troop(&world, "t2").unwrap();
        assert_eq!(spots, [Cell::new(2, 1), Cell::new(1, 2)].into_iter().collect());
    }
}
