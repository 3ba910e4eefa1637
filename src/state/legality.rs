//! Spatial command legality.
//!
//! Given a unit kind and its current cell, compute which cells a move or
//! attack command may target. Everything here is a pure function of its
//! inputs; unknown kinds simply have no legal targets.

use std::collections::BTreeSet;
use std::fmt;

use super::grid::{Bounds, Cell};

/// A relative cell displacement.
pub type Offset = (i32, i32);

/// The unit's own cell.
pub const CURRENT: &[Offset] = &[(0, 0)];

/// North, south, east, west.
pub const ORTHOGONAL: &[Offset] = &[(0, 1), (0, -1), (1, 0), (-1, 0)];

/// The four diagonal neighbours.
pub const DIAGONAL: &[Offset] = &[(1, 1), (1, -1), (-1, 1), (-1, -1)];

/// Knight-like leaps.
pub const L_SHAPED: &[Offset] = &[
    (2, 1),
    (2, -1),
    (-2, 1),
    (-2, -1),
    (1, 2),
    (-1, 2),
    (1, -2),
    (-1, -2),
];

/// Troop types known to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    Militia,
    Archer,
    LightCavalry,
    Pikeman,
}

impl UnitKind {
    pub const ALL: [UnitKind; 4] = [
        UnitKind::Militia,
        UnitKind::Archer,
        UnitKind::LightCavalry,
        UnitKind::Pikeman,
    ];

    /// Parse the wire name. Returns `None` for kinds this client doesn't know.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "militia" => Some(Self::Militia),
            "archer" => Some(Self::Archer),
            "light_cavalry" => Some(Self::LightCavalry),
            "pikeman" => Some(Self::Pikeman),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Militia => "militia",
            Self::Archer => "archer",
            Self::LightCavalry => "light_cavalry",
            Self::Pikeman => "pikeman",
        }
    }

    /// Static movement profile for this kind.
    pub fn profile(&self) -> MovementProfile {
        match self {
            Self::Militia => MovementProfile {
                moves: &[ORTHOGONAL, DIAGONAL],
                attacks: &[CURRENT],
            },
            Self::Archer => MovementProfile {
                moves: &[ORTHOGONAL],
                attacks: &[ORTHOGONAL, DIAGONAL],
            },
            Self::LightCavalry => MovementProfile {
                moves: &[L_SHAPED],
                attacks: &[CURRENT],
            },
            Self::Pikeman => MovementProfile {
                moves: &[ORTHOGONAL, DIAGONAL, L_SHAPED],
                attacks: &[CURRENT, L_SHAPED],
            },
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Move and attack offset patterns, each a union of offset groups.
#[derive(Debug, Clone, Copy)]
pub struct MovementProfile {
    pub moves: &'static [&'static [Offset]],
    pub attacks: &'static [&'static [Offset]],
}

impl MovementProfile {
    pub fn move_offsets(&self) -> impl Iterator<Item = Offset> + '_ {
        self.moves.iter().flat_map(|group| group.iter().copied())
    }

    pub fn attack_offsets(&self) -> impl Iterator<Item = Offset> + '_ {
        self.attacks.iter().flat_map(|group| group.iter().copied())
    }
}

fn project(
    origin: Cell,
    offsets: impl Iterator<Item = Offset>,
    bounds: &Bounds,
) -> BTreeSet<Cell> {
    offsets
        .filter_map(|(dx, dy)| origin.offset(dx, dy))
        .filter(|cell| bounds.contains(*cell))
        .collect()
}

/// Cells a move command may target. Never contains `cell` itself.
pub fn move_spots(unit_kind: &str, cell: Cell, bounds: &Bounds) -> BTreeSet<Cell> {
    match UnitKind::parse(unit_kind) {
        Some(kind) => move_spots_for(kind, cell, bounds),
        None => BTreeSet::new(),
    }
}

/// Cells an attack command may target. May contain `cell` itself.
pub fn attack_spots(unit_kind: &str, cell: Cell, bounds: &Bounds) -> BTreeSet<Cell> {
    match UnitKind::parse(unit_kind) {
        Some(kind) => attack_spots_for(kind, cell, bounds),
        None => BTreeSet::new(),
    }
}

pub fn move_spots_for(kind: UnitKind, cell: Cell, bounds: &Bounds) -> BTreeSet<Cell> {
    let mut spots = project(cell, kind.profile().move_offsets(), bounds);
    spots.remove(&cell);
    spots
}

pub fn attack_spots_for(kind: UnitKind, cell: Cell, bounds: &Bounds) -> BTreeSet<Cell> {
    project(cell, kind.profile().attack_offsets(), bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cells(list: &[(i32, i32)]) -> BTreeSet<Cell> {
        list.iter().map(|&(x, y)| Cell::new(x, y)).collect()
    }

    const TEN: Bounds = Bounds::new(0, 10, 0, 10);

    #[test]
    fn test_archer_in_open_field() {
        let origin = Cell::new(5, 5);

        assert_eq!(
            move_spots("archer", origin, &TEN),
            cells(&[(5, 6), (5, 4), (6, 5), (4, 5)])
        );
        assert_eq!(
            attack_spots("archer", origin, &TEN),
            cells(&[
                (5, 6),
                (5, 4),
                (6, 5),
                (4, 5),
                (6, 6),
                (6, 4),
                (4, 6),
                (4, 4)
            ])
        );
    }

    #[test]
    fn test_light_cavalry_in_corner() {
        assert_eq!(
            move_spots("light_cavalry", Cell::new(0, 0), &TEN),
            cells(&[(2, 1), (1, 2)])
        );
    }

    #[test]
    fn test_unknown_kind_has_no_targets() {
        let origin = Cell::new(5, 5);
        assert!(move_spots("siege_tower", origin, &TEN).is_empty());
        assert!(attack_spots("siege_tower", origin, &TEN).is_empty());
        assert!(move_spots("", origin, &TEN).is_empty());
    }

    #[test]
    fn test_attack_in_place_kinds() {
        let origin = Cell::new(3, 3);
        assert_eq!(attack_spots("militia", origin, &TEN), cells(&[(3, 3)]));
        assert_eq!(attack_spots("light_cavalry", origin, &TEN), cells(&[(3, 3)]));

        let pikeman = attack_spots("pikeman", origin, &TEN);
        assert_eq!(pikeman.len(), 9);
        assert!(pikeman.contains(&origin));
        assert!(pikeman.contains(&Cell::new(5, 4)));
    }

    #[test]
    fn test_pikeman_moves_union_of_patterns() {
        let spots = move_spots("pikeman", Cell::new(5, 5), &TEN);
        assert_eq!(spots.len(), 16);
    }

    #[test]
    fn test_move_never_contains_origin() {
        for kind in UnitKind::ALL {
            for x in 1..10 {
                for y in 1..10 {
                    let origin = Cell::new(x, y);
                    assert!(
                        !move_spots(kind.as_str(), origin, &TEN).contains(&origin),
                        "{kind} at {origin}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_leaps_off_the_integer_grid_vanish() {
        let bounds = Bounds::new(0, i32::MAX, -5, 5);
        let origin = Cell::new(i32::MAX - 1, 0);

        assert_eq!(
            move_spots("light_cavalry", origin, &bounds),
            cells(&[
                (i32::MAX, 2),
                (i32::MAX, -2),
                (i32::MAX - 3, 1),
                (i32::MAX - 3, -1),
                (i32::MAX - 2, 2),
                (i32::MAX - 2, -2)
            ])
        );
        assert_eq!(
            attack_spots("archer", Cell::new(i32::MAX, 0), &bounds),
            cells(&[
                (i32::MAX, 1),
                (i32::MAX, -1),
                (i32::MAX - 1, 0),
                (i32::MAX - 1, 1),
                (i32::MAX - 1, -1)
            ])
        );
    }

    #[test]
    fn test_results_clipped_on_every_edge() {
        let bounds = Bounds::new(-3, 3, -2, 4);
        let edge_cells = (bounds.x_min..=bounds.x_max)
            .flat_map(|x| [Cell::new(x, bounds.y_min), Cell::new(x, bounds.y_max)])
            .chain(
                (bounds.y_min..=bounds.y_max)
                    .flat_map(|y| [Cell::new(bounds.x_min, y), Cell::new(bounds.x_max, y)]),
            );

        for origin in edge_cells {
            for kind in UnitKind::ALL {
                let all = move_spots_for(kind, origin, &bounds)
                    .into_iter()
                    .chain(attack_spots_for(kind, origin, &bounds));
                for spot in all {
                    assert!(bounds.contains(spot), "{kind} at {origin} produced {spot}");
                }
            }
        }
    }

    #[test]
    fn test_boundary_cell_is_valid_target() {
        let bounds = Bounds::new(0, 6, 0, 6);
        let spots = move_spots("archer", Cell::new(5, 5), &bounds);
        assert!(spots.contains(&Cell::new(6, 5)));
        assert!(spots.contains(&Cell::new(5, 6)));

        let spots = move_spots("archer", Cell::new(6, 6), &bounds);
        assert_eq!(spots, cells(&[(6, 5), (5, 6)]));
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in UnitKind::ALL {
            assert_eq!(UnitKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(UnitKind::parse("Archer"), None);
    }

    #[test]
    fn test_deterministic() {
        let a = attack_spots("pikeman", Cell::new(1, 9), &TEN);
        let b = attack_spots("pikeman", Cell::new(1, 9), &TEN);
        assert_eq!(a, b);
    }
}
