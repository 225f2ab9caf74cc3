use serde::Serialize;
use tracing::{debug, warn};

use crate::config::DebugFlags;
use crate::geometry::Cell;
use crate::world_map::WorldMap;

/// Arrival cell relative to the anchor teleporter. Teleporters are usually
/// approached from above, so the player lands two rows below.
pub const ANCHOR_EXIT_OFFSET: (i32, i32) = (0, 2);

/// Tried in order when the exit cell is blocked.
pub const ANCHOR_FALLBACK_RING: [(i32, i32); 8] = [
    (0, -2),
    (-2, 0),
    (2, 0),
    (0, 2),
    (1, 1),
    (-1, 1),
    (1, -1),
    (-1, -1),
];

/// Final re-validation search around the resolved cell.
pub const NUDGE_RING: [(i32, i32); 13] = [
    (0, 0),
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (2, 0),
    (-2, 0),
    (0, 2),
    (0, -2),
    (1, 1),
    (-1, 1),
    (1, -1),
    (-1, -1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementSource {
    Forced,
    Resume,
    TeleporterAnchor,
    Spawn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub cell: Cell,
    pub source: PlacementSource,
    /// Every candidate was blocked; the player stands on `cell` anyway.
    pub degraded: bool,
}

/// Inputs to the arrival search, highest priority first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArrivalHints<'a> {
    pub forced: Option<Cell>,
    pub resume: Option<Cell>,
    pub anchor: Option<Cell>,
    /// Cells held by other actors on the destination map. Only a forced cell may land on one.
    pub occupied: &'a [Cell],
}

pub fn resolve_arrival(map: &WorldMap, hints: ArrivalHints<'_>, debug_flags: DebugFlags) -> Placement {
    if let Some(cell) = hints.forced {
        return Placement {
            cell,
            source: PlacementSource::Forced,
            degraded: false,
        };
    }

    let (resolved, source) = if let Some(cell) = hints.resume {
        (cell, PlacementSource::Resume)
    } else if let Some(anchor) = hints.anchor {
        (
            anchor_exit_cell(map, anchor, hints.occupied, debug_flags),
            PlacementSource::TeleporterAnchor,
        )
    } else {
        (map.spawn(), PlacementSource::Spawn)
    };

    match first_placeable(map, resolved, &NUDGE_RING, hints.occupied, debug_flags) {
        Some(cell) => {
            if cell != resolved {
                debug!(map = %map.id(), from = %resolved, to = %cell, "placement_nudged");
            }
            Placement {
                cell,
                source,
                degraded: false,
            }
        }
        None => {
            warn!(
                map = %map.id(),
                cell = %resolved,
                source = ?source,
                "placement_exhausted"
            );
            Placement {
                cell: resolved,
                source,
                degraded: true,
            }
        }
    }
}

fn anchor_exit_cell(map: &WorldMap, anchor: Cell, occupied: &[Cell], debug_flags: DebugFlags) -> Cell {
    let (dx, dy) = ANCHOR_EXIT_OFFSET;
    let exit = anchor.offset(dx, dy);
    if is_placeable(map, exit, occupied, debug_flags) {
        return exit;
    }
    first_placeable(map, anchor, &ANCHOR_FALLBACK_RING, occupied, debug_flags).unwrap_or(anchor)
}

fn first_placeable(
    map: &WorldMap,
    origin: Cell,
    ring: &[(i32, i32)],
    occupied: &[Cell],
    debug_flags: DebugFlags,
) -> Option<Cell> {
    ring.iter()
        .map(|(dx, dy)| origin.offset(*dx, *dy))
        .find(|cell| is_placeable(map, *cell, occupied, debug_flags))
}

/// In bounds, not blocked and not held by an actor under the active debug flags.
/// Noclip ignores actors the same way it ignores walls.
pub fn is_placeable(map: &WorldMap, cell: Cell, occupied: &[Cell], debug_flags: DebugFlags) -> bool {
    map.grid().contains(cell)
        && !map.is_blocked(cell, debug_flags)
        && (debug_flags.noclip || !occupied.contains(&cell))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world_map::{LayerData, MapId, WorldMapDesc};

    fn map(walls: &[Cell], spawn: Cell) -> WorldMap {
        WorldMap::build(WorldMapDesc {
            id: MapId::from("arrival.tmx"),
            display_name: None,
            width: 10,
            height: 10,
            tile_size: 16,
            layers: vec![LayerData::from_cells("wall", 10, 10, walls.iter().copied())],
            teleporters: Vec::new(),
            spawn,
        })
        .expect("map")
    }

    #[test]
    fn forced_cell_is_used_verbatim_even_when_blocked() {
        let map = map(&[Cell::new(4, 4)], Cell::new(0, 0));
        let placement = resolve_arrival(
            &map,
            ArrivalHints {
                forced: Some(Cell::new(4, 4)),
                resume: Some(Cell::new(1, 1)),
                anchor: Some(Cell::new(2, 2)),
                occupied: &[],
            },
            DebugFlags::default(),
        );
        assert_eq!(placement.cell, Cell::new(4, 4));
        assert_eq!(placement.source, PlacementSource::Forced);
        assert!(!placement.degraded);
    }

    #[test]
    fn resume_cell_beats_anchor() {
        let map = map(&[], Cell::new(0, 0));
        let placement = resolve_arrival(
            &map,
            ArrivalHints {
                forced: None,
                resume: Some(Cell::new(7, 7)),
                anchor: Some(Cell::new(2, 2)),
                occupied: &[],
            },
            DebugFlags::default(),
        );
        assert_eq!(placement.cell, Cell::new(7, 7));
        assert_eq!(placement.source, PlacementSource::Resume);
    }

    #[test]
    fn anchor_lands_two_rows_below_when_free() {
        let map = map(&[], Cell::new(0, 0));
        let placement = resolve_arrival(
            &map,
            ArrivalHints {
                anchor: Some(Cell::new(5, 5)),
                ..ArrivalHints::default()
            },
            DebugFlags::default(),
        );
        assert_eq!(placement.cell, Cell::new(5, 7));
        assert_eq!(placement.source, PlacementSource::TeleporterAnchor);
    }

    #[test]
    fn blocked_exit_falls_back_through_ring_in_order() {
        // Exit (5,7) and the first ring entry (5,3) are walls; (3,5) is next.
        let map = map(&[Cell::new(5, 7), Cell::new(5, 3)], Cell::new(0, 0));
        let placement = resolve_arrival(
            &map,
            ArrivalHints {
                anchor: Some(Cell::new(5, 5)),
                ..ArrivalHints::default()
            },
            DebugFlags::default(),
        );
        assert_eq!(placement.cell, Cell::new(3, 5));
    }

    #[test]
    fn exit_outside_map_counts_as_blocked() {
        let map = map(&[], Cell::new(0, 0));
        let placement = resolve_arrival(
            &map,
            ArrivalHints {
                anchor: Some(Cell::new(4, 9)),
                ..ArrivalHints::default()
            },
            DebugFlags::default(),
        );
        assert_eq!(placement.cell, Cell::new(4, 7));
    }

    #[test]
    fn blocked_spawn_is_nudged() {
        let map = map(&[Cell::new(3, 3)], Cell::new(3, 3));
        let placement = resolve_arrival(&map, ArrivalHints::default(), DebugFlags::default());
        assert_eq!(placement.cell, Cell::new(4, 3));
        assert_eq!(placement.source, PlacementSource::Spawn);
        assert!(!placement.degraded);
    }

    #[test]
    fn fully_walled_area_degrades_without_panicking() {
        let mut walls = Vec::new();
        for x in 0..10 {
            for y in 0..10 {
                walls.push(Cell::new(x, y));
            }
        }
        let map = map(&walls, Cell::new(5, 5));
        let placement = resolve_arrival(&map, ArrivalHints::default(), DebugFlags::default());
        assert_eq!(placement.cell, Cell::new(5, 5));
        assert!(placement.degraded);

        let noclip = resolve_arrival(&map, ArrivalHints::default(), DebugFlags { noclip: true });
        assert!(!noclip.degraded);
    }

    #[test]
    fn occupied_spawn_is_nudged_off_the_actor() {
        let map = map(&[], Cell::new(3, 3));
        let placement = resolve_arrival(
            &map,
            ArrivalHints {
                occupied: &[Cell::new(3, 3)],
                ..ArrivalHints::default()
            },
            DebugFlags::default(),
        );
        assert_eq!(placement.cell, Cell::new(4, 3));
        assert!(!placement.degraded);
    }

    #[test]
    fn occupied_anchor_exit_falls_back_through_ring() {
        let map = map(&[], Cell::new(0, 0));
        let placement = resolve_arrival(
            &map,
            ArrivalHints {
                anchor: Some(Cell::new(5, 5)),
                occupied: &[Cell::new(5, 7)],
                ..ArrivalHints::default()
            },
            DebugFlags::default(),
        );
        assert_eq!(placement.cell, Cell::new(5, 3));
    }

    #[test]
    fn forced_cell_may_land_on_an_actor() {
        let map = map(&[], Cell::new(0, 0));
        let placement = resolve_arrival(
            &map,
            ArrivalHints {
                forced: Some(Cell::new(2, 2)),
                occupied: &[Cell::new(2, 2)],
                ..ArrivalHints::default()
            },
            DebugFlags::default(),
        );
        assert_eq!(placement.cell, Cell::new(2, 2));
        assert_eq!(placement.source, PlacementSource::Forced);
    }
}
