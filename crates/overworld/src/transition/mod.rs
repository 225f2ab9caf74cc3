mod placement;

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{DebugFlags, TransitionConfig};
use crate::geometry::{Cell, Vec2};
use crate::world_map::{MapId, Teleporter, WorldMap};

pub use placement::{
    is_placeable, resolve_arrival, ArrivalHints, Placement, PlacementSource, ANCHOR_EXIT_OFFSET,
    ANCHOR_FALLBACK_RING, NUDGE_RING,
};

/// Minimum time between two accepted non-forced switches.
pub const SWITCH_COOLDOWN_SECONDS: f64 = 1.0;
/// Chance that a qualifying switch is redirected to the alternate world.
pub const ALTERNATE_WORLD_PROBABILITY: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPhase {
    Idle,
    FadingOut,
    Flickering,
    /// Instantaneous commit step; never observed between frames.
    Switching,
    FadingIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleRejection {
    UnknownMap,
    AlreadyScheduled,
    CoolingDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Accepted {
        destination: MapId,
        alternate_world: bool,
    },
    Rejected(ScheduleRejection),
}

impl ScheduleOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Result of a committed switch, reported once from [`TransitionController::advance`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionCommit {
    pub from: MapId,
    pub to: MapId,
    pub placement: Placement,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("transition controller needs at least one map")]
    NoMaps,
    #[error("map {0} was supplied twice")]
    DuplicateMap(MapId),
    #[error("start map {0} is not loaded")]
    UnknownStartMap(MapId),
}

#[derive(Debug, Clone)]
struct PendingSwitch {
    destination: MapId,
    intended: MapId,
    forced_cell: Option<Cell>,
    anchor: Option<Cell>,
    alternate_world: bool,
}

/// Owns the loaded maps and the current map, and runs the timed fade/flicker
/// phases of a map switch. The current map is held apart from the others and
/// swapped in a single step at commit.
#[derive(Debug)]
pub struct TransitionController {
    current: WorldMap,
    others: BTreeMap<MapId, WorldMap>,
    config: TransitionConfig,
    debug_flags: DebugFlags,
    rng: StdRng,
    clock: f64,
    last_schedule_at: Option<f64>,
    pending: Option<PendingSwitch>,
    phase: TransitionPhase,
    phase_elapsed: f32,
    resume_arrival: Option<(MapId, Cell)>,
    occupied: BTreeMap<MapId, Vec<Cell>>,
}

impl TransitionController {
    pub fn new(
        maps: Vec<WorldMap>,
        start: MapId,
        config: TransitionConfig,
        debug_flags: DebugFlags,
        rng: StdRng,
    ) -> Result<Self, ControllerError> {
        if maps.is_empty() {
            return Err(ControllerError::NoMaps);
        }
        let mut others = BTreeMap::new();
        for map in maps {
            let id = map.id().clone();
            if others.insert(id.clone(), map).is_some() {
                return Err(ControllerError::DuplicateMap(id));
            }
        }
        let Some(current) = others.remove(&start) else {
            return Err(ControllerError::UnknownStartMap(start));
        };

        info!(
            start = %start,
            maps = others.len() + 1,
            alternate_world = config.alternate_world_map.as_ref().map(MapId::as_str),
            "transition_controller_ready"
        );
        Ok(Self {
            current,
            others,
            config,
            debug_flags,
            rng,
            clock: 0.0,
            last_schedule_at: None,
            pending: None,
            phase: TransitionPhase::Idle,
            phase_elapsed: 0.0,
            resume_arrival: None,
            occupied: BTreeMap::new(),
        })
    }

    pub fn current_map_id(&self) -> &MapId {
        self.current.id()
    }

    /// The single accessor for the active map. Callers re-query it every frame.
    pub fn current_map(&self) -> &WorldMap {
        &self.current
    }

    pub fn current_map_mut(&mut self) -> &mut WorldMap {
        &mut self.current
    }

    pub fn map(&self, id: &MapId) -> Option<&WorldMap> {
        if self.current.id() == id {
            Some(&self.current)
        } else {
            self.others.get(id)
        }
    }

    pub fn map_mut(&mut self, id: &MapId) -> Option<&mut WorldMap> {
        if self.current.id() == id {
            Some(&mut self.current)
        } else {
            self.others.get_mut(id)
        }
    }

    pub fn has_map(&self, id: &MapId) -> bool {
        self.map(id).is_some()
    }

    /// All loaded maps, sorted by id.
    pub fn maps(&self) -> Vec<&WorldMap> {
        let mut maps = self.others.values().collect::<Vec<_>>();
        maps.push(&self.current);
        maps.sort_by(|a, b| a.id().cmp(b.id()));
        maps
    }

    pub fn debug_flags(&self) -> DebugFlags {
        self.debug_flags
    }

    /// Replaces the cells held by other actors on `map`.
    pub fn set_occupied_cells(&mut self, map: MapId, cells: Vec<Cell>) {
        self.occupied.insert(map, cells);
    }

    pub fn occupied_cells(&self, map: &MapId) -> &[Cell] {
        self.occupied.get(map).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_debug_flags(&mut self, debug_flags: DebugFlags) {
        self.debug_flags = debug_flags;
    }

    pub fn phase(&self) -> TransitionPhase {
        self.phase
    }

    /// Progress through the current timed phase in `[0, 1]`; `0` when idle.
    pub fn phase_fraction(&self) -> f32 {
        let duration = match self.phase {
            TransitionPhase::Idle | TransitionPhase::Switching => return 0.0,
            TransitionPhase::FadingOut => self.config.fade_out_seconds,
            TransitionPhase::Flickering => self.config.flicker_seconds,
            TransitionPhase::FadingIn => self.config.fade_in_seconds,
        };
        if duration <= 0.0 {
            return 1.0;
        }
        (self.phase_elapsed / duration).clamp(0.0, 1.0)
    }

    /// Alternating visibility flag for the alternate-world flicker.
    pub fn flicker_visible(&self) -> bool {
        if self.phase != TransitionPhase::Flickering {
            return true;
        }
        let toggle = self.config.flicker_toggle_seconds.max(f32::EPSILON);
        ((self.phase_elapsed / toggle) as i64) % 2 == 0
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_destination(&self) -> Option<&MapId> {
        self.pending.as_ref().map(|pending| &pending.destination)
    }

    /// Destination the caller asked for; differs from the pending destination
    /// when the alternate-world branch fired.
    pub fn intended_destination(&self) -> Option<&MapId> {
        self.pending.as_ref().map(|pending| &pending.intended)
    }

    pub fn pending_is_forced(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| pending.forced_cell.is_some())
    }

    /// Arrival cell used on the next commit into `map` when no forced cell applies.
    pub fn set_resume_arrival(&mut self, map: MapId, cell: Cell) {
        self.resume_arrival = Some((map, cell));
    }

    pub fn schedule_switch(
        &mut self,
        destination: &MapId,
        teleporter: Option<&Teleporter>,
        forced_cell: Option<Cell>,
    ) -> ScheduleOutcome {
        if !self.has_map(destination) {
            warn!(destination = %destination, "transition_rejected_unknown_map");
            return ScheduleOutcome::Rejected(ScheduleRejection::UnknownMap);
        }
        if let Some(pending) = &self.pending {
            // A scripted relocation replaces a queued ordinary switch.
            if forced_cell.is_none() || pending.forced_cell.is_some() {
                debug!(
                    destination = %destination,
                    pending = %pending.destination,
                    "transition_rejected_already_scheduled"
                );
                return ScheduleOutcome::Rejected(ScheduleRejection::AlreadyScheduled);
            }
            debug!(
                destination = %destination,
                superseded = %pending.destination,
                "transition_superseded_by_forced"
            );
        }
        if forced_cell.is_none() && self.cooldown_active() {
            debug!(destination = %destination, "transition_rejected_cooldown");
            return ScheduleOutcome::Rejected(ScheduleRejection::CoolingDown);
        }

        let mut pending = PendingSwitch {
            destination: destination.clone(),
            intended: destination.clone(),
            forced_cell,
            anchor: None,
            alternate_world: false,
        };

        if forced_cell.is_none() {
            if let Some(alternate) = self.qualifying_alternate_world(destination) {
                if self.rng.gen_bool(ALTERNATE_WORLD_PROBABILITY) {
                    pending.destination = alternate;
                    pending.alternate_world = true;
                }
            }
            if !pending.alternate_world && teleporter.is_some() {
                pending.anchor = self
                    .map(destination)
                    .and_then(|map| map.teleporter_leading_to(self.current.id()))
                    .map(|back| back.cell);
            }
        }

        self.last_schedule_at = Some(self.clock);
        self.phase = if pending.alternate_world {
            TransitionPhase::Flickering
        } else {
            TransitionPhase::FadingOut
        };
        self.phase_elapsed = 0.0;

        info!(
            from = %self.current.id(),
            destination = %pending.destination,
            intended = %pending.intended,
            forced_cell = ?pending.forced_cell,
            anchor = ?pending.anchor,
            alternate_world = pending.alternate_world,
            "transition_scheduled"
        );
        let outcome = ScheduleOutcome::Accepted {
            destination: pending.destination.clone(),
            alternate_world: pending.alternate_world,
        };
        self.pending = Some(pending);
        outcome
    }

    /// Steps the phase clock. When the dwell elapses the switch commits: the
    /// current map changes and `player` is moved to the resolved arrival cell.
    pub fn advance(&mut self, dt: f32, player: &mut Vec2) -> Option<TransitionCommit> {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.clock += f64::from(dt);

        match self.phase {
            TransitionPhase::Idle | TransitionPhase::Switching => None,
            TransitionPhase::FadingIn => {
                self.phase_elapsed += dt;
                if self.phase_elapsed >= self.config.fade_in_seconds {
                    self.phase = TransitionPhase::Idle;
                    self.phase_elapsed = 0.0;
                }
                None
            }
            TransitionPhase::FadingOut | TransitionPhase::Flickering => {
                self.phase_elapsed += dt;
                let dwell = if self.phase == TransitionPhase::Flickering {
                    self.config.flicker_seconds
                } else {
                    self.config.fade_out_seconds
                };
                if self.phase_elapsed < dwell {
                    return None;
                }
                let commit = self.commit(player);
                self.phase = TransitionPhase::FadingIn;
                self.phase_elapsed = 0.0;
                commit
            }
        }
    }

    fn commit(&mut self, player: &mut Vec2) -> Option<TransitionCommit> {
        let pending = self.pending.take()?;
        self.phase = TransitionPhase::Switching;

        let resume = self
            .resume_arrival
            .take()
            .filter(|(map, _)| *map == pending.destination)
            .map(|(_, cell)| cell);
        let from = self.current.id().clone();
        if pending.destination != from {
            let Some(next) = self.others.remove(&pending.destination) else {
                warn!(destination = %pending.destination, "transition_destination_unloaded");
                return None;
            };
            let previous = std::mem::replace(&mut self.current, next);
            self.others.insert(previous.id().clone(), previous);
        }

        let map = &self.current;
        let placement = resolve_arrival(
            map,
            ArrivalHints {
                forced: pending.forced_cell,
                resume,
                anchor: pending.anchor,
                occupied: self.occupied_cells(map.id()),
            },
            self.debug_flags,
        );
        *player = map.grid().cell_origin(placement.cell);

        info!(
            from = %from,
            to = %self.current.id(),
            cell = %placement.cell,
            source = ?placement.source,
            degraded = placement.degraded,
            "transition_committed"
        );
        Some(TransitionCommit {
            from,
            to: self.current.id().clone(),
            placement,
        })
    }

    fn cooldown_active(&self) -> bool {
        self.last_schedule_at
            .is_some_and(|at| self.clock - at < SWITCH_COOLDOWN_SECONDS)
    }

    fn qualifying_alternate_world(&self, destination: &MapId) -> Option<MapId> {
        let alternate = self.config.alternate_world_map.as_ref()?;
        let current = self.current.id();
        let qualifies = destination != current
            && destination != alternate
            && current != alternate
            && self.others.contains_key(alternate);
        qualifies.then(|| alternate.clone())
    }
}
