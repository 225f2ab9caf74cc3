use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{NamedDestination, NavigationConfig};
use crate::geometry::{Cell, Vec2};
use crate::pathfinder::find_path;
use crate::transition::{ScheduleOutcome, ScheduleRejection, TransitionCommit, TransitionController};
use crate::world_map::{MapId, WorldMap};

/// An automated walk along a precomputed path on one map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationTask {
    map: MapId,
    path: Vec<Cell>,
    cursor: usize,
    last_snapped: Cell,
}

impl NavigationTask {
    pub fn map(&self) -> &MapId {
        &self.map
    }

    pub fn path(&self) -> &[Cell] {
        &self.path
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn last_snapped(&self) -> Cell {
        self.last_snapped
    }

    pub fn goal(&self) -> Option<Cell> {
        self.path.last().copied()
    }

    fn current_target(&self) -> Option<Cell> {
        self.path.get(self.cursor).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingGoal {
    pub map: MapId,
    pub cell: Cell,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// Start and goal are the same cell; nothing to do.
    AlreadyThere,
    Started { steps: usize },
    NoPath,
    /// A forced switch toward the goal map was scheduled; the in-map leg resumes on arrival.
    SwitchScheduled { entry: Cell },
    /// A switch to the goal map was already pending; the goal rides along with it.
    Deferred,
    SwitchRejected(ScheduleRejection),
    UnknownDestination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Idle,
    Moving,
    Arrived(Cell),
    Interrupted(Cell),
}

/// Routes the player toward a goal that may sit on another map.
#[derive(Debug, Clone)]
pub struct CrossMapRouter {
    task: Option<NavigationTask>,
    pending_goal: Option<PendingGoal>,
    entry_cells: BTreeMap<MapId, Cell>,
    destinations: Vec<NamedDestination>,
    speed_px_per_second: f32,
    arrival_epsilon_px: f32,
}

impl CrossMapRouter {
    pub fn new(config: &NavigationConfig) -> Self {
        Self {
            task: None,
            pending_goal: None,
            entry_cells: config.entry_cells.clone(),
            destinations: config.destinations.clone(),
            speed_px_per_second: config.speed_px_per_second,
            arrival_epsilon_px: config.arrival_epsilon_px,
        }
    }

    pub fn task(&self) -> Option<&NavigationTask> {
        self.task.as_ref()
    }

    pub fn is_navigating(&self) -> bool {
        self.task.is_some()
    }

    pub fn pending_goal(&self) -> Option<&PendingGoal> {
        self.pending_goal.as_ref()
    }

    pub fn destinations(&self) -> &[NamedDestination] {
        &self.destinations
    }

    pub fn entry_cell(&self, map: &MapId) -> Option<Cell> {
        self.entry_cells.get(map).copied()
    }

    pub fn request_navigation(
        &mut self,
        goal_map: &MapId,
        goal: Cell,
        player: Vec2,
        transitions: &mut TransitionController,
        dynamic_obstacles: &[Cell],
    ) -> NavigationOutcome {
        if goal_map == transitions.current_map_id() {
            return self.start_local(goal, player, transitions.current_map(), dynamic_obstacles);
        }

        let Some(target) = transitions.map(goal_map) else {
            warn!(map = %goal_map, goal = %goal, "navigation_unknown_map");
            return NavigationOutcome::SwitchRejected(ScheduleRejection::UnknownMap);
        };
        let entry = match self.entry_cells.get(goal_map) {
            Some(cell) => *cell,
            None => {
                debug!(map = %goal_map, spawn = %target.spawn(), "navigation_entry_defaults_to_spawn");
                target.spawn()
            }
        };

        let pending_goal = PendingGoal {
            map: goal_map.clone(),
            cell: goal,
        };
        match transitions.schedule_switch(goal_map, None, Some(entry)) {
            ScheduleOutcome::Accepted { .. } => {
                self.task = None;
                info!(map = %goal_map, entry = %entry, goal = %goal, "navigation_cross_map_scheduled");
                self.pending_goal = Some(pending_goal);
                NavigationOutcome::SwitchScheduled { entry }
            }
            ScheduleOutcome::Rejected(ScheduleRejection::AlreadyScheduled)
                if transitions.pending_destination() == Some(goal_map) =>
            {
                transitions.set_resume_arrival(goal_map.clone(), entry);
                info!(map = %goal_map, goal = %goal, "navigation_goal_deferred");
                self.pending_goal = Some(pending_goal);
                NavigationOutcome::Deferred
            }
            ScheduleOutcome::Rejected(rejection) => {
                debug!(map = %goal_map, rejection = ?rejection, "navigation_switch_rejected");
                NavigationOutcome::SwitchRejected(rejection)
            }
        }
    }

    pub fn request_named_destination(
        &mut self,
        name: &str,
        player: Vec2,
        transitions: &mut TransitionController,
        dynamic_obstacles: &[Cell],
    ) -> NavigationOutcome {
        let Some(destination) = self
            .destinations
            .iter()
            .find(|destination| destination.name.eq_ignore_ascii_case(name))
            .cloned()
        else {
            warn!(name, "navigation_unknown_destination");
            return NavigationOutcome::UnknownDestination;
        };
        self.request_navigation(
            &destination.map,
            destination.cell,
            player,
            transitions,
            dynamic_obstacles,
        )
    }

    /// Runs after every committed switch, before path following for the frame.
    /// A commit always relocates the player, so any active walk is abandoned;
    /// only a pending goal for the arrival map is re-planned from the new cell.
    pub fn on_transition_committed(
        &mut self,
        commit: &TransitionCommit,
        player: Vec2,
        transitions: &mut TransitionController,
        dynamic_obstacles: &[Cell],
    ) -> Option<NavigationOutcome> {
        if let Some(task) = self.task.take() {
            debug!(
                map = %task.map,
                from = %commit.from,
                to = %commit.to,
                placed = %commit.placement.cell,
                "navigation_task_dropped_on_commit"
            );
        }

        let goal = self.pending_goal.take()?;
        if goal.map != commit.to {
            info!(
                goal_map = %goal.map,
                arrived = %commit.to,
                "navigation_goal_dropped_wrong_map"
            );
            return None;
        }
        Some(self.request_navigation(&goal.map, goal.cell, player, transitions, dynamic_obstacles))
    }

    /// Cancels the active walk and snaps the player back onto the last cell reached.
    pub fn cancel(&mut self, player: &mut Vec2, map: &WorldMap) -> Option<Cell> {
        let task = self.task.take()?;
        *player = map.grid().cell_origin(task.last_snapped);
        info!(map = %task.map, cell = %task.last_snapped, "navigation_cancelled");
        Some(task.last_snapped)
    }

    pub fn clear_pending_goal(&mut self) {
        self.pending_goal = None;
    }

    /// Advances the player one frame along the active path.
    pub fn follow_path(
        &mut self,
        dt: f32,
        player: &mut Vec2,
        map: &WorldMap,
        dynamic_obstacles: &[Cell],
    ) -> FollowOutcome {
        let Some(task) = self.task.as_mut() else {
            return FollowOutcome::Idle;
        };
        let Some(target) = task.current_target() else {
            self.task = None;
            return FollowOutcome::Idle;
        };

        if target != task.last_snapped && dynamic_obstacles.contains(&target) {
            let cell = task.last_snapped;
            *player = map.grid().cell_origin(cell);
            info!(map = %task.map, blocked = %target, cell = %cell, "navigation_interrupted");
            self.task = None;
            return FollowOutcome::Interrupted(cell);
        }

        let (next, arrived) = step_toward(
            *player,
            map.grid().cell_origin(target),
            self.speed_px_per_second,
            dt,
            self.arrival_epsilon_px,
        );
        *player = next;
        if !arrived {
            return FollowOutcome::Moving;
        }

        task.last_snapped = target;
        task.cursor = task.cursor.saturating_add(1);
        if task.cursor < task.path.len() {
            return FollowOutcome::Moving;
        }
        info!(map = %task.map, cell = %target, "navigation_arrived");
        self.task = None;
        FollowOutcome::Arrived(target)
    }

    fn start_local(
        &mut self,
        goal: Cell,
        player: Vec2,
        map: &WorldMap,
        dynamic_obstacles: &[Cell],
    ) -> NavigationOutcome {
        let start = map.grid().cell_at(player);
        let path = find_path(start, goal, map, dynamic_obstacles);
        match path.len() {
            0 => {
                info!(map = %map.id(), start = %start, goal = %goal, "navigation_no_path");
                NavigationOutcome::NoPath
            }
            1 => NavigationOutcome::AlreadyThere,
            len => {
                info!(map = %map.id(), start = %start, goal = %goal, steps = len - 1, "navigation_started");
                self.task = Some(NavigationTask {
                    map: map.id().clone(),
                    path,
                    cursor: 0,
                    last_snapped: start,
                });
                NavigationOutcome::Started { steps: len - 1 }
            }
        }
    }
}

/// One frame of path following toward the next cell origin. Returns the new
/// player position and whether that cell was reached; positions within
/// `arrival_threshold` or a single frame's travel snap exactly onto it.
pub(crate) fn step_toward(
    current: Vec2,
    target: Vec2,
    speed: f32,
    dt: f32,
    arrival_threshold: f32,
) -> (Vec2, bool) {
    let dx = target.x - current.x;
    let dy = target.y - current.y;
    let distance_sq = dx * dx + dy * dy;
    let threshold_sq = arrival_threshold * arrival_threshold;
    if distance_sq <= threshold_sq {
        return (target, true);
    }

    let distance = distance_sq.sqrt();
    let max_step = speed * dt;
    if max_step >= distance {
        return (target, true);
    }

    let inv_distance = distance.recip();
    (
        Vec2 {
            x: current.x + dx * inv_distance * max_step,
            y: current.y + dy * inv_distance * max_step,
        },
        false,
    )
}
