use std::collections::BTreeMap;
use std::path::Path;

use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::config::{DebugFlags, WorldConfig};
use crate::geometry::{Cell, PixelRect, Vec2};
use crate::input::InputSnapshot;
use crate::persistence::{LayerSource, PersistenceError, SaveGame};
use crate::router::{CrossMapRouter, FollowOutcome, NavigationOutcome};
use crate::transition::{
    ControllerError, ScheduleOutcome, TransitionCommit, TransitionController, TransitionPhase,
};
use crate::world_map::{MapId, WorldMap};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

/// What happened during one [`WorldSession::advance`] call, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub cancelled_at: Option<Cell>,
    pub commit: Option<TransitionCommit>,
    pub resumed: Option<NavigationOutcome>,
    pub follow: FollowOutcome,
    pub teleport: Option<ScheduleOutcome>,
}

/// Player, maps and routing wired together with a fixed per-frame order:
/// manual-input cancel, switch commit, goal resume, path following, then free
/// movement and teleporter checks. The frame that cancels a walk does not move.
#[derive(Debug)]
pub struct WorldSession {
    transitions: TransitionController,
    router: CrossMapRouter,
    player: Vec2,
    map_sources: BTreeMap<MapId, String>,
    walk_speed_px_per_second: f32,
}

impl WorldSession {
    pub fn new(
        transitions: TransitionController,
        config: &WorldConfig,
        player: Option<Vec2>,
        map_sources: BTreeMap<MapId, String>,
    ) -> Self {
        let map = transitions.current_map();
        let player = player.unwrap_or_else(|| map.grid().cell_origin(map.spawn()));
        Self {
            router: CrossMapRouter::new(&config.navigation),
            player,
            map_sources,
            walk_speed_px_per_second: config.player.walk_speed_tiles_per_second
                * config.tile_size as f32,
            transitions,
        }
    }

    /// Rebuilds the world from a save or world file. The controller starts idle.
    pub fn from_save(
        save: &SaveGame,
        source: &impl LayerSource,
        config: &WorldConfig,
        rng: StdRng,
    ) -> Result<Self, SessionError> {
        let maps = save.build_maps(source, config.tile_size)?;
        let transitions = TransitionController::new(
            maps,
            save.current_map.clone(),
            config.transition.clone(),
            config.debug,
            rng,
        )?;
        let session = Self::new(
            transitions,
            config,
            save.player.map(Vec2::from),
            save.map_sources(),
        );
        info!(
            map = %session.current_map_id(),
            x = session.player.x,
            y = session.player.y,
            "session_restored"
        );
        Ok(session)
    }

    pub fn snapshot(&self) -> SaveGame {
        SaveGame::capture(
            self.transitions.current_map_id(),
            self.transitions.maps(),
            &self.map_sources,
            self.player,
        )
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        self.snapshot().save(path)
    }

    pub fn player(&self) -> Vec2 {
        self.player
    }

    pub fn player_cell(&self) -> Cell {
        self.transitions.current_map().grid().cell_at(self.player)
    }

    pub fn current_map_id(&self) -> &MapId {
        self.transitions.current_map_id()
    }

    pub fn current_map(&self) -> &WorldMap {
        self.transitions.current_map()
    }

    pub fn current_map_display_name(&self) -> &str {
        self.transitions.current_map().display_name()
    }

    pub fn transitions(&self) -> &TransitionController {
        &self.transitions
    }

    pub fn router(&self) -> &CrossMapRouter {
        &self.router
    }

    pub fn phase(&self) -> TransitionPhase {
        self.transitions.phase()
    }

    pub fn debug_flags(&self) -> DebugFlags {
        self.transitions.debug_flags()
    }

    pub fn set_noclip(&mut self, noclip: bool) {
        let mut flags = self.transitions.debug_flags();
        flags.noclip = noclip;
        self.transitions.set_debug_flags(flags);
        info!(noclip, "debug_noclip_set");
    }

    /// Replaces the cells occupied by other actors on `map`.
    pub fn set_actors(&mut self, map: MapId, cells: Vec<Cell>) {
        self.transitions.set_occupied_cells(map, cells);
    }

    pub fn set_layer_hidden(&mut self, layer: &str, hidden: bool) -> bool {
        self.transitions.current_map_mut().set_layer_hidden(layer, hidden)
    }

    fn current_actors(&self) -> &[Cell] {
        self.transitions
            .occupied_cells(self.transitions.current_map_id())
    }

    pub fn request_navigation(&mut self, map: &MapId, goal: Cell) -> NavigationOutcome {
        let obstacles = self.current_actors().to_vec();
        self.router
            .request_navigation(map, goal, self.player, &mut self.transitions, &obstacles)
    }

    pub fn request_named_destination(&mut self, name: &str) -> NavigationOutcome {
        let obstacles = self.current_actors().to_vec();
        self.router
            .request_named_destination(name, self.player, &mut self.transitions, &obstacles)
    }

    /// Scripted relocation or plain switch requested by an outside collaborator.
    pub fn schedule_switch(&mut self, map: &MapId, forced_cell: Option<Cell>) -> ScheduleOutcome {
        self.transitions.schedule_switch(map, None, forced_cell)
    }

    pub fn advance(&mut self, dt: f32, input: &InputSnapshot) -> FrameReport {
        let manual = input.has_manual_movement();
        let mut cancelled_at = None;
        if manual && self.router.is_navigating() {
            cancelled_at = self
                .router
                .cancel(&mut self.player, self.transitions.current_map());
        }

        let commit = self.transitions.advance(dt, &mut self.player);

        let mut resumed = None;
        if let Some(commit) = &commit {
            let obstacles = self.current_actors().to_vec();
            resumed = self.router.on_transition_committed(
                commit,
                self.player,
                &mut self.transitions,
                &obstacles,
            );
        }

        let before = self.player;
        let mut follow = FollowOutcome::Idle;
        let mut walked = false;
        if self.router.is_navigating() {
            let map = self.transitions.current_map();
            follow = self.router.follow_path(
                dt,
                &mut self.player,
                map,
                self.transitions.occupied_cells(map.id()),
            );
        } else if manual
            && cancelled_at.is_none()
            && commit.is_none()
            && !self.transitions.is_pending()
        {
            self.move_manually(dt, input);
            walked = true;
        }

        // Path following walks over teleporters; only manual steps trigger them.
        let mut teleport = None;
        if walked && self.player != before && !self.transitions.is_pending() {
            let hit = self
                .transitions
                .current_map()
                .find_teleporter_at(self.player)
                .cloned();
            if let Some(teleporter) = hit {
                debug!(cell = %teleporter.cell, destination = %teleporter.destination, "teleporter_entered");
                teleport = Some(self.transitions.schedule_switch(
                    &teleporter.destination,
                    Some(&teleporter),
                    None,
                ));
            }
        }

        FrameReport {
            cancelled_at,
            commit,
            resumed,
            follow,
            teleport,
        }
    }

    /// Axis-separated movement so the player slides along walls.
    fn move_manually(&mut self, dt: f32, input: &InputSnapshot) {
        let (dx, dy) = input.movement_direction();
        let step = self.walk_speed_px_per_second * dt;
        let map = self.transitions.current_map();
        let tile = map.grid().tile_size() as f32;
        let debug_flags = self.transitions.debug_flags();
        let actors = self.transitions.occupied_cells(map.id());

        if dx != 0.0 {
            let candidate = Vec2::new(self.player.x + dx * step, self.player.y);
            if footprint_blocked(map, candidate, actors, debug_flags) {
                self.player.x = (self.player.x / tile).round() * tile;
            } else {
                self.player.x = candidate.x;
            }
        }
        if dy != 0.0 {
            let candidate = Vec2::new(self.player.x, self.player.y + dy * step);
            if footprint_blocked(map, candidate, actors, debug_flags) {
                self.player.y = (self.player.y / tile).round() * tile;
            } else {
                self.player.y = candidate.y;
            }
        }
    }
}

/// Leaving the map is never allowed; noclip skips walls and actors.
fn footprint_blocked(map: &WorldMap, position: Vec2, actors: &[Cell], debug_flags: DebugFlags) -> bool {
    let grid = map.grid();
    let rect = PixelRect::tile_footprint(position, grid.tile_size());
    if grid.cells_overlapping(rect).any(|cell| !grid.contains(cell)) {
        return true;
    }
    if debug_flags.noclip {
        return false;
    }
    map.is_blocked(rect, debug_flags)
        || grid
            .cells_overlapping(rect)
            .any(|cell| actors.contains(&cell))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::config::TransitionConfig;
    use crate::input::InputAction;
    use crate::world_map::{LayerData, Teleporter, WorldMapDesc};

    const TILE: u32 = 16;
    const FRAME: f32 = 1.0 / 60.0;

    fn config() -> WorldConfig {
        let mut config = WorldConfig {
            tile_size: TILE,
            ..WorldConfig::default()
        };
        config
            .navigation
            .entry_cells
            .insert(MapId::from("b.tmx"), Cell::new(2, 2));
        config
    }

    fn session() -> WorldSession {
        let a = WorldMap::build(WorldMapDesc {
            id: MapId::from("a.tmx"),
            display_name: Some("Town".to_string()),
            width: 8,
            height: 8,
            tile_size: TILE,
            layers: vec![
                LayerData::from_cells("wall", 8, 8, [Cell::new(3, 1)]),
                LayerData::from_cells("roof", 8, 8, []),
            ],
            teleporters: vec![Teleporter {
                cell: Cell::new(6, 1),
                destination: MapId::from("b.tmx"),
            }],
            spawn: Cell::new(1, 1),
        })
        .expect("a");
        let b = WorldMap::build(WorldMapDesc {
            id: MapId::from("b.tmx"),
            display_name: None,
            width: 8,
            height: 8,
            tile_size: TILE,
            layers: Vec::new(),
            teleporters: vec![Teleporter {
                cell: Cell::new(4, 4),
                destination: MapId::from("a.tmx"),
            }],
            spawn: Cell::new(0, 0),
        })
        .expect("b");
        let config = config();
        let transitions = TransitionController::new(
            vec![a, b],
            MapId::from("a.tmx"),
            TransitionConfig::default(),
            DebugFlags::default(),
            StdRng::seed_from_u64(11),
        )
        .expect("controller");
        WorldSession::new(transitions, &config, None, BTreeMap::new())
    }

    fn right() -> InputSnapshot {
        InputSnapshot::empty().with_action_down(InputAction::MoveRight)
    }

    #[test]
    fn player_starts_on_spawn_and_reports_display_name() {
        let session = session();
        assert_eq!(session.player(), Vec2::new(16.0, 16.0));
        assert_eq!(session.player_cell(), Cell::new(1, 1));
        assert_eq!(session.current_map_display_name(), "Town");
    }

    #[test]
    fn manual_movement_stops_flush_against_wall() {
        let mut session = session();
        for _ in 0..60 {
            session.advance(FRAME, &right());
        }
        // Wall at (3,1) stops the player on (2,1).
        assert_eq!(session.player(), Vec2::new(32.0, 16.0));
    }

    #[test]
    fn noclip_walks_through_walls() {
        let mut session = session();
        session.set_noclip(true);
        for _ in 0..20 {
            session.advance(FRAME, &right());
        }
        assert!(session.player().x > 48.0);
    }

    #[test]
    fn map_edge_blocks_even_with_noclip() {
        let mut session = session();
        session.set_noclip(true);
        let left = InputSnapshot::empty().with_action_down(InputAction::MoveLeft);
        for _ in 0..60 {
            session.advance(FRAME, &left);
        }
        assert_eq!(session.player().x, 0.0);
    }

    #[test]
    fn actors_block_manual_movement() {
        let mut session = session();
        session.set_actors(MapId::from("a.tmx"), vec![Cell::new(2, 1)]);
        for _ in 0..30 {
            session.advance(FRAME, &right());
        }
        assert_eq!(session.player(), Vec2::new(16.0, 16.0));
    }

    #[test]
    fn walking_onto_teleporter_switches_maps_at_reciprocal_anchor() {
        let mut session = session();
        let mut accepted = None;
        let mut commit = None;
        // Down off row 1, right under the teleporter at (6,1), then one step up into it.
        let down = InputSnapshot::empty().with_action_down(InputAction::MoveDown);
        let up = InputSnapshot::empty().with_action_down(InputAction::MoveUp);
        let script = [(down, 8), (right(), 40), (up, 4), (InputSnapshot::empty(), 40)];
        for (input, frames) in script {
            for _ in 0..frames {
                let report = session.advance(FRAME, &input);
                if let Some(outcome) = report.teleport {
                    accepted.get_or_insert(outcome);
                }
                if let Some(done) = report.commit {
                    commit.get_or_insert(done);
                }
            }
        }
        assert!(accepted.expect("teleporter hit").is_accepted());
        let commit = commit.expect("commit");
        assert_eq!(commit.to, MapId::from("b.tmx"));
        assert_eq!(commit.placement.cell, Cell::new(4, 6));
        assert_eq!(session.current_map_id(), &MapId::from("b.tmx"));
        assert_eq!(session.player(), Vec2::new(64.0, 96.0));
    }

    #[test]
    fn manual_input_is_ignored_while_switch_pending() {
        let mut session = session();
        assert!(session
            .schedule_switch(&MapId::from("b.tmx"), Some(Cell::new(5, 5)))
            .is_accepted());
        let before = session.player();
        session.advance(FRAME, &right());
        assert_eq!(session.player(), before);
    }

    #[test]
    fn hidden_layers_do_not_change_collision() {
        let mut session = session();
        assert!(session.set_layer_hidden("wall", true));
        assert_eq!(session.current_map().surface_revision(), 1);
        for _ in 0..60 {
            session.advance(FRAME, &right());
        }
        assert_eq!(session.player(), Vec2::new(32.0, 16.0));
    }

    #[test]
    fn snapshot_captures_current_map_and_player() {
        let mut session = session();
        session.schedule_switch(&MapId::from("b.tmx"), Some(Cell::new(5, 5)));
        for _ in 0..30 {
            session.advance(FRAME, &InputSnapshot::empty());
        }
        let save = session.snapshot();
        assert_eq!(save.current_map, MapId::from("b.tmx"));
        assert_eq!(save.player.map(Vec2::from), Some(Vec2::new(80.0, 80.0)));
        assert_eq!(save.maps.len(), 2);
        assert_eq!(save.maps[0].path, "a.tmx");
    }

    fn corridor_session() -> WorldSession {
        let corridor = WorldMap::build(WorldMapDesc {
            id: MapId::from("corridor.tmx"),
            display_name: None,
            width: 8,
            height: 3,
            tile_size: TILE,
            layers: Vec::new(),
            teleporters: vec![Teleporter {
                cell: Cell::new(3, 1),
                destination: MapId::from("b.tmx"),
            }],
            spawn: Cell::new(0, 1),
        })
        .expect("corridor");
        let b = WorldMap::build(WorldMapDesc {
            id: MapId::from("b.tmx"),
            display_name: None,
            width: 8,
            height: 8,
            tile_size: TILE,
            layers: Vec::new(),
            teleporters: Vec::new(),
            spawn: Cell::new(0, 0),
        })
        .expect("b");
        let transitions = TransitionController::new(
            vec![corridor, b],
            MapId::from("corridor.tmx"),
            TransitionConfig::default(),
            DebugFlags::default(),
            StdRng::seed_from_u64(5),
        )
        .expect("controller");
        WorldSession::new(transitions, &config(), None, BTreeMap::new())
    }

    #[test]
    fn path_following_walks_over_teleporters() {
        let mut session = corridor_session();
        let outcome = session.request_navigation(&MapId::from("corridor.tmx"), Cell::new(6, 1));
        assert_eq!(outcome, NavigationOutcome::Started { steps: 6 });

        let mut arrived = None;
        for _ in 0..300 {
            let report = session.advance(FRAME, &InputSnapshot::empty());
            assert!(report.teleport.is_none());
            assert!(report.commit.is_none());
            if let FollowOutcome::Arrived(cell) = report.follow {
                arrived = Some(cell);
                break;
            }
        }
        assert_eq!(arrived, Some(Cell::new(6, 1)));
        assert_eq!(session.current_map_id(), &MapId::from("corridor.tmx"));
        assert!(!session.transitions().is_pending());
    }

    #[test]
    fn forced_relocation_on_the_same_map_stops_the_walk() {
        let mut session = session();
        // Eleven steps at 5 px per frame outlast the quarter-second fade.
        let outcome = session.request_navigation(&MapId::from("a.tmx"), Cell::new(6, 7));
        assert_eq!(outcome, NavigationOutcome::Started { steps: 11 });
        session.advance(FRAME, &InputSnapshot::empty());

        assert!(session
            .schedule_switch(&MapId::from("a.tmx"), Some(Cell::new(7, 0)))
            .is_accepted());
        let mut commit = None;
        for _ in 0..120 {
            let report = session.advance(FRAME, &InputSnapshot::empty());
            if let Some(done) = report.commit {
                assert!(session.router().task().is_none());
                commit = Some(done);
            }
            assert!(!matches!(report.follow, FollowOutcome::Arrived(_)));
        }
        assert_eq!(commit.expect("commit").placement.cell, Cell::new(7, 0));
        assert!(!session.router().is_navigating());
        assert_eq!(session.player(), Vec2::new(112.0, 0.0));
        assert_eq!(session.player_cell(), Cell::new(7, 0));
    }

    #[test]
    fn arrival_avoids_actor_on_spawn_and_player_can_walk_away() {
        let mut session = session();
        session.set_actors(MapId::from("b.tmx"), vec![Cell::new(0, 0)]);
        assert!(session.schedule_switch(&MapId::from("b.tmx"), None).is_accepted());
        let mut commit = None;
        for _ in 0..60 {
            let report = session.advance(FRAME, &InputSnapshot::empty());
            if let Some(done) = report.commit {
                commit = Some(done);
            }
        }
        let commit = commit.expect("commit");
        assert_eq!(commit.placement.cell, Cell::new(1, 0));
        assert_eq!(session.player(), Vec2::new(16.0, 0.0));

        for _ in 0..10 {
            session.advance(FRAME, &right());
        }
        assert!(session.player().x > 16.0);
    }

    #[test]
    fn player_cell_follows_the_top_left_corner() {
        let mut session = session();
        session.set_noclip(true);
        // 128 px per second: four frames put the corner at x = 24.53, the center past x = 32.
        for _ in 0..4 {
            session.advance(FRAME, &right());
        }
        assert!(session.player().x > 24.0 && session.player().x < 32.0);
        assert_eq!(session.player_cell(), Cell::new(1, 1));
    }
}
