use std::collections::BTreeMap;

use overworld::{
    find_path, Cell, DebugFlags, FollowOutcome, InputAction, InputSnapshot, LayerData, MapId,
    NavigationOutcome, PlacementSource, ScheduleOutcome, ScheduleRejection, Teleporter,
    TransitionConfig, TransitionController, TransitionPhase, Vec2, WorldConfig, WorldMap,
    WorldMapDesc, WorldSession, ALTERNATE_WORLD_PROBABILITY,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

const TILE: u32 = 16;
const FRAME: f32 = 1.0 / 60.0;

fn build_map(id: &str, size: u32, walls: &[Cell], teleporters: Vec<Teleporter>) -> WorldMap {
    WorldMap::build(WorldMapDesc {
        id: MapId::from(id),
        display_name: None,
        width: size,
        height: size,
        tile_size: TILE,
        layers: vec![LayerData::from_cells("wall", size, size, walls.iter().copied())],
        teleporters,
        spawn: Cell::new(0, 0),
    })
    .expect("map")
}

fn teleporter(x: i32, y: i32, destination: &str) -> Teleporter {
    Teleporter {
        cell: Cell::new(x, y),
        destination: MapId::from(destination),
    }
}

fn controller(maps: Vec<WorldMap>, config: TransitionConfig, seed: u64) -> TransitionController {
    TransitionController::new(
        maps,
        MapId::from("mapA"),
        config,
        DebugFlags::default(),
        StdRng::seed_from_u64(seed),
    )
    .expect("controller")
}

fn origin(cell: Cell) -> Vec2 {
    Vec2::new((cell.x * TILE as i32) as f32, (cell.y * TILE as i32) as f32)
}

fn run_frames(session: &mut WorldSession, frames: usize, input: &InputSnapshot) {
    for _ in 0..frames {
        session.advance(FRAME, input);
    }
}

#[test]
fn paths_through_a_maze_are_adjacent_and_collision_free() {
    let walls = (0..6)
        .map(|y| Cell::new(2, y))
        .chain((1..7).map(|y| Cell::new(4, y)))
        .collect::<Vec<_>>();
    let map = build_map("mapA", 7, &walls, Vec::new());
    let dynamic = [Cell::new(6, 3)];

    let path = find_path(Cell::new(0, 0), Cell::new(6, 0), &map, &dynamic);
    assert_eq!(path.first(), Some(&Cell::new(0, 0)));
    assert_eq!(path.last(), Some(&Cell::new(6, 0)));
    // Six columns across plus down to row 6 and back up.
    assert_eq!(path.len(), 6 + 12 + 1);
    for pair in path.windows(2) {
        assert!(pair[0].is_adjacent_4(pair[1]));
    }
    for cell in &path {
        assert!(!map.has_collision(*cell));
        assert!(!dynamic.contains(cell));
    }
}

#[test]
fn teleporter_arrival_lands_in_offset_ring_and_never_on_collision() {
    let ring = [
        Cell::new(5, 7),
        Cell::new(5, 3),
        Cell::new(3, 5),
        Cell::new(7, 5),
        Cell::new(6, 6),
        Cell::new(4, 6),
        Cell::new(6, 4),
        Cell::new(4, 4),
    ];
    // Block the candidates one at a time, in search order.
    for blocked in 0..ring.len() {
        let walls = &ring[..blocked];
        let mut controller = controller(
            vec![
                build_map("mapA", 12, &[], vec![teleporter(2, 2, "mapB")]),
                build_map("mapB", 12, walls, vec![teleporter(5, 5, "mapA")]),
            ],
            TransitionConfig::default(),
            5,
        );
        let mut player = origin(Cell::new(2, 2));
        let used = teleporter(2, 2, "mapB");
        assert!(controller
            .schedule_switch(&MapId::from("mapB"), Some(&used), None)
            .is_accepted());
        let commit = controller.advance(1.0, &mut player).expect("commit");

        let cell = commit.placement.cell;
        assert_eq!(commit.placement.source, PlacementSource::TeleporterAnchor);
        assert!(!controller.current_map().has_collision(cell), "landed on {cell}");
        assert_eq!(cell, ring[blocked]);
        assert_eq!(player, origin(cell));
    }
}

#[test]
fn cooldown_accepts_one_of_two_quick_requests_and_reopens_later() {
    let mut controller = controller(
        vec![
            build_map("mapA", 8, &[], Vec::new()),
            build_map("mapB", 8, &[], Vec::new()),
        ],
        TransitionConfig::default(),
        1,
    );
    let mut player = Vec2::ZERO;
    let b = MapId::from("mapB");

    assert!(controller.schedule_switch(&b, None, None).is_accepted());
    controller.advance(0.1, &mut player);
    assert!(!controller.schedule_switch(&b, None, None).is_accepted());

    // 1.1 after the first request.
    controller.advance(0.5, &mut player);
    controller.advance(0.5, &mut player);
    assert_eq!(controller.phase(), TransitionPhase::Idle);
    assert!(controller
        .schedule_switch(&MapId::from("mapA"), None, None)
        .is_accepted());
}

#[test]
fn forced_request_right_after_accepted_one_places_exactly() {
    let mut controller = controller(
        vec![
            build_map("mapA", 8, &[], Vec::new()),
            build_map("mapB", 8, &[Cell::new(6, 6)], Vec::new()),
        ],
        TransitionConfig::default(),
        2,
    );
    let mut player = Vec2::ZERO;
    let b = MapId::from("mapB");
    assert!(controller.schedule_switch(&b, None, None).is_accepted());
    controller.advance(0.01, &mut player);

    // Forced cells are placed verbatim, walls included.
    assert!(controller
        .schedule_switch(&b, None, Some(Cell::new(6, 6)))
        .is_accepted());
    let commit = controller.advance(1.0, &mut player).expect("commit");
    assert_eq!(commit.placement.cell, Cell::new(6, 6));
    assert_eq!(commit.placement.source, PlacementSource::Forced);
    assert_eq!(player, origin(Cell::new(6, 6)));
}

#[test]
fn cross_map_navigation_resumes_then_yields_to_manual_input() {
    let mut config = WorldConfig {
        tile_size: TILE,
        ..WorldConfig::default()
    };
    config
        .navigation
        .entry_cells
        .insert(MapId::from("mapB"), Cell::new(3, 3));
    let transitions = controller(
        vec![
            build_map("mapA", 16, &[], Vec::new()),
            build_map("mapB", 16, &[Cell::new(5, 3)], Vec::new()),
        ],
        config.transition.clone(),
        3,
    );
    let mut session = WorldSession::new(transitions, &config, None, BTreeMap::new());

    let outcome = session.request_navigation(&MapId::from("mapB"), Cell::new(10, 10));
    assert_eq!(outcome, NavigationOutcome::SwitchScheduled { entry: Cell::new(3, 3) });
    assert!(session.transitions().pending_is_forced());
    assert_eq!(
        session.transitions().pending_destination(),
        Some(&MapId::from("mapB"))
    );

    let idle = InputSnapshot::empty();
    let mut resumed = None;
    for _ in 0..60 {
        let report = session.advance(FRAME, &idle);
        if let Some(commit) = report.commit {
            assert_eq!(commit.placement.cell, Cell::new(3, 3));
            resumed = report.resumed;
            break;
        }
    }
    assert_eq!(resumed, Some(NavigationOutcome::Started { steps: 14 }));
    let task = session.router().task().expect("in-map leg");
    assert_eq!(task.path().first(), Some(&Cell::new(3, 3)));
    assert_eq!(task.goal(), Some(Cell::new(10, 10)));

    run_frames(&mut session, 10, &idle);
    let last_snapped = session.router().task().expect("still walking").last_snapped();
    assert_ne!(last_snapped, Cell::new(3, 3));

    let report = session.advance(
        FRAME,
        &InputSnapshot::empty().with_action_down(InputAction::MoveLeft),
    );
    assert_eq!(report.cancelled_at, Some(last_snapped));
    assert_eq!(report.follow, FollowOutcome::Idle);
    assert!(session.router().task().is_none());
    assert_eq!(session.player(), origin(last_snapped));
}

#[test]
fn cross_map_navigation_walks_all_the_way_when_uninterrupted() {
    let mut config = WorldConfig {
        tile_size: TILE,
        ..WorldConfig::default()
    };
    config
        .navigation
        .entry_cells
        .insert(MapId::from("mapB"), Cell::new(3, 3));
    let transitions = controller(
        vec![
            build_map("mapA", 16, &[], Vec::new()),
            build_map("mapB", 16, &[], Vec::new()),
        ],
        config.transition.clone(),
        4,
    );
    let mut session = WorldSession::new(transitions, &config, None, BTreeMap::new());
    session.request_navigation(&MapId::from("mapB"), Cell::new(10, 10));

    let mut arrived = None;
    for _ in 0..600 {
        let report = session.advance(FRAME, &InputSnapshot::empty());
        if let FollowOutcome::Arrived(cell) = report.follow {
            arrived = Some(cell);
            break;
        }
    }
    assert_eq!(arrived, Some(Cell::new(10, 10)));
    assert_eq!(session.current_map_id(), &MapId::from("mapB"));
    assert_eq!(session.player(), origin(Cell::new(10, 10)));
}

#[test]
fn alternate_world_fires_about_thirty_percent_of_the_time() {
    let config = TransitionConfig {
        alternate_world_map: Some(MapId::from("darkMap")),
        ..TransitionConfig::default()
    };
    let mut controller = controller(
        vec![
            build_map("mapA", 4, &[], Vec::new()),
            build_map("mapB", 4, &[], Vec::new()),
            build_map("darkMap", 4, &[], Vec::new()),
        ],
        config,
        2024,
    );
    let mut player = Vec2::ZERO;
    let a = MapId::from("mapA");
    let b = MapId::from("mapB");

    let trials = 10_000;
    let mut fired = 0u32;
    for _ in 0..trials {
        match controller.schedule_switch(&b, None, None) {
            ScheduleOutcome::Accepted {
                alternate_world, ..
            } => {
                if alternate_world {
                    fired += 1;
                }
            }
            ScheduleOutcome::Rejected(rejection) => panic!("unexpected rejection {rejection:?}"),
        }
        controller.advance(2.0, &mut player);
        controller.advance(2.0, &mut player);

        // Scripted return home; forced switches skip both cooldown and the branch.
        assert!(controller.schedule_switch(&a, None, Some(Cell::new(0, 0))).is_accepted());
        controller.advance(2.0, &mut player);
        controller.advance(2.0, &mut player);
        assert_eq!(controller.current_map_id(), &a);
    }

    let rate = f64::from(fired) / f64::from(trials);
    assert!(
        (rate - ALTERNATE_WORLD_PROBABILITY).abs() < 0.02,
        "alternate-world rate {rate}"
    );
}

#[test]
fn unknown_map_requests_leave_state_untouched() {
    let mut controller = controller(
        vec![build_map("mapA", 4, &[], Vec::new())],
        TransitionConfig::default(),
        0,
    );
    assert_eq!(
        controller.schedule_switch(&MapId::from("mapZ"), None, Some(Cell::new(1, 1))),
        ScheduleOutcome::Rejected(ScheduleRejection::UnknownMap)
    );
    assert_eq!(controller.phase(), TransitionPhase::Idle);
    assert_eq!(controller.current_map_id(), &MapId::from("mapA"));
}
