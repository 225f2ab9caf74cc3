use std::path::PathBuf;

use overworld::{
    ActionStates, Cell, FollowOutcome, InputAction, InputSnapshot, MapId, NavigationOutcome,
    PersistenceError, SavedVec2, ScheduleOutcome, TransitionCommit, WorldSession,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::script::{Script, ScriptCommand, ScriptLine};

pub(crate) const TICKS_PER_SECOND: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickStatus {
    Running,
    Finished,
}

#[derive(Debug, Error)]
pub(crate) enum DriverError {
    #[error("script line {line}: save to slot '{slot}' failed: {source}")]
    Save {
        line: usize,
        slot: String,
        #[source]
        source: PersistenceError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct CommitRecord {
    pub(crate) frame: u64,
    #[serde(flatten)]
    pub(crate) commit: TransitionCommit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ArrivalRecord {
    pub(crate) frame: u64,
    pub(crate) map: MapId,
    pub(crate) cell: Cell,
    pub(crate) interrupted: bool,
}

/// Printed as JSON once the script is exhausted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct RunSummary {
    pub(crate) frames: u64,
    pub(crate) final_map: MapId,
    pub(crate) final_map_display_name: String,
    pub(crate) player: SavedVec2,
    pub(crate) player_cell: Cell,
    pub(crate) commits: Vec<CommitRecord>,
    pub(crate) arrivals: Vec<ArrivalRecord>,
    pub(crate) rejected_requests: u32,
    pub(crate) saves: Vec<PathBuf>,
}

/// Replays a script against a session, one fixed frame per [`ScriptDriver::tick`].
pub(crate) struct ScriptDriver {
    session: WorldSession,
    script: Script,
    next_line: usize,
    wait_frames: u32,
    held: ActionStates,
    saves_dir: PathBuf,
    frame: u64,
    commits: Vec<CommitRecord>,
    arrivals: Vec<ArrivalRecord>,
    rejected_requests: u32,
    saves: Vec<PathBuf>,
}

impl ScriptDriver {
    pub(crate) fn new(session: WorldSession, script: Script, saves_dir: PathBuf) -> Self {
        Self {
            session,
            script,
            next_line: 0,
            wait_frames: 0,
            held: ActionStates::default(),
            saves_dir,
            frame: 0,
            commits: Vec::new(),
            arrivals: Vec::new(),
            rejected_requests: 0,
            saves: Vec::new(),
        }
    }

    pub(crate) fn fixed_dt() -> f32 {
        1.0 / TICKS_PER_SECOND as f32
    }

    pub(crate) fn session(&self) -> &WorldSession {
        &self.session
    }

    /// Applies commands up to the next `wait`, then simulates one frame.
    pub(crate) fn tick(&mut self) -> Result<TickStatus, DriverError> {
        while self.wait_frames == 0 {
            let Some(line) = self.script.lines().get(self.next_line).cloned() else {
                return Ok(TickStatus::Finished);
            };
            self.next_line += 1;
            self.apply(&line)?;
        }

        self.wait_frames -= 1;
        self.step_frame();
        Ok(TickStatus::Running)
    }

    pub(crate) fn summary(&self) -> RunSummary {
        RunSummary {
            frames: self.frame,
            final_map: self.session.current_map_id().clone(),
            final_map_display_name: self.session.current_map_display_name().to_string(),
            player: SavedVec2::from(self.session.player()),
            player_cell: self.session.player_cell(),
            commits: self.commits.clone(),
            arrivals: self.arrivals.clone(),
            rejected_requests: self.rejected_requests,
            saves: self.saves.clone(),
        }
    }

    fn apply(&mut self, line: &ScriptLine) -> Result<(), DriverError> {
        debug!(line = line.line, command = ?line.command, "script_command");
        match &line.command {
            ScriptCommand::Wait { frames } => self.wait_frames = *frames,
            ScriptCommand::Hold { action } => self.held.set(*action, true),
            ScriptCommand::Release { action: Some(action) } => self.held.set(*action, false),
            ScriptCommand::Release { action: None } => {
                for action in InputAction::ALL {
                    self.held.set(action, false);
                }
            }
            ScriptCommand::Goto { map, cell } => {
                let outcome = self.session.request_navigation(map, *cell);
                self.note_navigation(line.line, &outcome);
            }
            ScriptCommand::GotoNamed { name } => {
                let outcome = self.session.request_named_destination(name);
                self.note_navigation(line.line, &outcome);
            }
            ScriptCommand::Teleport { map, cell } => {
                let outcome = self.session.schedule_switch(map, Some(*cell));
                self.note_schedule(line.line, &outcome);
            }
            ScriptCommand::Switch { map } => {
                let outcome = self.session.schedule_switch(map, None);
                self.note_schedule(line.line, &outcome);
            }
            ScriptCommand::Noclip { enabled } => self.session.set_noclip(*enabled),
            ScriptCommand::Hide { layer } => self.set_layer_hidden(line.line, layer, true),
            ScriptCommand::Show { layer } => self.set_layer_hidden(line.line, layer, false),
            ScriptCommand::Save { slot } => {
                let path = self.saves_dir.join(format!("{slot}.json"));
                self.session
                    .save(&path)
                    .map_err(|source| DriverError::Save {
                        line: line.line,
                        slot: slot.clone(),
                        source,
                    })?;
                self.saves.push(path);
            }
        }
        Ok(())
    }

    fn step_frame(&mut self) {
        let input = InputSnapshot::from_actions(self.held);
        let report = self.session.advance(Self::fixed_dt(), &input);
        self.frame += 1;

        if let Some(commit) = report.commit {
            self.commits.push(CommitRecord {
                frame: self.frame,
                commit,
            });
        }
        if let Some(outcome) = &report.resumed {
            debug!(frame = self.frame, outcome = ?outcome, "navigation_resumed");
        }
        let finished = match report.follow {
            FollowOutcome::Arrived(cell) => Some((cell, false)),
            FollowOutcome::Interrupted(cell) => Some((cell, true)),
            FollowOutcome::Idle | FollowOutcome::Moving => None,
        };
        if let Some((cell, interrupted)) = finished {
            self.arrivals.push(ArrivalRecord {
                frame: self.frame,
                map: self.session.current_map_id().clone(),
                cell,
                interrupted,
            });
        }
        if let Some(ScheduleOutcome::Rejected(rejection)) = report.teleport {
            debug!(frame = self.frame, rejection = ?rejection, "teleporter_ignored");
        }
    }

    fn note_navigation(&mut self, line: usize, outcome: &NavigationOutcome) {
        match outcome {
            NavigationOutcome::NoPath
            | NavigationOutcome::SwitchRejected(_)
            | NavigationOutcome::UnknownDestination => {
                self.rejected_requests += 1;
                info!(line, outcome = ?outcome, "script_navigation_refused");
            }
            _ => debug!(line, outcome = ?outcome, "script_navigation"),
        }
    }

    fn note_schedule(&mut self, line: usize, outcome: &ScheduleOutcome) {
        if let ScheduleOutcome::Rejected(rejection) = outcome {
            self.rejected_requests += 1;
            info!(line, rejection = ?rejection, "script_switch_refused");
        }
    }

    fn set_layer_hidden(&mut self, line: usize, layer: &str, hidden: bool) {
        if !self.session.set_layer_hidden(layer, hidden) {
            warn!(line, layer, hidden, "script_layer_unchanged");
        }
    }
}
