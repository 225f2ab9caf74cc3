use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

mod atomic_io;
pub mod config;
pub mod geometry;
pub mod input;
pub mod pathfinder;
pub mod persistence;
pub mod router;
pub mod session;
pub mod transition;
pub mod world_map;

pub use config::{
    ConfigError, DebugFlags, NamedDestination, NavigationConfig, PlayerConfig, TransitionConfig,
    WorldConfig,
};
pub use geometry::{Cell, PixelRect, TileGrid, Vec2, DEFAULT_TILE_SIZE};
pub use input::{ActionStates, InputAction, InputSnapshot};
pub use pathfinder::find_path;
pub use persistence::{
    LayerSource, MapRecord, PersistenceError, SaveGame, SavedCell, SavedTeleporter, SavedVec2,
    TmxDirectory, SAVE_VERSION,
};
pub use router::{CrossMapRouter, FollowOutcome, NavigationOutcome, NavigationTask, PendingGoal};
pub use session::{FrameReport, SessionError, WorldSession};
pub use transition::{
    ControllerError, Placement, PlacementSource, ScheduleOutcome, ScheduleRejection,
    TransitionCommit, TransitionController, TransitionPhase, ALTERNATE_WORLD_PROBABILITY,
    SWITCH_COOLDOWN_SECONDS,
};
pub use world_map::{
    classify_layer, load_tmx, parse_tmx, BlockQuery, LayerClass, LayerData, MapId, Teleporter,
    TmxError, TmxMap, WorldBuildError, WorldMap, WorldMapDesc, ZoneKind,
};

pub const ROOT_ENV_VAR: &str = "OVERWORLD_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub maps_dir: PathBuf,
    pub saves_dir: PathBuf,
}

impl AppPaths {
    pub fn world_file(&self) -> PathBuf {
        self.maps_dir.join("world.json")
    }

    pub fn save_file(&self, slot: &str) -> PathBuf {
        self.saves_dir.join(format!("{slot}.json"))
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("failed to create saves directory at {path}: {source}")]
    CreateSavesDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "OVERWORLD_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/overworld\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    app_paths_for_root(root)
}

pub fn app_paths_for_root(root: PathBuf) -> Result<AppPaths, StartupError> {
    let maps_dir = root.join("assets").join("maps");
    let saves_dir = root.join("saves");

    fs::create_dir_all(&saves_dir).map_err(|source| StartupError::CreateSavesDir {
        path: saves_dir.clone(),
        source,
    })?;

    Ok(AppPaths {
        root,
        maps_dir,
        saves_dir,
    })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let raw = PathBuf::from(value);
            let normalized = normalize_path(&raw);
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            for candidate in exe_dir.ancestors() {
                if is_repo_marker(candidate) {
                    return Ok(normalize_path(candidate));
                }
            }

            Err(StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_marker_requires_cargo_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("assets")).expect("assets");
        assert!(!is_repo_marker(dir.path()));
        fs::write(dir.path().join("Cargo.toml"), "[workspace]\n").expect("cargo toml");
        assert!(is_repo_marker(dir.path()));
    }

    #[test]
    fn app_paths_create_saves_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = app_paths_for_root(dir.path().to_path_buf()).expect("paths");
        assert!(paths.saves_dir.is_dir());
        assert_eq!(paths.world_file(), dir.path().join("assets").join("maps").join("world.json"));
        assert_eq!(paths.save_file("slot1"), dir.path().join("saves").join("slot1.json"));
    }
}
