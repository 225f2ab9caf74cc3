use std::path::{Path, PathBuf};

use overworld::{
    resolve_app_paths, AppPaths, ConfigError, PersistenceError, SaveGame, SessionError,
    StartupError, TmxDirectory, WorldConfig, WorldSession,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::driver::ScriptDriver;
use super::loop_runner::LoopConfig;
use super::script::{load_script, ScriptError};

const CONFIG_ENV_VAR: &str = "OVERWORLD_CONFIG";
const SEED_ENV_VAR: &str = "OVERWORLD_SEED";
const REALTIME_ENV_VAR: &str = "OVERWORLD_REALTIME";
const DEFAULT_SCRIPT: &str = "demo.script";

pub(crate) struct AppWiring {
    pub(crate) driver: ScriptDriver,
    pub(crate) loop_config: LoopConfig,
}

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("{var} must be an unsigned integer, got '{raw}'")]
    InvalidSeed { var: &'static str, raw: String },
    #[error("{0}\nusage: game [--script <path>] [--load <slot>]")]
    Usage(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CliOptions {
    pub(crate) script: Option<PathBuf>,
    pub(crate) load_slot: Option<String>,
}

pub(crate) fn parse_cli_args(args: &[String]) -> Result<CliOptions, BootstrapError> {
    let mut options = CliOptions::default();
    let mut index = 0usize;
    while index < args.len() {
        let flag = args[index].as_str();
        let value = args.get(index + 1);
        match (flag, value) {
            ("--script", Some(value)) => options.script = Some(PathBuf::from(value)),
            ("--load", Some(value)) => options.load_slot = Some(value.clone()),
            ("--script" | "--load", None) => {
                return Err(BootstrapError::Usage(format!("missing value for {flag}")))
            }
            _ => return Err(BootstrapError::Usage(format!("unknown argument '{flag}'"))),
        }
        index += 2;
    }
    Ok(options)
}

pub(crate) fn build_app(args: &[String]) -> Result<AppWiring, BootstrapError> {
    init_tracing();
    info!("=== Overworld Startup ===");

    let options = parse_cli_args(args)?;
    let paths = resolve_app_paths()?;
    let config = load_config(&paths)?;
    let rng = seeded_rng()?;

    let (save, save_path) = match &options.load_slot {
        Some(slot) => {
            let path = paths.save_file(slot);
            (SaveGame::load(&path)?, path)
        }
        None => {
            let path = paths.world_file();
            (SaveGame::load(&path)?, path)
        }
    };
    let source = TmxDirectory::new(paths.maps_dir.clone());
    let session = WorldSession::from_save(&save, &source, &config, rng)?;
    info!(
        world = %save_path.display(),
        map = %session.current_map_id(),
        display_name = session.current_map_display_name(),
        "world_loaded"
    );

    let script_path = options
        .script
        .unwrap_or_else(|| paths.root.join("assets").join("scripts").join(DEFAULT_SCRIPT));
    let script = load_script(&script_path)?;
    info!(
        script = %script_path.display(),
        commands = script.lines().len(),
        frames = script.total_wait_frames(),
        "script_loaded"
    );

    Ok(AppWiring {
        driver: ScriptDriver::new(session, script, paths.saves_dir.clone()),
        loop_config: LoopConfig {
            realtime: parse_enabled_flag(std::env::var(REALTIME_ENV_VAR).ok().as_deref()),
            ..LoopConfig::default()
        },
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// `OVERWORLD_CONFIG` wins; otherwise `assets/config.json` if present, else defaults.
fn load_config(paths: &AppPaths) -> Result<WorldConfig, ConfigError> {
    let explicit = std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from);
    let path = explicit.or_else(|| {
        let candidate = paths.root.join("assets").join("config.json");
        candidate.is_file().then_some(candidate)
    });
    match path {
        Some(path) => load_config_file(&path),
        None => {
            info!("config_defaults_used");
            Ok(WorldConfig::default())
        }
    }
}

fn load_config_file(path: &Path) -> Result<WorldConfig, ConfigError> {
    let config = WorldConfig::load(path)?;
    info!(
        path = %path.display(),
        tile_size = config.tile_size,
        destinations = config.navigation.destinations.len(),
        "config_loaded"
    );
    Ok(config)
}

fn seeded_rng() -> Result<StdRng, BootstrapError> {
    match std::env::var(SEED_ENV_VAR) {
        Ok(raw) => {
            let seed = parse_seed(&raw).ok_or_else(|| BootstrapError::InvalidSeed {
                var: SEED_ENV_VAR,
                raw: raw.clone(),
            })?;
            info!(seed, "rng_seeded");
            Ok(StdRng::seed_from_u64(seed))
        }
        Err(_) => Ok(StdRng::from_entropy()),
    }
}

fn parse_seed(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()
}

fn parse_enabled_flag(raw: Option<&str>) -> bool {
    matches!(raw.map(str::trim), Some("1" | "true" | "TRUE" | "on"))
}
