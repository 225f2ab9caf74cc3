use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Cell, DEFAULT_TILE_SIZE};
use crate::world_map::MapId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    pub tile_size: u32,
    pub transition: TransitionConfig,
    pub navigation: NavigationConfig,
    pub player: PlayerConfig,
    pub debug: DebugFlags,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            transition: TransitionConfig::default(),
            navigation: NavigationConfig::default(),
            player: PlayerConfig::default(),
            debug: DebugFlags::default(),
        }
    }
}

/// Presentation timings for a map switch. The cooldown and the alternate-world
/// probability are gameplay constants and live next to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransitionConfig {
    pub fade_out_seconds: f32,
    pub fade_in_seconds: f32,
    pub flicker_seconds: f32,
    pub flicker_toggle_seconds: f32,
    pub alternate_world_map: Option<MapId>,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            fade_out_seconds: 0.25,
            fade_in_seconds: 0.25,
            flicker_seconds: 1.5,
            flicker_toggle_seconds: 0.1,
            alternate_world_map: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NavigationConfig {
    pub speed_px_per_second: f32,
    pub arrival_epsilon_px: f32,
    /// Arrival cell used when a navigation request crosses into the keyed map.
    pub entry_cells: BTreeMap<MapId, Cell>,
    pub destinations: Vec<NamedDestination>,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            speed_px_per_second: 300.0,
            arrival_epsilon_px: 5.0,
            entry_cells: BTreeMap::new(),
            destinations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedDestination {
    pub name: String,
    pub map: MapId,
    pub cell: Cell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayerConfig {
    pub walk_speed_tiles_per_second: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            walk_speed_tiles_per_second: 8.0,
        }
    }
}

/// Developer switches. `noclip` makes every collision query report free space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebugFlags {
    pub noclip: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config json at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value at {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl WorldConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let config = serde_path_to_error::deserialize::<_, WorldConfig>(&mut deserializer)
            .map_err(|error| {
                let path = error.path().to_string();
                ConfigError::Parse {
                    path,
                    source: error.into_inner(),
                }
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_size == 0 {
            return Err(ConfigError::Invalid {
                field: "tile_size",
                message: "must be greater than 0".to_string(),
            });
        }
        let durations = [
            ("transition.fade_out_seconds", self.transition.fade_out_seconds),
            ("transition.fade_in_seconds", self.transition.fade_in_seconds),
            ("transition.flicker_seconds", self.transition.flicker_seconds),
        ];
        for (field, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("expected finite number >= 0, got {value}"),
                });
            }
        }
        let positives = [
            (
                "transition.flicker_toggle_seconds",
                self.transition.flicker_toggle_seconds,
            ),
            (
                "navigation.speed_px_per_second",
                self.navigation.speed_px_per_second,
            ),
            (
                "player.walk_speed_tiles_per_second",
                self.player.walk_speed_tiles_per_second,
            ),
        ];
        for (field, value) in positives {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("expected finite number > 0, got {value}"),
                });
            }
        }
        let epsilon = self.navigation.arrival_epsilon_px;
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(ConfigError::Invalid {
                field: "navigation.arrival_epsilon_px",
                message: format!("expected finite number >= 0, got {epsilon}"),
            });
        }
        Ok(())
    }
}
