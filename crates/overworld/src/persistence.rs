use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::atomic_io::write_text_atomic;
use crate::geometry::{Cell, Vec2};
use crate::world_map::{
    load_tmx, MapId, Teleporter, TmxError, TmxMap, WorldBuildError, WorldMap, WorldMapDesc,
};

pub const SAVE_VERSION: u32 = 1;

/// On-disk world state. The same format doubles as the new-game world file,
/// where `player` is usually omitted so the current map's spawn is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveGame {
    pub save_version: u32,
    pub current_map: MapId,
    pub maps: Vec<MapRecord>,
    #[serde(default)]
    pub player: Option<SavedVec2>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapRecord {
    pub id: MapId,
    /// TMX path relative to the maps directory.
    pub path: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub teleport: Vec<SavedTeleporter>,
    /// Spawn cell of the map.
    #[serde(rename = "player")]
    pub spawn: SavedCell,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SavedTeleporter {
    pub x: i32,
    pub y: i32,
    pub destination: MapId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SavedCell {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SavedVec2 {
    pub x: f32,
    pub y: f32,
}

impl From<Cell> for SavedCell {
    fn from(value: Cell) -> Self {
        Self {
            x: value.x,
            y: value.y,
        }
    }
}

impl From<SavedCell> for Cell {
    fn from(value: SavedCell) -> Self {
        Cell::new(value.x, value.y)
    }
}

impl From<Vec2> for SavedVec2 {
    fn from(value: Vec2) -> Self {
        Self {
            x: value.x,
            y: value.y,
        }
    }
}

impl From<SavedVec2> for Vec2 {
    fn from(value: SavedVec2) -> Self {
        Vec2::new(value.x, value.y)
    }
}

impl From<&Teleporter> for SavedTeleporter {
    fn from(value: &Teleporter) -> Self {
        Self {
            x: value.cell.x,
            y: value.cell.y,
            destination: value.destination.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read save '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write save '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("encode save json: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("parse save json at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("validation failed at {path}: {message}")]
    Validation { path: String, message: String },
    #[error("failed to load layers for map {map}: {source}")]
    Layers {
        map: MapId,
        #[source]
        source: TmxError,
    },
    #[error("failed to build map {map}: {source}")]
    Build {
        map: MapId,
        #[source]
        source: WorldBuildError,
    },
}

fn validation_err(path: impl Into<String>, message: impl Into<String>) -> PersistenceError {
    PersistenceError::Validation {
        path: path.into(),
        message: message.into(),
    }
}

fn expected_actual(path: impl Into<String>, expected: impl Display, actual: impl Display) -> PersistenceError {
    validation_err(path, format!("expected {expected}, got {actual}"))
}

/// Supplies the static tile layers a saved map is rebuilt from.
pub trait LayerSource {
    fn load_layers(&self, record: &MapRecord) -> Result<TmxMap, TmxError>;
}

/// Reads each map's TMX file from a directory on disk.
#[derive(Debug, Clone)]
pub struct TmxDirectory {
    root: PathBuf,
}

impl TmxDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl LayerSource for TmxDirectory {
    fn load_layers(&self, record: &MapRecord) -> Result<TmxMap, TmxError> {
        load_tmx(&self.root.join(&record.path))
    }
}

impl SaveGame {
    pub fn from_json_str(raw: &str) -> Result<Self, PersistenceError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let save = serde_path_to_error::deserialize::<_, SaveGame>(&mut deserializer).map_err(
            |error| {
                let path = error.path().to_string();
                PersistenceError::Parse {
                    path,
                    source: error.into_inner(),
                }
            },
        )?;
        save.validate()?;
        Ok(save)
    }

    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let raw = fs::read_to_string(path).map_err(|source| PersistenceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let save = Self::from_json_str(&raw)?;
        info!(path = %path.display(), current_map = %save.current_map, maps = save.maps.len(), "save_loaded");
        Ok(save)
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(self).map_err(PersistenceError::Encode)?;
        write_text_atomic(path, &json).map_err(|source| PersistenceError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), current_map = %self.current_map, "save_written");
        Ok(())
    }

    /// Structural checks that need no map data.
    pub fn validate(&self) -> Result<(), PersistenceError> {
        if self.save_version != SAVE_VERSION {
            return Err(expected_actual("save_version", SAVE_VERSION, self.save_version));
        }
        if self.maps.is_empty() {
            return Err(validation_err("maps", "at least one map is required"));
        }

        let mut known = HashMap::with_capacity(self.maps.len());
        for (index, map) in self.maps.iter().enumerate() {
            if let Some(first_index) = known.insert(&map.id, index) {
                return Err(validation_err(
                    format!("maps[{index}].id"),
                    format!("duplicate map id {} (first seen at maps[{first_index}].id)", map.id),
                ));
            }
            if map.path.trim().is_empty() {
                return Err(validation_err(format!("maps[{index}].path"), "must not be empty"));
            }
        }

        if !known.contains_key(&self.current_map) {
            return Err(validation_err(
                "current_map",
                format!("unknown map {}", self.current_map),
            ));
        }

        for (index, map) in self.maps.iter().enumerate() {
            for (teleport_index, teleporter) in map.teleport.iter().enumerate() {
                if !known.contains_key(&teleporter.destination) {
                    return Err(validation_err(
                        format!("maps[{index}].teleport[{teleport_index}].destination"),
                        format!("unknown map {}", teleporter.destination),
                    ));
                }
            }
        }

        if let Some(player) = self.player {
            if !player.x.is_finite() {
                return Err(expected_actual("player.x", "finite number", player.x));
            }
            if !player.y.is_finite() {
                return Err(expected_actual("player.y", "finite number", player.y));
            }
        }
        Ok(())
    }

    /// Rebuilds every map from its static layers plus the saved teleporters and spawn.
    pub fn build_maps(
        &self,
        source: &impl LayerSource,
        tile_size: u32,
    ) -> Result<Vec<WorldMap>, PersistenceError> {
        let mut maps = Vec::with_capacity(self.maps.len());
        for (index, record) in self.maps.iter().enumerate() {
            let tmx = source
                .load_layers(record)
                .map_err(|source| PersistenceError::Layers {
                    map: record.id.clone(),
                    source,
                })?;

            let mut teleporters = Vec::with_capacity(record.teleport.len());
            for (teleport_index, saved) in record.teleport.iter().enumerate() {
                let in_range = saved.x >= 0
                    && saved.y >= 0
                    && (saved.x as u32) < tmx.width
                    && (saved.y as u32) < tmx.height;
                if !in_range {
                    return Err(validation_err(
                        format!("maps[{index}].teleport[{teleport_index}]"),
                        format!(
                            "cell ({}, {}) outside {}x{} map",
                            saved.x, saved.y, tmx.width, tmx.height
                        ),
                    ));
                }
                teleporters.push(Teleporter {
                    cell: Cell::new(saved.x, saved.y),
                    destination: saved.destination.clone(),
                });
            }

            debug!(map = %record.id, layers = tmx.layers.len(), path = %record.path, "map_layers_loaded");
            let map = WorldMap::build(WorldMapDesc {
                id: record.id.clone(),
                display_name: record.display_name.clone(),
                width: tmx.width,
                height: tmx.height,
                tile_size,
                layers: tmx.layers,
                teleporters,
                spawn: record.spawn.into(),
            })
            .map_err(|source| PersistenceError::Build {
                map: record.id.clone(),
                source,
            })?;
            maps.push(map);
        }
        Ok(maps)
    }

    /// Captures the persistable part of a set of maps.
    pub fn capture<'a>(
        current_map: &MapId,
        maps: impl IntoIterator<Item = &'a WorldMap>,
        sources: &BTreeMap<MapId, String>,
        player: Vec2,
    ) -> Self {
        let maps = maps
            .into_iter()
            .map(|map| MapRecord {
                id: map.id().clone(),
                path: sources
                    .get(map.id())
                    .cloned()
                    .unwrap_or_else(|| map.id().to_string()),
                display_name: map.authored_display_name().map(str::to_string),
                teleport: map.teleporters().iter().map(SavedTeleporter::from).collect(),
                spawn: map.spawn().into(),
            })
            .collect();
        Self {
            save_version: SAVE_VERSION,
            current_map: current_map.clone(),
            maps,
            player: Some(player.into()),
        }
    }

    pub fn map_sources(&self) -> BTreeMap<MapId, String> {
        self.maps
            .iter()
            .map(|record| (record.id.clone(), record.path.clone()))
            .collect()
    }
}
