mod layers;
mod tmx;

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::DebugFlags;
use crate::geometry::{Cell, PixelRect, TileGrid, Vec2};

pub use layers::{classify_layer, LayerClass, LayerData, ZoneKind};
pub use tmx::{load_tmx, parse_tmx, TmxError, TmxLocation, TmxMap};

/// Map identifier; by convention the map's source path, e.g. `"new map.tmx"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapId(String);

impl MapId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MapId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MapId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for MapId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teleporter {
    pub cell: Cell,
    pub destination: MapId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldBuildError {
    #[error("map {map} has zero size ({width}x{height})")]
    EmptyMap { map: MapId, width: u32, height: u32 },
    #[error("layer '{layer}' tile count mismatch: expected {expected}, got {actual}")]
    LayerTileCount {
        layer: String,
        expected: usize,
        actual: usize,
    },
    #[error(
        "layer '{layer}' is {layer_width}x{layer_height} but map {map} is {map_width}x{map_height}"
    )]
    LayerSizeMismatch {
        map: MapId,
        layer: String,
        layer_width: u32,
        layer_height: u32,
        map_width: u32,
        map_height: u32,
    },
}

/// Everything needed to build one map.
#[derive(Debug, Clone)]
pub struct WorldMapDesc {
    pub id: MapId,
    pub display_name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub layers: Vec<LayerData>,
    pub teleporters: Vec<Teleporter>,
    pub spawn: Cell,
}

/// Either a single cell or an arbitrary pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockQuery {
    Cell(Cell),
    Rect(PixelRect),
}

impl From<Cell> for BlockQuery {
    fn from(value: Cell) -> Self {
        Self::Cell(value)
    }
}

impl From<PixelRect> for BlockQuery {
    fn from(value: PixelRect) -> Self {
        Self::Rect(value)
    }
}

/// Static geometry of one map: collision index, teleporters, interaction zones.
///
/// The only mutable state is the hidden-layer set, which affects what the
/// renderer draws and nothing else.
#[derive(Debug, Clone)]
pub struct WorldMap {
    id: MapId,
    display_name: Option<String>,
    grid: TileGrid,
    collision: HashSet<Cell>,
    teleporters: Vec<Teleporter>,
    zones: BTreeMap<ZoneKind, HashSet<Cell>>,
    spawn: Cell,
    layer_names: Vec<String>,
    hidden_layers: BTreeSet<String>,
    surface_revision: u64,
}

impl WorldMap {
    pub fn build(desc: WorldMapDesc) -> Result<Self, WorldBuildError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(WorldBuildError::EmptyMap {
                map: desc.id,
                width: desc.width,
                height: desc.height,
            });
        }
        let grid = TileGrid::new(desc.width, desc.height, desc.tile_size);

        let mut collision = HashSet::new();
        let mut zones = BTreeMap::<ZoneKind, HashSet<Cell>>::new();
        let mut layer_names = Vec::with_capacity(desc.layers.len());
        for layer in &desc.layers {
            if layer.width() != desc.width || layer.height() != desc.height {
                return Err(WorldBuildError::LayerSizeMismatch {
                    map: desc.id,
                    layer: layer.name().to_string(),
                    layer_width: layer.width(),
                    layer_height: layer.height(),
                    map_width: desc.width,
                    map_height: desc.height,
                });
            }
            layer_names.push(layer.name().to_string());

            let class = classify_layer(layer.name());
            if !class.is_relevant() {
                debug!(map = %desc.id, layer = layer.name(), "layer_ignored");
                continue;
            }
            for cell in layer.occupied_cells() {
                if class.collision {
                    collision.insert(cell);
                }
                for zone in &class.zones {
                    zones.entry(*zone).or_default().insert(cell);
                }
            }
        }

        for teleporter in &desc.teleporters {
            collision.remove(&teleporter.cell);
        }

        let spawn = grid.clamp(desc.spawn);
        debug!(
            map = %desc.id,
            collision_cells = collision.len(),
            teleporters = desc.teleporters.len(),
            spawn = %spawn,
            "world_map_built"
        );

        Ok(Self {
            id: desc.id,
            display_name: desc.display_name,
            grid,
            collision,
            teleporters: desc.teleporters,
            zones,
            spawn,
            layer_names,
            hidden_layers: BTreeSet::new(),
            surface_revision: 0,
        })
    }

    pub fn id(&self) -> &MapId {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(self.id.as_str())
    }

    /// Display name as authored, without the id fallback.
    pub fn authored_display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn spawn(&self) -> Cell {
        self.spawn
    }

    pub fn teleporters(&self) -> &[Teleporter] {
        &self.teleporters
    }

    pub fn collision_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.collision.iter().copied()
    }

    /// Static collision lookup, ignoring debug flags.
    pub fn has_collision(&self, cell: Cell) -> bool {
        self.collision.contains(&cell)
    }

    /// Collision test for a cell or a pixel rectangle. `noclip` short-circuits to free.
    pub fn is_blocked(&self, query: impl Into<BlockQuery>, debug: DebugFlags) -> bool {
        if debug.noclip {
            return false;
        }
        match query.into() {
            BlockQuery::Cell(cell) => self.collision.contains(&cell),
            BlockQuery::Rect(rect) => self
                .grid
                .cells_overlapping(rect)
                .any(|cell| self.collision.contains(&cell)),
        }
    }

    /// Teleporter whose tile overlaps the one-tile footprint at `position` and whose
    /// center lies within one tile length of the footprint center.
    pub fn find_teleporter_at(&self, position: Vec2) -> Option<&Teleporter> {
        let tile_size = self.grid.tile_size();
        let footprint = PixelRect::tile_footprint(position, tile_size);
        let center = self.grid.footprint_center(position);
        self.teleporters.iter().find(|teleporter| {
            let teleporter_rect =
                PixelRect::tile_footprint(self.grid.cell_origin(teleporter.cell), tile_size);
            footprint.intersects(&teleporter_rect)
                && center.distance(self.grid.cell_center(teleporter.cell)) <= tile_size as f32
        })
    }

    /// First teleporter on this map leading to `destination`.
    pub fn teleporter_leading_to(&self, destination: &MapId) -> Option<&Teleporter> {
        self.teleporters
            .iter()
            .find(|teleporter| &teleporter.destination == destination)
    }

    /// Zone cell under the footprint center at `position`, if it belongs to `zone`.
    pub fn query_zone(&self, position: Vec2, zone: ZoneKind) -> Option<Cell> {
        let cell = self.grid.cell_at(self.grid.footprint_center(position));
        self.zones
            .get(&zone)
            .filter(|cells| cells.contains(&cell))
            .map(|_| cell)
    }

    pub fn zone_cells(&self, zone: ZoneKind) -> impl Iterator<Item = Cell> + '_ {
        self.zones
            .get(&zone)
            .into_iter()
            .flat_map(|cells| cells.iter().copied())
    }

    pub fn layer_names(&self) -> &[String] {
        &self.layer_names
    }

    /// Hides or reveals a named layer. Returns `true` when the visible set changed.
    pub fn set_layer_hidden(&mut self, layer: &str, hidden: bool) -> bool {
        if !self.layer_names.iter().any(|name| name == layer) {
            debug!(map = %self.id, layer, "layer_toggle_unknown");
            return false;
        }
        let changed = if hidden {
            self.hidden_layers.insert(layer.to_string())
        } else {
            self.hidden_layers.remove(layer)
        };
        if changed {
            self.surface_revision = self.surface_revision.saturating_add(1);
            debug!(
                map = %self.id,
                layer,
                hidden,
                surface_revision = self.surface_revision,
                "layer_visibility_changed"
            );
        }
        changed
    }

    pub fn is_layer_hidden(&self, layer: &str) -> bool {
        self.hidden_layers.contains(layer)
    }

    pub fn hidden_layers(&self) -> impl Iterator<Item = &str> {
        self.hidden_layers.iter().map(String::as_str)
    }

    pub fn visible_layer_names(&self) -> impl Iterator<Item = &str> {
        self.layer_names
            .iter()
            .map(String::as_str)
            .filter(|name| !self.hidden_layers.contains(*name))
    }

    /// Bumped on every visibility change; the renderer rebuilds its surface when it moves.
    pub fn surface_revision(&self) -> u64 {
        self.surface_revision
    }
}
