use serde::{Deserialize, Serialize};

use crate::geometry::{Cell, TileGrid};

use super::WorldBuildError;

const COLLISION_KEYWORDS: &[&str] = &[
    "collision",
    "obstacle",
    "wall",
    "building",
    "house",
    "tree",
    "rock",
    "cliff",
    "mountain",
    "water",
    "ocean",
    "river",
    "pond",
    "lake",
    "table",
    "chair",
    "counter",
    "fall",
];

const BUSH_KEYWORDS: &[&str] = &["bush", "grass"];
const ALTAR_KEYWORDS: &[&str] = &["altar"];
const SHOP_KEYWORDS: &[&str] = &["shop", "keeper"];
const HOSPITAL_KEYWORDS: &[&str] = &["hospital", "clinic", "medical", "aqua"];
const CASINO_KEYWORDS: &[&str] = &["thermal", "casino"];
const HAZARD_KEYWORDS: &[&str] = &["hazard", "lava", "poison"];
const BOOST_KEYWORDS: &[&str] = &["aerial", "boost"];

/// Named interaction areas consumed by shop, battle and story collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Bush,
    Shop,
    Altar,
    Hospital,
    Casino,
    Hazard,
    Boost,
}

impl ZoneKind {
    pub const ALL: [ZoneKind; 7] = [
        ZoneKind::Bush,
        ZoneKind::Shop,
        ZoneKind::Altar,
        ZoneKind::Hospital,
        ZoneKind::Casino,
        ZoneKind::Hazard,
        ZoneKind::Boost,
    ];

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Bush => "bush",
            Self::Shop => "shop",
            Self::Altar => "altar",
            Self::Hospital => "hospital",
            Self::Casino => "casino",
            Self::Hazard => "hazard",
            Self::Boost => "boost",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_token().eq_ignore_ascii_case(token))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerClass {
    pub collision: bool,
    pub zones: Vec<ZoneKind>,
}

impl LayerClass {
    pub fn is_relevant(&self) -> bool {
        self.collision || !self.zones.is_empty()
    }
}

/// Classifies a tile layer by case-insensitive keyword match on its name.
///
/// Hospital, shop and casino are mutually exclusive in that priority order;
/// the remaining zones and the collision flag combine freely.
pub fn classify_layer(name: &str) -> LayerClass {
    let name = name.to_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|keyword| name.contains(keyword));

    let mut zones = Vec::new();
    if matches(HOSPITAL_KEYWORDS) {
        zones.push(ZoneKind::Hospital);
    } else if matches(SHOP_KEYWORDS) {
        zones.push(ZoneKind::Shop);
    } else if matches(CASINO_KEYWORDS) {
        zones.push(ZoneKind::Casino);
    }
    if matches(BUSH_KEYWORDS) {
        zones.push(ZoneKind::Bush);
    }
    if matches(ALTAR_KEYWORDS) {
        zones.push(ZoneKind::Altar);
    }
    if matches(HAZARD_KEYWORDS) {
        zones.push(ZoneKind::Hazard);
    }
    if matches(BOOST_KEYWORDS) {
        zones.push(ZoneKind::Boost);
    }

    LayerClass {
        collision: matches(COLLISION_KEYWORDS),
        zones,
    }
}

/// One tile layer reduced to occupancy: a cell is occupied when its gid is non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerData {
    name: String,
    width: u32,
    height: u32,
    occupied: Vec<bool>,
}

impl LayerData {
    pub fn from_gids(
        name: impl Into<String>,
        width: u32,
        height: u32,
        gids: &[u32],
    ) -> Result<Self, WorldBuildError> {
        let name = name.into();
        let expected = width as usize * height as usize;
        if gids.len() != expected {
            return Err(WorldBuildError::LayerTileCount {
                layer: name,
                expected,
                actual: gids.len(),
            });
        }
        Ok(Self {
            name,
            width,
            height,
            occupied: gids.iter().map(|gid| *gid != 0).collect(),
        })
    }

    /// Builds a layer with exactly the listed cells occupied; out-of-bounds cells are dropped.
    pub fn from_cells(
        name: impl Into<String>,
        width: u32,
        height: u32,
        cells: impl IntoIterator<Item = Cell>,
    ) -> Self {
        let grid = TileGrid::new(width, height, 1);
        let mut occupied = vec![false; grid.cell_count()];
        for cell in cells {
            if let Some(index) = grid.index_of(cell) {
                occupied[index] = true;
            }
        }
        Self {
            name: name.into(),
            width,
            height,
            occupied,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn occupied_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        let grid = TileGrid::new(self.width, self.height, 1);
        self.occupied
            .iter()
            .enumerate()
            .filter(|(_, occupied)| **occupied)
            .map(move |(index, _)| grid.cell_of_index(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collision_keywords_match_case_insensitively() {
        assert!(classify_layer("Big Tree Canopy").collision);
        assert!(classify_layer("WATER edge").collision);
        assert!(classify_layer("waterfall").collision);
        assert!(!classify_layer("flowers").collision);
    }

    #[test]
    fn unrecognized_layer_is_not_relevant() {
        let class = classify_layer("decoration");
        assert!(!class.is_relevant());
        assert!(class.zones.is_empty());
    }

    #[test]
    fn hospital_wins_over_shop() {
        let class = classify_layer("hospital shop keeper");
        assert_eq!(class.zones, vec![ZoneKind::Hospital]);
    }

    #[test]
    fn shop_wins_over_casino() {
        let class = classify_layer("casino shop");
        assert_eq!(class.zones, vec![ZoneKind::Shop]);
    }

    #[test]
    fn independent_zones_combine_with_collision() {
        let class = classify_layer("altar wall bush");
        assert!(class.collision);
        assert_eq!(class.zones, vec![ZoneKind::Bush, ZoneKind::Altar]);
    }

    #[test]
    fn interaction_layer_names_map_to_zones() {
        assert_eq!(classify_layer("aqua position").zones, vec![ZoneKind::Hospital]);
        assert_eq!(classify_layer("aerial position").zones, vec![ZoneKind::Boost]);
        assert_eq!(classify_layer("thermal").zones, vec![ZoneKind::Casino]);
    }

    #[test]
    fn zone_tokens_round_trip() {
        for kind in ZoneKind::ALL {
            assert_eq!(ZoneKind::from_token(kind.as_token()), Some(kind));
        }
        assert_eq!(ZoneKind::from_token("HAZARD"), Some(ZoneKind::Hazard));
        assert_eq!(ZoneKind::from_token("gym"), None);
    }

    #[test]
    fn from_gids_rejects_wrong_tile_count() {
        let error = LayerData::from_gids("wall", 2, 2, &[1, 0, 0]).expect_err("mismatch");
        assert!(matches!(
            error,
            WorldBuildError::LayerTileCount {
                expected: 4,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn occupied_cells_follow_non_zero_gids() {
        let layer = LayerData::from_gids("wall", 3, 2, &[0, 7, 0, 1, 0, 0]).expect("layer");
        let cells = layer.occupied_cells().collect::<Vec<_>>();
        assert_eq!(cells, vec![Cell::new(1, 0), Cell::new(0, 1)]);
    }
}
