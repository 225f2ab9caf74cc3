use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TILE_SIZE: u32 = 64;

/// Integer grid coordinate addressing one tile. `y` grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }

    pub fn manhattan_distance(self, other: Cell) -> u32 {
        self.x
            .abs_diff(other.x)
            .saturating_add(self.y.abs_diff(other.y))
    }

    pub fn is_adjacent_4(self, other: Cell) -> bool {
        self.manhattan_distance(other) == 1
    }

    /// Left, right, up, down. Search code relies on this order for tie-breaks.
    pub fn neighbors_4(self) -> [Cell; 4] {
        [
            self.offset(-1, 0),
            self.offset(1, 0),
            self.offset(0, -1),
            self.offset(0, 1),
        ]
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Continuous pixel coordinate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelRect {
    /// One-tile footprint whose top-left corner sits at `position`.
    pub fn tile_footprint(position: Vec2, tile_size: u32) -> Self {
        let size = tile_size as f32;
        Self {
            x: position.x,
            y: position.y,
            width: size,
            height: size,
        }
    }

    /// Edges that merely touch do not intersect.
    pub fn intersects(&self, other: &PixelRect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// Grid convention:
/// - cell `(x, y)` covers pixels `[x * tile, (x + 1) * tile)` on each axis.
/// - an actor position is the top-left corner of its one-tile footprint, so an
///   actor standing on a cell has `position == cell_origin(cell)` and its
///   footprint center equals `cell_center(cell)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tile_size: u32,
}

impl TileGrid {
    pub fn new(width: u32, height: u32, tile_size: u32) -> Self {
        Self {
            width,
            height,
            tile_size: tile_size.max(1),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && (cell.x as u32) < self.width && (cell.y as u32) < self.height
    }

    pub fn index_of(&self, cell: Cell) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        Some(cell.y as usize * self.width as usize + cell.x as usize)
    }

    pub fn cell_of_index(&self, index: usize) -> Cell {
        let width = self.width.max(1) as usize;
        Cell::new((index % width) as i32, (index / width) as i32)
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn cell_at(&self, position: Vec2) -> Cell {
        let size = self.tile_size as f32;
        Cell::new(
            (position.x / size).floor() as i32,
            (position.y / size).floor() as i32,
        )
    }

    pub fn cell_origin(&self, cell: Cell) -> Vec2 {
        let size = self.tile_size as f32;
        Vec2 {
            x: cell.x as f32 * size,
            y: cell.y as f32 * size,
        }
    }

    pub fn cell_center(&self, cell: Cell) -> Vec2 {
        let half = self.tile_size as f32 / 2.0;
        let origin = self.cell_origin(cell);
        Vec2 {
            x: origin.x + half,
            y: origin.y + half,
        }
    }

    pub fn footprint_center(&self, position: Vec2) -> Vec2 {
        let half = self.tile_size as f32 / 2.0;
        Vec2 {
            x: position.x + half,
            y: position.y + half,
        }
    }

    pub fn clamp(&self, cell: Cell) -> Cell {
        let max_x = self.width.saturating_sub(1) as i32;
        let max_y = self.height.saturating_sub(1) as i32;
        Cell::new(cell.x.clamp(0, max_x), cell.y.clamp(0, max_y))
    }

    /// Cells touched by `rect`, right and bottom edges exclusive.
    pub fn cells_overlapping(&self, rect: PixelRect) -> impl Iterator<Item = Cell> {
        let size = self.tile_size as f32;
        let (x0, y0, x1, y1) = if rect.width > 0.0 && rect.height > 0.0 {
            (
                (rect.x / size).floor() as i32,
                (rect.y / size).floor() as i32,
                ((rect.x + rect.width) / size).ceil() as i32 - 1,
                ((rect.y + rect.height) / size).ceil() as i32 - 1,
            )
        } else {
            (0, 0, -1, -1)
        };
        (y0..=y1).flat_map(move |y| (x0..=x1).map(move |x| Cell::new(x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_at_uses_floor_division_for_negative_pixels() {
        let grid = TileGrid::new(4, 4, 32);
        assert_eq!(grid.cell_at(Vec2::new(31.9, 0.0)), Cell::new(0, 0));
        assert_eq!(grid.cell_at(Vec2::new(32.0, 64.0)), Cell::new(1, 2));
        assert_eq!(grid.cell_at(Vec2::new(-0.5, -33.0)), Cell::new(-1, -2));
    }

    #[test]
    fn aligned_footprint_overlaps_exactly_one_cell() {
        let grid = TileGrid::new(8, 8, 16);
        let rect = PixelRect::tile_footprint(grid.cell_origin(Cell::new(2, 3)), 16);
        let cells = grid.cells_overlapping(rect).collect::<Vec<_>>();
        assert_eq!(cells, vec![Cell::new(2, 3)]);
    }

    #[test]
    fn misaligned_footprint_overlaps_four_cells() {
        let grid = TileGrid::new(8, 8, 16);
        let rect = PixelRect::tile_footprint(Vec2::new(20.0, 4.0), 16);
        let cells = grid.cells_overlapping(rect).collect::<Vec<_>>();
        assert_eq!(
            cells,
            vec![
                Cell::new(1, 0),
                Cell::new(2, 0),
                Cell::new(1, 1),
                Cell::new(2, 1)
            ]
        );
    }

    #[test]
    fn touching_rects_do_not_intersect() {
        let a = PixelRect::tile_footprint(Vec2::new(0.0, 0.0), 10);
        let b = PixelRect::tile_footprint(Vec2::new(10.0, 0.0), 10);
        assert!(!a.intersects(&b));
        let c = PixelRect::tile_footprint(Vec2::new(9.0, 9.0), 10);
        assert!(a.intersects(&c));
    }

    #[test]
    fn clamp_pulls_cells_into_bounds() {
        let grid = TileGrid::new(5, 3, 16);
        assert_eq!(grid.clamp(Cell::new(-4, 9)), Cell::new(0, 2));
        assert_eq!(grid.clamp(Cell::new(2, 1)), Cell::new(2, 1));
    }

    #[test]
    fn index_round_trips_through_cell_of_index() {
        let grid = TileGrid::new(7, 5, 16);
        let cell = Cell::new(3, 4);
        let index = grid.index_of(cell).expect("in bounds");
        assert_eq!(grid.cell_of_index(index), cell);
        assert_eq!(grid.index_of(Cell::new(7, 0)), None);
    }
}
