//! Terrain cell grid: heights, passability, occupancy.
//!
//! Cells live for the whole session; nothing here is ever destroyed while
//! a game is running. Heights are stored per cell corner on a
//! `(width + 1) x (height + 1)` lattice.

use serde::{Deserialize, Serialize};

use crate::item::ItemId;
use crate::math::{Fixed, Vec2Fixed};

/// Ground class of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Terrain {
    /// Passable ground.
    #[default]
    Land,
    /// Water; impassable to land movers.
    Water,
}

/// One tile of the terrain grid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Ground class.
    pub terrain: Terrain,
    /// Items whose center currently lies in this cell.
    pub occupancy: Vec<ItemId>,
}

/// The terrain grid for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMap {
    width: u32,
    height: u32,
    cells: Vec<Cell>,
    /// Corner heights, row-major on the (width+1) x (height+1) lattice.
    corner_heights: Vec<i64>,
}

impl GameMap {
    /// Create a flat all-land map.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let cells = vec![Cell::default(); (width as usize) * (height as usize)];
        let corners = ((width + 1) as usize) * ((height + 1) as usize);
        Self {
            width,
            height,
            cells,
            corner_heights: vec![0; corners],
        }
    }

    /// Map width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Map height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Whether cell coordinates are on the map.
    #[must_use]
    pub fn valid_cell(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    /// Whether a world position lies on the map.
    #[must_use]
    pub fn on_map(&self, pos: Vec2Fixed) -> bool {
        pos.x >= Fixed::ZERO
            && pos.y >= Fixed::ZERO
            && pos.x < Fixed::from_num(self.width)
            && pos.y < Fixed::from_num(self.height)
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if self.valid_cell(x, y) {
            Some((y as usize) * (self.width as usize) + (x as usize))
        } else {
            None
        }
    }

    /// Borrow a cell.
    #[must_use]
    pub fn cell(&self, x: i32, y: i32) -> Option<&Cell> {
        self.index(x, y).map(|i| &self.cells[i])
    }

    /// Mutably borrow a cell.
    pub fn cell_mut(&mut self, x: i32, y: i32) -> Option<&mut Cell> {
        self.index(x, y).map(move |i| &mut self.cells[i])
    }

    /// Set the ground class of a cell. Out-of-range coordinates are ignored
    /// with a logged error.
    pub fn set_terrain(&mut self, x: i32, y: i32, terrain: Terrain) {
        match self.cell_mut(x, y) {
            Some(cell) => cell.terrain = terrain,
            None => tracing::error!(x, y, "set_terrain outside the map"),
        }
    }

    /// Height of a corner on the lattice; clamped to the map edge.
    #[must_use]
    pub fn corner_height(&self, x: i32, y: i32) -> Fixed {
        let cx = x.clamp(0, self.width as i32) as usize;
        let cy = y.clamp(0, self.height as i32) as usize;
        let raw = self.corner_heights[cy * (self.width as usize + 1) + cx];
        Fixed::from_bits(raw)
    }

    /// Set the height of a corner. Out-of-range coordinates are ignored.
    pub fn set_corner_height(&mut self, x: i32, y: i32, height: Fixed) {
        if x < 0 || y < 0 || x > self.width as i32 || y > self.height as i32 {
            tracing::error!(x, y, "set_corner_height outside the lattice");
            return;
        }
        let idx = (y as usize) * (self.width as usize + 1) + (x as usize);
        self.corner_heights[idx] = height.to_bits();
    }

    /// Terrain height at an arbitrary point, bilinear blend of the four
    /// surrounding corners.
    #[must_use]
    pub fn height_at_point(&self, pos: Vec2Fixed) -> Fixed {
        let cx = pos.x.to_num::<i32>();
        let cy = pos.y.to_num::<i32>();
        let fx = pos.x - Fixed::from_num(cx);
        let fy = pos.y - Fixed::from_num(cy);

        let h00 = self.corner_height(cx, cy);
        let h10 = self.corner_height(cx + 1, cy);
        let h01 = self.corner_height(cx, cy + 1);
        let h11 = self.corner_height(cx + 1, cy + 1);

        let one = Fixed::from_num(1);
        let top = h00 * (one - fx) + h10 * fx;
        let bottom = h01 * (one - fx) + h11 * fx;
        top * (one - fy) + bottom * fy
    }

    /// Whether a mover can stand on the cell. Flyers ignore terrain.
    #[must_use]
    pub fn can_go(&self, is_flying: bool, x: i32, y: i32) -> bool {
        match self.cell(x, y) {
            Some(cell) => is_flying || cell.terrain == Terrain::Land,
            None => false,
        }
    }

    /// Record an item's center entering a cell.
    pub fn occupy(&mut self, id: ItemId, x: i32, y: i32) {
        if let Some(cell) = self.cell_mut(x, y) {
            if !cell.occupancy.contains(&id) {
                cell.occupancy.push(id);
            }
        }
    }

    /// Record an item's center leaving a cell.
    pub fn vacate(&mut self, id: ItemId, x: i32, y: i32) {
        if let Some(cell) = self.cell_mut(x, y) {
            cell.occupancy.retain(|&other| other != id);
        }
    }

    /// Items whose center lies within the given cell rectangle, in
    /// ascending ID order.
    #[must_use]
    pub fn items_in_rect(&self, left: i32, top: i32, right: i32, bottom: i32) -> Vec<ItemId> {
        let mut found = Vec::new();
        for y in top.max(0)..=bottom.min(self.height as i32 - 1) {
            for x in left.max(0)..=right.min(self.width as i32 - 1) {
                if let Some(cell) = self.cell(x, y) {
                    found.extend_from_slice(&cell.occupancy);
                }
            }
        }
        found.sort_unstable();
        found.dedup();
        found
    }

    /// Items in cells that intersect the given circle, in ascending ID
    /// order.
    ///
    /// Cell granular: an item's exact center may still lie outside the
    /// circle, so callers apply their own distance predicate. Shots are
    /// included along with units.
    #[must_use]
    pub fn units_in_circle(&self, center: Vec2Fixed, radius: Fixed) -> Vec<ItemId> {
        let left = (center.x - radius).to_num::<i32>();
        let right = (center.x + radius).to_num::<i32>();
        let top = (center.y - radius).to_num::<i32>();
        let bottom = (center.y + radius).to_num::<i32>();
        let radius_sq = radius * radius;

        let mut found = Vec::new();
        for y in top.max(0)..=bottom.min(self.height as i32 - 1) {
            for x in left.max(0)..=right.min(self.width as i32 - 1) {
                // Nearest point of the cell to the circle's center.
                let nx = center.x.clamp(Fixed::from_num(x), Fixed::from_num(x + 1));
                let ny = center.y.clamp(Fixed::from_num(y), Fixed::from_num(y + 1));
                let dx = nx - center.x;
                let dy = ny - center.y;
                if dx * dx + dy * dy > radius_sq {
                    continue;
                }
                if let Some(cell) = self.cell(x, y) {
                    found.extend_from_slice(&cell.occupancy);
                }
            }
        }
        found.sort_unstable();
        found.dedup();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let map = GameMap::new(8, 4);
        assert!(map.valid_cell(0, 0));
        assert!(map.valid_cell(7, 3));
        assert!(!map.valid_cell(8, 0));
        assert!(!map.valid_cell(0, -1));
        assert!(map.on_map(Vec2Fixed::new(Fixed::from_num(7.9), Fixed::from_num(3.9))));
        assert!(!map.on_map(Vec2Fixed::new(Fixed::from_num(8), Fixed::ZERO)));
    }

    #[test]
    fn test_height_blend() {
        let mut map = GameMap::new(2, 2);
        map.set_corner_height(0, 0, Fixed::from_num(0));
        map.set_corner_height(1, 0, Fixed::from_num(4));
        map.set_corner_height(0, 1, Fixed::from_num(0));
        map.set_corner_height(1, 1, Fixed::from_num(4));

        // Halfway across the first cell: halfway up the slope.
        let h = map.height_at_point(Vec2Fixed::new(Fixed::from_num(0.5), Fixed::from_num(0.5)));
        assert_eq!(h, Fixed::from_num(2));
    }

    #[test]
    fn test_water_blocks_land_movers() {
        let mut map = GameMap::new(4, 4);
        map.set_terrain(2, 2, Terrain::Water);
        assert!(!map.can_go(false, 2, 2));
        assert!(map.can_go(true, 2, 2));
        assert!(map.can_go(false, 1, 2));
        assert!(!map.can_go(false, -1, 0));
    }

    #[test]
    fn test_occupancy_tracking() {
        let mut map = GameMap::new(4, 4);
        map.occupy(7, 1, 1);
        map.occupy(3, 1, 1);
        map.occupy(7, 1, 1); // duplicate is a no-op
        assert_eq!(map.items_in_rect(0, 0, 3, 3), vec![3, 7]);

        map.vacate(7, 1, 1);
        assert_eq!(map.items_in_rect(0, 0, 3, 3), vec![3]);
    }

    #[test]
    fn test_circle_query_skips_corner_cells() {
        let mut map = GameMap::new(8, 8);
        map.occupy(1, 4, 4);
        map.occupy(2, 4, 6); // two cells below, inside radius 3
        map.occupy(3, 7, 7); // corner of the bounding box, outside

        let center = Vec2Fixed::new(Fixed::from_num(4.5), Fixed::from_num(4.5));
        let found = map.units_in_circle(center, Fixed::from_num(3));
        assert_eq!(found, vec![1, 2]);
    }

    #[test]
    fn test_circle_query_clips_to_map_edge() {
        let mut map = GameMap::new(4, 4);
        map.occupy(9, 0, 0);
        let found = map.units_in_circle(Vec2Fixed::ZERO, Fixed::from_num(10));
        assert_eq!(found, vec![9]);
    }
}
