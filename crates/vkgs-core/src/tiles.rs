//! Screen tile grid.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::constants::TILE_SIZE;

/// Grid of 16x16 pixel tiles covering a framebuffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileGrid {
    pub width: u32,
    pub height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl TileGrid {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tiles_x: width.div_ceil(TILE_SIZE),
            tiles_y: height.div_ceil(TILE_SIZE),
        }
    }

    /// Total number of tiles.
    #[inline]
    pub const fn tile_count(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }

    /// Row-major tile index.
    #[inline]
    pub const fn tile_id(&self, x: u32, y: u32) -> u32 {
        y * self.tiles_x + x
    }

    /// Whether a pixel-space box `center ± radius` misses the framebuffer entirely.
    pub fn is_outside(&self, center: Vec2, radius: f32) -> bool {
        center.x + radius < 0.0
            || center.y + radius < 0.0
            || center.x - radius >= self.width as f32
            || center.y - radius >= self.height as f32
    }

    /// Tiles touched by the pixel-space box `center ± radius`, clamped to the grid.
    pub fn rect(&self, center: Vec2, radius: f32) -> TileRect {
        let tile = TILE_SIZE as f32;
        let clamp_x = |v: f32| (v.floor().max(0.0) as u32).min(self.tiles_x);
        let clamp_y = |v: f32| (v.floor().max(0.0) as u32).min(self.tiles_y);
        TileRect {
            min_x: clamp_x((center.x - radius) / tile),
            min_y: clamp_y((center.y - radius) / tile),
            max_x: clamp_x((center.x + radius + tile - 1.0) / tile),
            max_y: clamp_y((center.y + radius + tile - 1.0) / tile),
        }
    }
}

/// Half-open rectangle of tiles, `max` exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TileRect {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl TileRect {
    pub const EMPTY: Self = Self {
        min_x: 0,
        min_y: 0,
        max_x: 0,
        max_y: 0,
    };

    #[inline]
    pub const fn count(&self) -> u32 {
        self.max_x.saturating_sub(self.min_x) * self.max_y.saturating_sub(self.min_y)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Iterate `(x, y)` tile coordinates in raster order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.min_y..self.max_y).flat_map(move |y| (self.min_x..self.max_x).map(move |x| (x, y)))
    }

    pub const fn to_array(self) -> [u32; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    pub const fn from_array(a: [u32; 4]) -> Self {
        Self {
            min_x: a[0],
            min_y: a[1],
            max_x: a[2],
            max_y: a[3],
        }
    }
}

/// Half-open range `[start, end)` of sorted instances belonging to one tile.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct TileRange {
    pub start: u32,
    pub end: u32,
}

impl TileRange {
    #[inline]
    pub const fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_rounds_up_partial_tiles() {
        let grid = TileGrid::new(800, 600);
        assert_eq!(grid.tiles_x, 50);
        assert_eq!(grid.tiles_y, 38);
        assert_eq!(grid.tile_count(), 1900);
    }

    #[test]
    fn rect_is_clamped_to_grid() {
        let grid = TileGrid::new(64, 64);
        let rect = grid.rect(Vec2::new(32.0, 32.0), 1.0e6);
        assert_eq!(rect, TileRect::from_array([0, 0, 4, 4]));
        assert_eq!(rect.count(), grid.tile_count());
    }

    #[test]
    fn small_box_touches_single_tile() {
        let grid = TileGrid::new(64, 64);
        let rect = grid.rect(Vec2::new(20.0, 20.0), 2.0);
        assert_eq!(rect.count(), 1);
        assert_eq!(rect.iter().collect::<Vec<_>>(), vec![(1, 1)]);
    }

    #[test]
    fn box_left_of_screen_is_empty() {
        let grid = TileGrid::new(64, 64);
        let center = Vec2::new(-50.0, 20.0);
        assert!(grid.is_outside(center, 10.0));
        assert!(grid.rect(center, 10.0).is_empty());
    }

    #[test]
    fn rect_iterates_in_raster_order() {
        let rect = TileRect::from_array([1, 2, 3, 4]);
        let tiles: Vec<_> = rect.iter().collect();
        assert_eq!(tiles, vec![(1, 2), (2, 2), (1, 3), (2, 3)]);
    }
}
