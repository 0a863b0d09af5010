//! Front-to-back alpha compositing per tile.

use glam::{Vec2, Vec3};
use rayon::prelude::*;

use crate::constants::{MAX_ALPHA, MIN_ALPHA, MIN_TRANSMITTANCE, TILE_SIZE};
use crate::tiles::{TileGrid, TileRange};
use crate::types::VertexAttribute;

/// Composite one pixel from the tile's sorted instances.
pub fn shade_pixel(
    pixel: Vec2,
    range: TileRange,
    values: &[u32],
    attributes: &[VertexAttribute],
) -> Vec3 {
    let mut transmittance = 1.0;
    let mut color = Vec3::ZERO;
    for &index in &values[range.start as usize..range.end as usize] {
        let attribute = &attributes[index as usize];
        let [a, b, c, opacity] = attribute.conic_opacity;
        let d = attribute.center() - pixel;
        let power = -0.5 * (a * d.x * d.x + c * d.y * d.y) - b * d.x * d.y;
        if power > 0.0 {
            continue;
        }
        let alpha = (opacity * power.exp()).min(MAX_ALPHA);
        if alpha < MIN_ALPHA {
            continue;
        }
        let next = transmittance * (1.0 - alpha);
        if next < MIN_TRANSMITTANCE {
            break;
        }
        color += attribute.color() * alpha * transmittance;
        transmittance = next;
    }
    color
}

/// Rasterize a full frame to RGBA rows with alpha fixed at 1.
pub fn rasterize(
    grid: &TileGrid,
    ranges: &[TileRange],
    values: &[u32],
    attributes: &[VertexAttribute],
) -> Vec<[f32; 4]> {
    let width = grid.width as usize;
    let mut pixels = vec![[0.0, 0.0, 0.0, 1.0]; width * grid.height as usize];
    pixels
        .par_chunks_mut(width.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            let tile_y = y as u32 / TILE_SIZE;
            for (x, out) in row.iter_mut().enumerate() {
                let tile = grid.tile_id(x as u32 / TILE_SIZE, tile_y);
                let pixel = Vec2::new(x as f32, y as f32);
                let c = shade_pixel(pixel, ranges[tile as usize], values, attributes);
                *out = [c.x, c.y, c.z, 1.0];
            }
        });
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn blob(center: Vec2, color: Vec3, opacity: f32) -> VertexAttribute {
        VertexAttribute {
            conic_opacity: [0.01, 0.0, 0.01, opacity],
            color_radius: color.extend(10.0).to_array(),
            center: center.to_array(),
            depth: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn front_splat_occludes_back_splat() {
        let attributes = [
            blob(Vec2::ZERO, Vec3::X, 0.9),
            blob(Vec2::ZERO, Vec3::Y, 0.9),
        ];
        let c = shade_pixel(Vec2::ZERO, TileRange { start: 0, end: 2 }, &[0, 1], &attributes);
        assert_relative_eq!(c.x, 0.9, epsilon = 1e-5);
        assert_relative_eq!(c.y, 0.09, epsilon = 1e-5);
    }

    #[test]
    fn saturated_stack_terminates_early() {
        let attributes: Vec<_> = (0..8).map(|_| blob(Vec2::ZERO, Vec3::ONE, 0.95)).collect();
        let values: Vec<u32> = (0..8).collect();
        let c = shade_pixel(Vec2::ZERO, TileRange { start: 0, end: 8 }, &values, &attributes);
        // three layers fit; the fourth would drop transmittance below the floor
        assert_relative_eq!(c.x, 0.95 + 0.0475 + 0.002_375, epsilon = 1e-5);
    }

    #[test]
    fn empty_tiles_are_black() {
        let grid = TileGrid::new(20, 20);
        let ranges = vec![TileRange::default(); grid.tile_count() as usize];
        let image = rasterize(&grid, &ranges, &[], &[]);
        assert_eq!(image.len(), 400);
        assert!(image.iter().all(|p| *p == [0.0, 0.0, 0.0, 1.0]));
    }
}
