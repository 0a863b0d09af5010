//! CPU implementation of every pipeline stage.
//!
//! Each stage mirrors the data layout and ordering of its compute shader so
//! GPU results can be compared against it buffer by buffer. [`ReferencePipeline`]
//! chains the stages the same way the frame orchestrator does.

mod boundary;
mod expand;
mod preprocess;
mod radix;
mod raster;
mod scan;

pub use boundary::tile_boundaries;
pub use expand::expand_instances;
pub use preprocess::{preprocess, preprocess_one, Preprocessed};
pub use radix::radix_sort;
pub use raster::{rasterize, shade_pixel};
pub use scan::{exclusive_at, hillis_steele, inclusive_scan};

use crate::camera::FrameUniforms;
use crate::tiles::{TileGrid, TileRange};
use crate::types::{Cov3d, Splat, VertexAttribute};

/// Every intermediate buffer of one reference frame.
#[derive(Debug, Clone, Default)]
pub struct ReferenceFrame {
    pub attributes: Vec<VertexAttribute>,
    pub overlaps: Vec<u32>,
    pub scan: Vec<u32>,
    pub total_instances: u32,
    pub keys: Vec<u64>,
    pub values: Vec<u32>,
    pub ranges: Vec<TileRange>,
    /// RGBA pixels in row-major order.
    pub image: Vec<[f32; 4]>,
}

/// Runs the whole frame on the CPU.
#[derive(Debug, Clone, Copy)]
pub struct ReferencePipeline {
    pub blocks_per_workgroup: u32,
}

impl Default for ReferencePipeline {
    fn default() -> Self {
        Self {
            blocks_per_workgroup: 32,
        }
    }
}

impl ReferencePipeline {
    pub fn new(blocks_per_workgroup: u32) -> Self {
        Self {
            blocks_per_workgroup,
        }
    }

    pub fn run(&self, splats: &[Splat], covariances: &[Cov3d], uniforms: &FrameUniforms) -> ReferenceFrame {
        let grid = TileGrid::new(uniforms.width, uniforms.height);

        let Preprocessed {
            attributes,
            overlaps,
        } = preprocess(splats, covariances, uniforms);
        let scan = inclusive_scan(&overlaps);
        let total_instances = scan.last().copied().unwrap_or(0);

        let (mut keys, mut values) = expand_instances(&attributes, &overlaps, &scan, &grid);
        radix_sort(&mut keys, &mut values, self.blocks_per_workgroup);
        let ranges = tile_boundaries(&keys, grid.tile_count());
        let image = rasterize(&grid, &ranges, &values, &attributes);

        ReferenceFrame {
            attributes,
            overlaps,
            scan,
            total_instances,
            keys,
            values,
            ranges,
            image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::scene;
    use crate::sort_key;
    use approx::assert_relative_eq;
    use glam::{Quat, Vec3};

    fn uniforms(width: u32, height: u32) -> FrameUniforms {
        let camera = Camera::looking_at(Vec3::new(0.0, 0.0, 6.0), Vec3::ZERO);
        FrameUniforms::from_camera(&camera, width, height)
    }

    fn run(splats: &[Splat], uniforms: &FrameUniforms) -> ReferenceFrame {
        let covariances = scene::covariances(splats, 1.0);
        ReferencePipeline::default().run(splats, &covariances, uniforms)
    }

    #[test]
    fn scan_total_matches_overlap_sum() {
        let splats = scene::random_scene(2_000, 7, 3.0);
        let frame = run(&splats, &uniforms(320, 240));
        let sum: u32 = frame.overlaps.iter().sum();
        assert_eq!(frame.total_instances, sum);
        assert_eq!(frame.keys.len(), sum as usize);
        assert!(sum > 0);
    }

    #[test]
    fn sorted_keys_are_non_decreasing() {
        let splats = scene::random_scene(1_500, 11, 3.0);
        let frame = run(&splats, &uniforms(320, 240));
        assert!(frame.keys.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn ranges_partition_the_instance_list() {
        let splats = scene::random_scene(1_000, 3, 3.0);
        let frame = run(&splats, &uniforms(320, 240));
        let m = frame.total_instances;

        let mut occupied: Vec<TileRange> = frame.ranges.iter().copied().filter(|r| !r.is_empty()).collect();
        occupied.sort_by_key(|r| r.start);
        let mut cursor = 0;
        for range in &occupied {
            assert_eq!(range.start, cursor);
            cursor = range.end;
        }
        assert_eq!(cursor, m);

        for (tile, range) in frame.ranges.iter().enumerate() {
            assert!(range.start <= range.end);
            for key in &frame.keys[range.start as usize..range.end as usize] {
                assert_eq!(sort_key::tile_of(*key), tile as u32);
            }
        }
    }

    #[test]
    fn culled_splats_produce_no_instances() {
        let behind = Splat::new(Vec3::new(0.0, 0.0, 20.0), Vec3::splat(0.5), Quat::IDENTITY, 1.0, Vec3::ONE);
        let aside = Splat::new(Vec3::new(500.0, 0.0, 0.0), Vec3::splat(0.01), Quat::IDENTITY, 1.0, Vec3::ONE);
        let frame = run(&[behind, aside], &uniforms(128, 128));
        assert_eq!(frame.overlaps, vec![0, 0]);
        assert_eq!(frame.total_instances, 0);
        assert!(frame.ranges.iter().all(TileRange::is_empty));
        assert!(frame.image.iter().all(|p| *p == [0.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn full_screen_splat_fills_every_tile() {
        let color = Vec3::new(1.0, 0.5, 0.25);
        let splat = Splat::new(Vec3::ZERO, Vec3::splat(200.0), Quat::IDENTITY, 0.5, color);
        let uniforms = uniforms(64, 48);
        let frame = run(&[splat], &uniforms);
        let tiles = TileGrid::new(64, 48).tile_count();

        assert_eq!(frame.total_instances, tiles);
        for (tile, range) in frame.ranges.iter().enumerate() {
            assert_eq!(*range, TileRange { start: tile as u32, end: tile as u32 + 1 });
        }
        let center = frame.image[24 * 64 + 32];
        assert_relative_eq!(center[0], color.x * 0.5, epsilon = 1e-3);
        assert_relative_eq!(center[1], color.y * 0.5, epsilon = 1e-3);
        assert_relative_eq!(center[2], color.z * 0.5, epsilon = 1e-3);
    }

    #[test]
    fn empty_scene_renders_black() {
        let frame = run(&[], &uniforms(32, 32));
        assert_eq!(frame.total_instances, 0);
        assert!(frame.keys.is_empty());
        assert_eq!(frame.ranges.len(), 4);
        assert_eq!(frame.image.len(), 32 * 32);
    }

    #[test]
    fn frames_are_deterministic() {
        let splats = scene::random_scene(800, 5, 2.0);
        let uniforms = uniforms(200, 150);
        let a = run(&splats, &uniforms);
        let b = run(&splats, &uniforms);
        assert_eq!(a.total_instances, b.total_instances);
        assert_eq!(a.ranges, b.ranges);
        assert_eq!(a.keys, b.keys);
        assert_eq!(a.image, b.image);
    }

    #[test]
    fn workgroup_sizing_does_not_change_order() {
        let splats = scene::random_scene(600, 9, 2.0);
        let uniforms = uniforms(160, 120);
        let covariances = scene::covariances(&splats, 1.0);
        let small = ReferencePipeline::new(1).run(&splats, &covariances, &uniforms);
        let large = ReferencePipeline::new(256).run(&splats, &covariances, &uniforms);
        assert_eq!(small.values, large.values);
    }
}
