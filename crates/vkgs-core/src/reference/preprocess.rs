//! Per-splat projection, culling, and tile-overlap counting.

use rayon::prelude::*;

use crate::camera::FrameUniforms;
use crate::constants::NEAR_CULL;
use crate::covariance::{project, project_point};
use crate::sh;
use crate::tiles::TileGrid;
use crate::types::{Cov3d, Splat, VertexAttribute};

/// Output of the preprocess stage.
#[derive(Debug, Clone, Default)]
pub struct Preprocessed {
    pub attributes: Vec<VertexAttribute>,
    pub overlaps: Vec<u32>,
}

/// Preprocess every splat in parallel.
pub fn preprocess(splats: &[Splat], covariances: &[Cov3d], uniforms: &FrameUniforms) -> Preprocessed {
    let (attributes, overlaps) = splats
        .par_iter()
        .zip(covariances.par_iter())
        .map(|(splat, cov)| preprocess_one(splat, *cov, uniforms))
        .unzip();
    Preprocessed {
        attributes,
        overlaps,
    }
}

/// Preprocess one splat. Culled splats yield a zeroed attribute and zero overlap.
pub fn preprocess_one(splat: &Splat, cov: Cov3d, uniforms: &FrameUniforms) -> (VertexAttribute, u32) {
    let culled = (VertexAttribute::default(), 0);
    let grid = TileGrid::new(uniforms.width, uniforms.height);

    let position = splat.position();
    let view_pos = uniforms.view().transform_point3(position);
    if view_pos.z <= NEAR_CULL {
        return culled;
    }

    let cov2d = project(cov, view_pos, uniforms);
    let Some(conic) = cov2d.conic() else {
        return culled;
    };
    let radius = cov2d.radius();
    let center = project_point(position, &uniforms.proj(), uniforms.width, uniforms.height);
    if !radius.is_finite() || !center.is_finite() || grid.is_outside(center, radius) {
        return culled;
    }

    let rect = grid.rect(center, radius);
    let count = rect.count();
    if count == 0 {
        return culled;
    }

    let dir = (position - uniforms.camera_position()).normalize_or_zero();
    let color = sh::eval(&splat.sh, dir);

    let attribute = VertexAttribute {
        conic_opacity: conic.extend(splat.opacity()).to_array(),
        color_radius: color.extend(radius).to_array(),
        aabb: rect.to_array(),
        center: center.to_array(),
        depth: view_pos.z,
        _pad: 0,
    };
    (attribute, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use glam::{Quat, Vec3};

    fn uniforms() -> FrameUniforms {
        let camera = Camera::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        FrameUniforms::from_camera(&camera, 256, 128)
    }

    fn splat_at(position: Vec3, scale: f32) -> (Splat, Cov3d) {
        let splat = Splat::new(position, Vec3::splat(scale), Quat::IDENTITY, 0.8, Vec3::ONE);
        let cov = Cov3d::from_scale_rotation(splat.scale(), splat.rotation(), 1.0);
        (splat, cov)
    }

    #[test]
    fn splat_behind_camera_is_culled() {
        let (splat, cov) = splat_at(Vec3::new(0.0, 0.0, 10.0), 0.1);
        let (attr, count) = preprocess_one(&splat, cov, &uniforms());
        assert_eq!(count, 0);
        assert_eq!(attr, VertexAttribute::default());
    }

    #[test]
    fn splat_outside_viewport_is_culled() {
        let (splat, cov) = splat_at(Vec3::new(40.0, 0.0, 0.0), 0.01);
        let (_, count) = preprocess_one(&splat, cov, &uniforms());
        assert_eq!(count, 0);
    }

    #[test]
    fn small_centered_splat_covers_few_tiles() {
        let (splat, cov) = splat_at(Vec3::ZERO, 0.01);
        let (attr, count) = preprocess_one(&splat, cov, &uniforms());
        assert!(count >= 1 && count <= 4, "count = {count}");
        assert!(attr.depth > 4.9 && attr.depth < 5.1);
        assert_eq!(crate::tiles::TileRect::from_array(attr.aabb).count(), count);
    }

    #[test]
    fn huge_splat_covers_whole_grid() {
        let (splat, cov) = splat_at(Vec3::ZERO, 100.0);
        let (_, count) = preprocess_one(&splat, cov, &uniforms());
        assert_eq!(count, TileGrid::new(256, 128).tile_count());
    }

    #[test]
    fn zero_scale_never_produces_nan_counts() {
        let (splat, cov) = splat_at(Vec3::ZERO, 0.0);
        let (attr, count) = preprocess_one(&splat, cov, &uniforms());
        assert!(count <= 4);
        assert!(attr.conic_opacity.iter().all(|v| v.is_finite()));
    }
}
