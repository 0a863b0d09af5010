//! Expansion of splats into per-tile sort instances.

use crate::reference::scan::exclusive_at;
use crate::sort_key;
use crate::tiles::{TileGrid, TileRect};
use crate::types::VertexAttribute;

/// Write one `(key, value)` pair per overlapped tile, each splat into its own
/// slice starting at its exclusive scan offset.
pub fn expand_instances(
    attributes: &[VertexAttribute],
    overlaps: &[u32],
    scan: &[u32],
    grid: &TileGrid,
) -> (Vec<u64>, Vec<u32>) {
    let total = scan.last().copied().unwrap_or(0) as usize;
    let mut keys = vec![0u64; total];
    let mut values = vec![0u32; total];

    for (index, (attribute, &count)) in attributes.iter().zip(overlaps).enumerate() {
        if count == 0 {
            continue;
        }
        let base = exclusive_at(scan, index) as usize;
        let rect = TileRect::from_array(attribute.aabb);
        for (offset, (x, y)) in rect.iter().enumerate() {
            keys[base + offset] = sort_key::encode(grid.tile_id(x, y), attribute.depth);
            values[base + offset] = index as u32;
        }
    }
    (keys, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::scan::inclusive_scan;

    fn attribute(rect: TileRect, depth: f32) -> VertexAttribute {
        VertexAttribute {
            aabb: rect.to_array(),
            depth,
            ..Default::default()
        }
    }

    #[test]
    fn slices_are_disjoint_and_dense() {
        let grid = TileGrid::new(64, 64);
        let attributes = [
            attribute(TileRect::from_array([0, 0, 2, 1]), 1.0),
            VertexAttribute::default(),
            attribute(TileRect::from_array([1, 1, 2, 3]), 2.0),
        ];
        let overlaps = [2, 0, 2];
        let scan = inclusive_scan(&overlaps);
        let (keys, values) = expand_instances(&attributes, &overlaps, &scan, &grid);

        assert_eq!(values, vec![0, 0, 2, 2]);
        let tiles: Vec<u32> = keys.iter().map(|&k| sort_key::tile_of(k)).collect();
        assert_eq!(tiles, vec![0, 1, 5, 9]);
        assert_eq!(sort_key::depth_of(keys[3]), 2.0);
    }
}
