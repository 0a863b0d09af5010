//! Per-tile ranges over the sorted instance list.

use crate::sort_key;
use crate::tiles::TileRange;

/// Build `[start, end)` ranges for every tile. Tiles without instances keep
/// `start == end == 0`.
pub fn tile_boundaries(sorted_keys: &[u64], tile_count: u32) -> Vec<TileRange> {
    let mut ranges = vec![TileRange::default(); tile_count as usize];
    let m = sorted_keys.len();
    for (i, &key) in sorted_keys.iter().enumerate() {
        let tile = sort_key::tile_of(key) as usize;
        if i == 0 {
            ranges[tile].start = 0;
        } else {
            let prev = sort_key::tile_of(sorted_keys[i - 1]) as usize;
            if prev != tile {
                ranges[prev].end = i as u32;
                ranges[tile].start = i as u32;
            }
        }
        if i == m - 1 {
            ranges[tile].end = m as u32;
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_partition_instances() {
        let keys: Vec<u64> = [0u32, 0, 2, 2, 2, 5]
            .iter()
            .map(|&t| sort_key::encode(t, 1.0))
            .collect();
        let ranges = tile_boundaries(&keys, 6);
        assert_eq!(ranges[0], TileRange { start: 0, end: 2 });
        assert!(ranges[1].is_empty());
        assert_eq!(ranges[2], TileRange { start: 2, end: 5 });
        assert_eq!(ranges[5], TileRange { start: 5, end: 6 });
        let covered: u32 = ranges.iter().map(TileRange::len).sum();
        assert_eq!(covered, 6);
    }

    #[test]
    fn no_instances_means_empty_ranges() {
        let ranges = tile_boundaries(&[], 4);
        assert!(ranges.iter().all(|r| *r == TileRange::default()));
    }
}
