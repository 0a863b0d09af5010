//! 64-bit instance sort key.
//!
//! Layout: tile id in the high 32 bits, IEEE-754 bits of the view-space depth
//! in the low 32 bits. Depth is always positive after near-plane culling, and
//! positive floats order the same way as their bit patterns, so an ascending
//! sort groups instances by tile and orders each tile front to back.

/// Shift applied to the tile id.
pub const TILE_SHIFT: u32 = 32;

/// Build a key from a tile id and a positive view-space depth.
#[inline]
pub fn encode(tile_id: u32, depth: f32) -> u64 {
    (u64::from(tile_id) << TILE_SHIFT) | u64::from(depth.to_bits())
}

/// Tile id stored in `key`.
#[inline]
pub const fn tile_of(key: u64) -> u32 {
    (key >> TILE_SHIFT) as u32
}

/// Depth stored in `key`.
#[inline]
pub fn depth_of(key: u64) -> f32 {
    f32::from_bits(key as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_dominates_depth() {
        assert!(encode(1, 0.3) > encode(0, 900.0));
        assert!(encode(7, 1.0) < encode(7, 2.0));
    }

    #[test]
    fn fields_decode() {
        let key = encode(1234, 17.5);
        assert_eq!(tile_of(key), 1234);
        assert_eq!(depth_of(key), 17.5);
    }

    #[test]
    fn positive_depths_order_by_bits() {
        let depths = [0.2_f32, 0.5, 1.0, 3.25, 100.0, 999.0];
        for pair in depths.windows(2) {
            assert!(encode(0, pair[0]) < encode(0, pair[1]));
        }
    }
}
