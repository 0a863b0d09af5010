//! Compute shaders for the vkgs splat renderer.
//!
//! GLSL sources live in `shaders/` and are compiled to SPIR-V at build time
//! with shaderc. Each accessor returns 4-byte aligned words ready for
//! `vkCreateShaderModule`.

use std::sync::OnceLock;

/// Embedded SPIR-V bytecode (raw bytes, may not be aligned).
mod spirv_bytes {
    pub static PREPROCESS: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/preprocess.spv"));
    pub static PREFIX_SUM: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/prefix_sum.spv"));
    pub static PREPROCESS_SORT: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/preprocess_sort.spv"));
    pub static RADIX_HISTOGRAM: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/hist.spv"));
    pub static RADIX_SCATTER: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/sort.spv"));
    pub static TILE_BOUNDARY: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/tile_boundary.spv"));
    pub static RENDER: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/render.spv"));
}

/// SPIR-V magic number, first word of every module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Convert byte slice to aligned u32 Vec (SPIR-V requires 4-byte alignment).
fn bytes_to_spirv(bytes: &[u8]) -> Vec<u32> {
    assert!(
        bytes.len() % 4 == 0,
        "SPIR-V bytecode must be 4-byte aligned"
    );
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

macro_rules! shader_accessor {
    ($(#[$meta:meta])* $name:ident, $cell:ident, $bytes:ident) => {
        static $cell: OnceLock<Vec<u32>> = OnceLock::new();

        $(#[$meta])*
        pub fn $name() -> &'static [u32] {
            $cell.get_or_init(|| bytes_to_spirv(spirv_bytes::$bytes))
        }
    };
}

shader_accessor!(
    /// Per-splat projection, color, and tile overlap count.
    preprocess_shader, PREPROCESS_SPIRV, PREPROCESS
);
shader_accessor!(
    /// One Hillis-Steele inclusive scan pass.
    prefix_sum_shader, PREFIX_SUM_SPIRV, PREFIX_SUM
);
shader_accessor!(
    /// Instance expansion into (tile, depth) keys.
    preprocess_sort_shader, PREPROCESS_SORT_SPIRV, PREPROCESS_SORT
);
shader_accessor!(
    /// Radix sort digit histogram.
    radix_histogram_shader, RADIX_HISTOGRAM_SPIRV, RADIX_HISTOGRAM
);
shader_accessor!(
    /// Radix sort stable scatter.
    radix_scatter_shader, RADIX_SCATTER_SPIRV, RADIX_SCATTER
);
shader_accessor!(
    /// Per-tile instance ranges.
    tile_boundary_shader, TILE_BOUNDARY_SPIRV, TILE_BOUNDARY
);
shader_accessor!(
    /// 16x16 tile rasterizer.
    render_shader, RENDER_SPIRV, RENDER
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_shaders_load() {
        let shaders = [
            ("preprocess", preprocess_shader()),
            ("prefix_sum", prefix_sum_shader()),
            ("preprocess_sort", preprocess_sort_shader()),
            ("hist", radix_histogram_shader()),
            ("sort", radix_scatter_shader()),
            ("tile_boundary", tile_boundary_shader()),
            ("render", render_shader()),
        ];
        for (name, words) in shaders {
            assert_eq!(words[0], SPIRV_MAGIC, "Invalid SPIR-V magic number in {name}");
            assert!(words.len() > 20, "Shader {name} too small");
        }
    }

    #[test]
    fn accessors_are_cached() {
        assert!(std::ptr::eq(render_shader(), render_shader()));
    }

    #[test]
    #[should_panic(expected = "4-byte aligned")]
    fn misaligned_bytecode_is_rejected() {
        let _ = bytes_to_spirv(&[0x03, 0x02, 0x23]);
    }
}
