//! Compute stages of the splat pipeline.
//!
//! Each stage owns one compute pipeline (two for the radix sort) and the
//! descriptor set group it binds. Stages only record commands; the renderer
//! decides which command buffer they go into and when it is submitted.

mod prefix_sum;
mod preprocess;
mod preprocess_sort;
mod radix_sort;
mod raster;
mod tile_boundary;

pub use prefix_sum::{PrefixSumPush, PrefixSumStage};
pub use preprocess::{PreprocessPush, PreprocessStage};
pub use preprocess_sort::{PreprocessSortPush, PreprocessSortStage};
pub use radix_sort::{RadixSortPush, RadixSortStage};
pub use raster::{RasterPush, RasterStage};
pub use tile_boundary::{TileBoundaryPush, TileBoundaryStage};

use ash::vk;
use vkgs_gpu::TimestampQueries;

/// Timestamp query names bracketing one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimer {
    pub name: &'static str,
    start: &'static str,
    end: &'static str,
}

macro_rules! stage_timer {
    ($name:literal) => {
        StageTimer {
            name: $name,
            start: concat!($name, "_start"),
            end: concat!($name, "_end"),
        }
    };
}

pub const PREPROCESS: StageTimer = stage_timer!("preprocess");
pub const PREFIX_SUM: StageTimer = stage_timer!("prefix_sum");
pub const PREPROCESS_SORT: StageTimer = stage_timer!("preprocess_sort");
pub const RADIX_SORT: StageTimer = stage_timer!("radix_sort");
pub const TILE_BOUNDARY: StageTimer = stage_timer!("tile_boundary");
pub const RENDER: StageTimer = stage_timer!("render");

/// Every timed stage, in execution order.
pub const ALL_STAGES: [StageTimer; 6] = [
    PREPROCESS,
    PREFIX_SUM,
    PREPROCESS_SORT,
    RADIX_SORT,
    TILE_BOUNDARY,
    RENDER,
];

/// Queries needed to time every stage.
pub const TIMESTAMP_QUERIES: u32 = 2 * ALL_STAGES.len() as u32;

impl StageTimer {
    /// Write the start timestamp, if timing is enabled.
    ///
    /// # Safety
    /// `cmd` must be recording.
    pub(crate) unsafe fn begin(
        self,
        queries: Option<&mut TimestampQueries>,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
    ) {
        if let Some(queries) = queries {
            queries.write(device, cmd, self.start);
        }
    }

    /// Write the end timestamp, if timing is enabled.
    ///
    /// # Safety
    /// `cmd` must be recording.
    pub(crate) unsafe fn end(
        self,
        queries: Option<&mut TimestampQueries>,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
    ) {
        if let Some(queries) = queries {
            queries.write(device, cmd, self.end);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_names_pair_up() {
        assert_eq!(RADIX_SORT.start, "radix_sort_start");
        assert_eq!(RADIX_SORT.end, "radix_sort_end");
        for stage in ALL_STAGES {
            assert_eq!(stage.start.strip_suffix("_start"), Some(stage.name));
            assert_eq!(stage.end.strip_suffix("_end"), Some(stage.name));
        }
    }

    #[test]
    fn query_pool_fits_every_stage() {
        assert_eq!(TIMESTAMP_QUERIES, 12);
    }
}
