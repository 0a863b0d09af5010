//! Frame orchestration.
//!
//! A frame is two submissions on one queue. The first runs preprocess and the
//! prefix sum; it is recorded once and resubmitted every frame. The CPU waits
//! for it and reads the instance total, which sizes everything recorded into
//! the second submission: instance expansion, radix sort, tile ranges, and
//! the raster pass. When the total does not fit the sort buffers they are
//! grown and the frame is attempted again.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};
use vkgs_core::camera::Camera;
use vkgs_core::{FrameUniforms, SortCapacity, TileGrid, TileRange, VertexAttribute};
use vkgs_gpu::command::{begin_command_buffer, end_command_buffer, submit};
use vkgs_gpu::sync::{reset_fence, wait_for_fence};
use vkgs_gpu::{
    barrier, BufferTable, CommandPool, FrameSync, GpuContext, GpuError, TimestampQueries,
};

use crate::config::RendererConfig;
use crate::error::{RenderError, Result};
use crate::metrics::MetricsSink;
use crate::resources::FrameBuffers;
use crate::scene::SceneSource;
use crate::stages::{
    self, PrefixSumStage, PreprocessSortPush, PreprocessSortStage, PreprocessStage,
    RadixSortStage, RasterStage, TileBoundaryStage, TIMESTAMP_QUERIES,
};
use crate::target::{AcquireOutcome, PresentOutcome, RenderTarget, TargetImage};

/// Target recreations tolerated within one `draw_frame` call.
const MAX_RECREATES_PER_FRAME: u32 = 4;

/// Result of one pass through the two-phase frame protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The frame was rendered and handed to the target.
    Presented {
        total_instances: u32,
        present: PresentOutcome,
    },
    /// The instances did not fit. The sort buffers were grown and the frame
    /// must be attempted again.
    Grown {
        total_instances: u32,
        previous: SortCapacity,
        grown: SortCapacity,
    },
    /// The target must be recreated before the frame can be rendered.
    TargetOutOfDate,
}

/// Counters for one presented frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub total_instances: u32,
    /// Sort buffer capacity in instances after the frame.
    pub capacity: u64,
    /// Attempts that ended in sort buffer growth.
    pub growths: u32,
    /// Target recreations performed for this frame.
    pub recreates: u32,
}

/// Result of [`SplatRenderer::draw_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented(FrameStats),
    /// Nothing was rendered: the target has no area, or it kept going out of
    /// date.
    Skipped,
}

/// Intermediate buffers read back after a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameInspection {
    pub grid: TileGrid,
    pub total_instances: u32,
    pub attributes: Vec<VertexAttribute>,
    pub overlaps: Vec<u32>,
    /// Inclusive scan of `overlaps`.
    pub scan: Vec<u32>,
    /// Sorted keys, `total_instances` long.
    pub keys: Vec<u64>,
    pub values: Vec<u32>,
    /// One range per tile, row-major.
    pub ranges: Vec<TileRange>,
}

struct Stages {
    preprocess: PreprocessStage,
    prefix_sum: PrefixSumStage,
    preprocess_sort: PreprocessSortStage,
    radix_sort: RadixSortStage,
    tile_boundary: TileBoundaryStage,
    raster: RasterStage,
}

impl Stages {
    fn new(
        gpu: &GpuContext,
        table: &mut BufferTable,
        buffers: &FrameBuffers,
        scene: &dyn SceneSource,
        blocks_per_workgroup: u32,
        images: &[TargetImage],
    ) -> vkgs_gpu::Result<Self> {
        Ok(Self {
            preprocess: PreprocessStage::new(gpu, table, buffers, scene)?,
            prefix_sum: PrefixSumStage::new(gpu, table, buffers)?,
            preprocess_sort: PreprocessSortStage::new(gpu, table, buffers)?,
            radix_sort: RadixSortStage::new(gpu, table, buffers, blocks_per_workgroup)?,
            tile_boundary: TileBoundaryStage::new(gpu, table, buffers)?,
            raster: RasterStage::new(gpu, table, buffers, images)?,
        })
    }

    unsafe fn destroy(&self, device: &ash::Device) {
        self.preprocess.destroy(device);
        self.prefix_sum.destroy(device);
        self.preprocess_sort.destroy(device);
        self.radix_sort.destroy(device);
        self.tile_boundary.destroy(device);
        self.raster.destroy(device);
    }
}

/// Renders a [`SceneSource`] into a [`RenderTarget`].
///
/// One frame is in flight at a time.
pub struct SplatRenderer<T: RenderTarget> {
    gpu: Arc<GpuContext>,
    target: T,
    scene: Box<dyn SceneSource>,
    table: BufferTable,
    buffers: FrameBuffers,
    stages: Stages,
    pool: CommandPool,
    preprocess_cmd: vk::CommandBuffer,
    render_cmd: vk::CommandBuffer,
    sync: FrameSync,
    queries: Option<TimestampQueries>,
    capacity: SortCapacity,
    extent: vk::Extent2D,
    grid: TileGrid,
    needs_resize: bool,
    last_total: u32,
}

impl<T: RenderTarget> SplatRenderer<T> {
    /// Allocate every frame resource and build the stages.
    ///
    /// The renderer takes ownership of `target` and `scene` and destroys the
    /// scene in [`SplatRenderer::destroy`].
    pub fn new(
        gpu: Arc<GpuContext>,
        target: T,
        scene: Box<dyn SceneSource>,
        config: &RendererConfig,
    ) -> Result<Self> {
        config.validate()?;

        let capabilities = gpu.capabilities();
        let blocks_per_workgroup = config.blocks_per_workgroup_for(capabilities.vendor);
        let extent = target.extent();
        let grid = TileGrid::new(extent.width, extent.height);
        let num_splats = scene.num_splats();
        let capacity = SortCapacity::new(num_splats, config.sort_multiplier);

        let mut table = BufferTable::new();
        let buffers = FrameBuffers::new(
            &gpu,
            &mut table,
            num_splats,
            capacity,
            blocks_per_workgroup,
            &grid,
        )
        .map_err(RenderError::Init)?;
        let stages = Stages::new(
            &gpu,
            &mut table,
            &buffers,
            scene.as_ref(),
            blocks_per_workgroup,
            target.images(),
        )
        .map_err(RenderError::Init)?;

        let device = gpu.device();
        let (pool, preprocess_cmd, render_cmd, sync) = unsafe {
            let pool = CommandPool::new(device, gpu.queue_family()).map_err(RenderError::Init)?;
            let preprocess_cmd = pool.allocate(device).map_err(RenderError::Init)?;
            let render_cmd = pool.allocate(device).map_err(RenderError::Init)?;
            let sync = FrameSync::new(device).map_err(RenderError::Init)?;
            (pool, preprocess_cmd, render_cmd, sync)
        };

        let queries = if !config.timestamps {
            None
        } else if capabilities.supports_timestamps() {
            Some(
                unsafe {
                    TimestampQueries::new(device, TIMESTAMP_QUERIES, capabilities.timestamp_period)
                }
                .map_err(RenderError::Init)?,
            )
        } else {
            warn!("Queue has no timestamp support, stage timings disabled");
            None
        };

        let mut renderer = Self {
            gpu,
            target,
            scene,
            table,
            buffers,
            stages,
            pool,
            preprocess_cmd,
            render_cmd,
            sync,
            queries,
            capacity,
            extent,
            grid,
            needs_resize: false,
            last_total: 0,
        };
        unsafe { renderer.record_preprocess() }.map_err(RenderError::Init)?;

        info!(
            splats = num_splats,
            capacity = capacity.instances(),
            blocks_per_workgroup,
            width = extent.width,
            height = extent.height,
            timestamps = renderer.queries.is_some(),
            "Created splat renderer"
        );
        Ok(renderer)
    }

    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn capacity(&self) -> SortCapacity {
        self.capacity
    }

    pub fn blocks_per_workgroup(&self) -> u32 {
        self.stages.radix_sort.blocks_per_workgroup()
    }

    pub fn grid(&self) -> TileGrid {
        self.grid
    }

    /// Instance total of the last completed frame.
    pub fn last_total_instances(&self) -> u32 {
        self.last_total
    }

    /// Request a target recreation before the next frame.
    pub fn request_resize(&mut self) {
        self.needs_resize = true;
    }

    /// Render and present one frame, growing buffers and recreating the
    /// target as often as needed.
    pub fn draw_frame(
        &mut self,
        camera: &Camera,
        metrics: &mut dyn MetricsSink,
    ) -> Result<FrameOutcome> {
        let mut growths = 0;
        let mut recreates = 0;

        loop {
            let extent = self.target.extent();
            if extent.width == 0 || extent.height == 0 {
                return Ok(FrameOutcome::Skipped);
            }
            if self.needs_resize || extent != self.extent {
                if recreates == MAX_RECREATES_PER_FRAME {
                    warn!(recreates, "Target keeps going out of date, skipping frame");
                    return Ok(FrameOutcome::Skipped);
                }
                self.handle_resize()?;
                recreates += 1;
                continue;
            }

            match self.attempt_frame(camera, metrics)? {
                AttemptOutcome::Presented {
                    total_instances,
                    present,
                } => {
                    if present.needs_recreate() {
                        self.needs_resize = true;
                    }
                    return Ok(FrameOutcome::Presented(FrameStats {
                        total_instances,
                        capacity: self.capacity.instances(),
                        growths,
                        recreates,
                    }));
                }
                AttemptOutcome::Grown { .. } => growths += 1,
                AttemptOutcome::TargetOutOfDate => self.needs_resize = true,
            }
        }
    }

    /// Run the two-phase frame protocol once.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn attempt_frame(
        &mut self,
        camera: &Camera,
        metrics: &mut dyn MetricsSink,
    ) -> Result<AttemptOutcome> {
        let gpu = Arc::clone(&self.gpu);
        let device = gpu.device();
        let num_splats = self.scene.num_splats();

        // 1. Previous frame finished; uniforms are free to overwrite
        unsafe { wait_for_fence(device, self.sync.render_done, u64::MAX)? };
        let uniforms = FrameUniforms::from_camera(camera, self.extent.width, self.extent.height);
        self.table.get(self.buffers.uniforms).write(&[uniforms])?;

        // 2. Preprocess and scan, then read the total back
        unsafe {
            submit(
                device,
                gpu.queue(),
                self.preprocess_cmd,
                None,
                None,
                self.sync.preprocess_done,
            )?;
            wait_for_fence(device, self.sync.preprocess_done, u64::MAX)?;
            reset_fence(device, self.sync.preprocess_done)?;
        }
        let total_instances: u32 = self.table.get(self.buffers.total).read_one(0)?;

        // 3. Grow the sort buffers if the instances do not fit
        if let Some(grown) = self.capacity.grown_for(total_instances) {
            let previous = self.capacity;
            info!(
                total_instances,
                old_multiplier = previous.multiplier,
                new_multiplier = grown.multiplier,
                capacity = grown.instances(),
                "Growing sort buffers"
            );
            unsafe {
                self.buffers.grow_sort_buffers(
                    &gpu,
                    &mut self.table,
                    grown,
                    self.stages.radix_sort.blocks_per_workgroup(),
                )?;
            }
            self.capacity = grown;
            unsafe { self.record_preprocess()? };
            return Ok(AttemptOutcome::Grown {
                total_instances,
                previous,
                grown,
            });
        }

        // 4. Acquire
        let outcome = unsafe { self.target.acquire_next_image(self.sync.image_available) }
            .map_err(RenderError::Target)?;
        let (image_index, suboptimal) = match outcome {
            AcquireOutcome::Acquired { index, suboptimal } => (index, suboptimal),
            AcquireOutcome::OutOfDate => {
                debug!("Target out of date on acquire");
                return Ok(AttemptOutcome::TargetOutOfDate);
            }
        };

        // 5. Expansion, sort, tile ranges, raster
        unsafe {
            self.record_render(image_index, num_splats, total_instances)?;
            reset_fence(device, self.sync.render_done)?;
            let wait = self
                .target
                .uses_semaphores()
                .then_some((self.sync.image_available, vk::PipelineStageFlags2::COMPUTE_SHADER));
            let signal = self
                .target
                .uses_semaphores()
                .then_some(self.sync.render_finished);
            submit(
                device,
                gpu.queue(),
                self.render_cmd,
                wait,
                signal,
                self.sync.render_done,
            )?;
        }

        // 6. Present
        let mut present = unsafe { self.target.present(image_index, self.sync.render_finished) }
            .map_err(RenderError::Target)?;
        if suboptimal && present == PresentOutcome::Presented {
            present = PresentOutcome::Suboptimal;
        }

        // 7. Timings
        unsafe { wait_for_fence(device, self.sync.render_done, u64::MAX)? };
        if let Some(queries) = &self.queries {
            for (stage, ms) in unsafe { queries.fetch(device)? } {
                metrics.push_metric(&stage, ms);
            }
        }
        metrics.push_text_metric("instances", &total_instances.to_string());
        metrics.push_text_metric("multiplier", &self.capacity.multiplier.to_string());
        self.last_total = total_instances;

        Ok(AttemptOutcome::Presented {
            total_instances,
            present,
        })
    }

    /// Recreate the target and everything sized by it.
    pub fn handle_resize(&mut self) -> Result<()> {
        let gpu = Arc::clone(&self.gpu);
        gpu.wait_idle()?;

        unsafe { self.target.recreate() }.map_err(RenderError::Target)?;
        let extent = self.target.extent();
        if extent.width == 0 || extent.height == 0 {
            debug!("Target has no area, deferring resize");
            self.needs_resize = true;
            return Ok(());
        }
        self.needs_resize = false;

        if extent == self.extent {
            unsafe {
                self.stages.raster.rebuild(
                    &gpu,
                    &mut self.table,
                    &self.buffers,
                    self.target.images(),
                )?;
            }
            debug!("Recreated render target at unchanged size");
            return Ok(());
        }

        let grid = TileGrid::new(extent.width, extent.height);
        unsafe {
            self.buffers.resize_ranges(&gpu, &mut self.table, &grid)?;
            self.stages.raster.rebuild(
                &gpu,
                &mut self.table,
                &self.buffers,
                self.target.images(),
            )?;
        }
        info!(
            width = extent.width,
            height = extent.height,
            tiles = grid.tile_count(),
            "Resized render target"
        );
        self.extent = extent;
        self.grid = grid;
        Ok(())
    }

    /// Fill the key and value buffers with `word`, so stale data is
    /// recognizable after a frame.
    pub fn fill_sort_buffers(&self, word: u32) -> Result<()> {
        let gpu = &self.gpu;
        let device = gpu.device();
        let buffers: Vec<vk::Buffer> = self
            .buffers
            .keys
            .iter()
            .chain(&self.buffers.values)
            .map(|&handle| self.table.buffer(handle))
            .collect();
        unsafe {
            wait_for_fence(device, self.sync.render_done, u64::MAX)?;
            vkgs_gpu::command::execute_single_time_commands(device, &self.pool, gpu.queue(), |cmd| {
                for &buffer in &buffers {
                    device.cmd_fill_buffer(cmd, buffer, 0, vk::WHOLE_SIZE, word);
                    barrier::transfer_to_compute(device, cmd, buffer);
                }
            })?;
        }
        Ok(())
    }

    /// Download the intermediate buffers of the last frame.
    pub fn inspect(&self) -> Result<FrameInspection> {
        let gpu = &self.gpu;
        let device = gpu.device();
        let num_splats = self.scene.num_splats() as usize;
        let total_instances = self.last_total;
        let instances = total_instances.min(self.capacity.instances() as u32) as usize;
        let scan = self.buffers.scan[PrefixSumStage::result_option(num_splats as u32)];

        unsafe {
            wait_for_fence(device, self.sync.render_done, u64::MAX)?;
            let table = &self.table;
            let pool = &self.pool;
            Ok(FrameInspection {
                grid: self.grid,
                total_instances,
                attributes: table.get(self.buffers.attributes).download(gpu, pool, num_splats)?,
                overlaps: table.get(self.buffers.overlaps).download(gpu, pool, num_splats)?,
                scan: table.get(scan).download(gpu, pool, num_splats)?,
                keys: table.get(self.buffers.keys[0]).download(gpu, pool, instances)?,
                values: table.get(self.buffers.values[0]).download(gpu, pool, instances)?,
                ranges: table.get(self.buffers.ranges).download(
                    gpu,
                    pool,
                    self.grid.tile_count() as usize,
                )?,
            })
        }
    }

    /// Destroy every renderer resource and the scene. The target is returned
    /// to the caller, which owns its teardown.
    pub fn destroy(mut self) -> Result<T> {
        let gpu = Arc::clone(&self.gpu);
        let device = gpu.device();
        gpu.wait_idle()?;
        unsafe {
            if let Some(queries) = &self.queries {
                queries.destroy(device);
            }
            self.sync.destroy(device);
            self.pool
                .free(device, &[self.preprocess_cmd, self.render_cmd]);
            self.pool.destroy(device);
            self.stages.destroy(device);
            self.scene.destroy(&gpu)?;
        }
        self.table.destroy(&gpu)?;
        debug!("Destroyed splat renderer");
        Ok(self.target)
    }

    /// Record the first submission: query reset, preprocess, prefix sum.
    unsafe fn record_preprocess(&mut self) -> vkgs_gpu::Result<()> {
        let device = self.gpu.device();
        let cmd = self.preprocess_cmd;
        let num_splats = self.scene.num_splats();

        begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::empty())?;
        if let Some(queries) = &self.queries {
            queries.reset(device, cmd);
        }

        stages::PREPROCESS.begin(self.queries.as_mut(), device, cmd);
        self.stages
            .preprocess
            .record(device, cmd, &self.table, &self.buffers, num_splats);
        stages::PREPROCESS.end(self.queries.as_mut(), device, cmd);

        stages::PREFIX_SUM.begin(self.queries.as_mut(), device, cmd);
        self.stages
            .prefix_sum
            .record(device, cmd, &self.table, &self.buffers, num_splats);
        stages::PREFIX_SUM.end(self.queries.as_mut(), device, cmd);

        end_command_buffer(device, cmd)
    }

    /// Record the second submission for `image_index`.
    unsafe fn record_render(
        &mut self,
        image_index: u32,
        num_splats: u32,
        total_instances: u32,
    ) -> vkgs_gpu::Result<()> {
        let device = self.gpu.device();
        let cmd = self.render_cmd;
        let image = *self
            .target
            .images()
            .get(image_index as usize)
            .ok_or_else(|| {
                GpuError::InvalidState(format!("Target returned unknown image {image_index}"))
            })?;
        let (table, buffers, stages) = (&self.table, &self.buffers, &self.stages);

        begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

        stages::PREPROCESS_SORT.begin(self.queries.as_mut(), device, cmd);
        stages.preprocess_sort.record(
            device,
            cmd,
            table,
            buffers,
            PreprocessSortPush::new(num_splats, self.grid.tiles_x, self.capacity),
        );
        stages::PREPROCESS_SORT.end(self.queries.as_mut(), device, cmd);

        stages::RADIX_SORT.begin(self.queries.as_mut(), device, cmd);
        stages
            .radix_sort
            .record(device, cmd, table, buffers, total_instances);
        stages::RADIX_SORT.end(self.queries.as_mut(), device, cmd);

        stages::TILE_BOUNDARY.begin(self.queries.as_mut(), device, cmd);
        stages
            .tile_boundary
            .record(device, cmd, table, buffers, total_instances);
        stages::TILE_BOUNDARY.end(self.queries.as_mut(), device, cmd);

        barrier::image_to_storage(device, cmd, image.image, vk::ImageLayout::UNDEFINED);
        stages::RENDER.begin(self.queries.as_mut(), device, cmd);
        stages
            .raster
            .record(device, cmd, image_index as usize, self.extent);
        stages::RENDER.end(self.queries.as_mut(), device, cmd);
        barrier::storage_to_layout(device, cmd, image.image, self.target.present_layout());

        end_command_buffer(device, cmd)
    }
}
