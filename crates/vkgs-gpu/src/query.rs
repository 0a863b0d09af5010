//! Named GPU timestamp queries.
//!
//! Timestamps are registered by name in `<stage>_start` / `<stage>_end` pairs.
//! After the work completes, [`TimestampQueries::fetch`] turns each pair into a
//! duration in milliseconds.

use crate::error::Result;
use ash::vk;
use hashbrown::HashMap;

/// Fixed-size timestamp query pool addressed by name.
pub struct TimestampQueries {
    pool: vk::QueryPool,
    capacity: u32,
    registry: HashMap<&'static str, u32>,
    period_ns: f32,
}

impl TimestampQueries {
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, capacity: u32, period_ns: f32) -> Result<Self> {
        let create_info = vk::QueryPoolCreateInfo::default()
            .query_type(vk::QueryType::TIMESTAMP)
            .query_count(capacity);
        let pool = device.create_query_pool(&create_info, None)?;
        Ok(Self {
            pool,
            capacity,
            registry: HashMap::with_capacity(capacity as usize),
            period_ns,
        })
    }

    /// Query index for `name`, assigning the next free slot on first use.
    pub fn register(&mut self, name: &'static str) -> Option<u32> {
        if let Some(&id) = self.registry.get(name) {
            return Some(id);
        }
        let next = self.registry.len() as u32;
        if next >= self.capacity {
            tracing::warn!(name, capacity = self.capacity, "Timestamp query pool full");
            return None;
        }
        self.registry.insert(name, next);
        Some(next)
    }

    /// Reset every query. Must be recorded before any timestamp of the frame.
    ///
    /// # Safety
    /// `cmd` must be recording.
    pub unsafe fn reset(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        device.cmd_reset_query_pool(cmd, self.pool, 0, self.capacity);
    }

    /// Write a timestamp after prior compute work completes.
    ///
    /// # Safety
    /// `cmd` must be recording.
    pub unsafe fn write(&mut self, device: &ash::Device, cmd: vk::CommandBuffer, name: &'static str) {
        if let Some(id) = self.register(name) {
            device.cmd_write_timestamp2(
                cmd,
                vk::PipelineStageFlags2::COMPUTE_SHADER,
                self.pool,
                id,
            );
        }
    }

    /// Read every registered timestamp and return per-stage durations.
    ///
    /// # Safety
    /// Every registered query must have been written by submitted work.
    pub unsafe fn fetch(&self, device: &ash::Device) -> Result<Vec<(String, f64)>> {
        let count = self.registry.len();
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut ticks = vec![0u64; count];
        device.get_query_pool_results(
            self.pool,
            0,
            &mut ticks,
            vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
        )?;
        Ok(stage_durations(&self.registry, &ticks, self.period_ns))
    }

    /// # Safety
    /// The pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_query_pool(self.pool, None);
    }
}

/// Pair `<stage>_start` with `<stage>_end` and convert tick deltas to
/// milliseconds, sorted by stage name.
pub fn stage_durations(
    registry: &HashMap<&'static str, u32>,
    ticks: &[u64],
    period_ns: f32,
) -> Vec<(String, f64)> {
    let mut durations: Vec<(String, f64)> = registry
        .iter()
        .filter_map(|(name, &start_id)| {
            let stage = name.strip_suffix("_start")?;
            let end_id = *registry.get(format!("{stage}_end").as_str())?;
            let start = *ticks.get(start_id as usize)?;
            let end = *ticks.get(end_id as usize)?;
            let ms = end.saturating_sub(start) as f64 * f64::from(period_ns) / 1.0e6;
            Some((stage.to_string(), ms))
        })
        .collect();
    durations.sort_by(|a, b| a.0.cmp(&b.0));
    durations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_become_milliseconds() {
        let mut registry = HashMap::new();
        registry.insert("sort_start", 0);
        registry.insert("sort_end", 1);
        registry.insert("render_start", 2);
        registry.insert("render_end", 3);
        registry.insert("orphan_start", 4);
        let ticks = [1_000, 3_001_000, 10_000_000, 10_500_000, 7];

        let durations = stage_durations(&registry, &ticks, 1.0);
        assert_eq!(durations.len(), 2);
        assert_eq!(durations[0].0, "render");
        assert!((durations[0].1 - 0.5).abs() < 1e-9);
        assert_eq!(durations[1].0, "sort");
        assert!((durations[1].1 - 3.0).abs() < 1e-9);
    }

    #[test]
    fn period_scales_ticks() {
        let mut registry = HashMap::new();
        registry.insert("a_start", 0);
        registry.insert("a_end", 1);
        let durations = stage_durations(&registry, &[0, 1_000_000], 2.5);
        assert!((durations[0].1 - 2.5).abs() < 1e-9);
    }
}
