//! GPU pipeline tests against the CPU reference.
//!
//! These need a Vulkan device and are ignored by default. Run them with
//! `cargo test -p vkgs-test -- --ignored`. Set `VKGS_TEST_OUTPUT` to a
//! directory to keep the rendered images.

use glam::{Quat, Vec3};
use vkgs_core::reference::{expand_instances, inclusive_scan, radix_sort, tile_boundaries};
use vkgs_core::scene::{random_scene, test_scene};
use vkgs_core::{sort_key, Splat, TileGrid, TileRange};
use vkgs_render::stages::ALL_STAGES;
use vkgs_render::{FrameInspection, FrameOutcome, FrameStats, MetricsSink, RendererConfig};
use vkgs_test::{
    compare_images, finish, reference_frame, reference_image, save_output, test_camera,
    GpuHarness,
};

const CANARY: u32 = 0xDEAD_BEEF;

fn config(width: u32, height: u32) -> RendererConfig {
    RendererConfig::new().with_size(width, height)
}

fn presented(outcome: FrameOutcome) -> FrameStats {
    match outcome {
        FrameOutcome::Presented(stats) => stats,
        FrameOutcome::Skipped => panic!("frame was skipped"),
    }
}

/// Checks that hold for any frame regardless of the scene.
fn assert_consistent(inspection: &FrameInspection) {
    let total = inspection.total_instances;
    let sum: u32 = inspection.overlaps.iter().sum();
    assert_eq!(total, sum, "total must equal the overlap sum");
    assert_eq!(inspection.scan, inclusive_scan(&inspection.overlaps));
    assert_eq!(inspection.keys.len(), total as usize);
    assert!(
        inspection.keys.windows(2).all(|w| w[0] <= w[1]),
        "keys must be sorted"
    );
    assert_eq!(
        inspection.ranges,
        tile_boundaries(&inspection.keys, inspection.grid.tile_count())
    );
    for (tile, range) in inspection.ranges.iter().enumerate() {
        for &key in &inspection.keys[range.start as usize..range.end as usize] {
            assert_eq!(sort_key::tile_of(key), tile as u32);
        }
    }
}

#[test]
#[ignore = "Requires GPU hardware"]
fn gpu_matches_cpu_reference() {
    let harness = GpuHarness::new().unwrap();
    let splats = random_scene(2_000, 7, 3.0);
    let camera = test_camera();
    let config = config(320, 240);

    let frame = harness.render_once(&splats, &camera, &config).unwrap();
    let stats = presented(frame.outcome);
    let inspection = &frame.inspection;
    assert_consistent(inspection);
    assert_eq!(stats.total_instances, inspection.total_instances);

    // Expanding and sorting the GPU's own attributes on the CPU must give the
    // same key sequence and the same (key, value) pairs.
    let (mut keys, mut values) = expand_instances(
        &inspection.attributes,
        &inspection.overlaps,
        &inspection.scan,
        &inspection.grid,
    );
    radix_sort(&mut keys, &mut values, frame.blocks_per_workgroup);
    assert_eq!(keys, inspection.keys);
    let mut cpu_pairs: Vec<(u64, u32)> = keys.into_iter().zip(values).collect();
    let mut gpu_pairs: Vec<(u64, u32)> = inspection
        .keys
        .iter()
        .copied()
        .zip(inspection.values.iter().copied())
        .collect();
    cpu_pairs.sort_unstable();
    gpu_pairs.sort_unstable();
    assert_eq!(cpu_pairs, gpu_pairs);

    // Projection runs in different float pipelines, so only tile-edge
    // rounding may differ from the reference.
    let reference = reference_frame(&splats, &camera, &config, frame.blocks_per_workgroup);
    let cpu_total = i64::from(reference.total_instances);
    let gpu_total = i64::from(inspection.total_instances);
    assert!(
        (cpu_total - gpu_total).abs() <= cpu_total / 100 + 4,
        "cpu {cpu_total} vs gpu {gpu_total}"
    );

    let expected = reference_image(&reference, config.width, config.height);
    save_output("reference_random", &frame.image).unwrap();
    save_output("reference_random_cpu", &expected).unwrap();
    let diff = compare_images(&expected, &frame.image).unwrap();
    assert!(diff < 0.02, "image difference {diff}");
}

#[test]
#[ignore = "Requires GPU hardware"]
fn sort_buffers_grow_until_every_instance_fits() {
    let harness = GpuHarness::new().unwrap();
    // Few splats, each covering many tiles, so one instance per splat is far
    // from enough.
    let splats: Vec<Splat> = (0..8)
        .map(|i| {
            let x = i as f32 * 0.4 - 1.4;
            Splat::new(
                Vec3::new(x, 0.0, 0.0),
                Vec3::splat(0.6),
                Quat::IDENTITY,
                0.5,
                Vec3::new(0.2, 0.4, 0.8),
            )
        })
        .collect();
    let config = config(256, 256).with_sort_multiplier(1);
    let mut renderer = harness.renderer(&splats, &config).unwrap();
    renderer.fill_sort_buffers(CANARY).unwrap();

    let frame = GpuHarness::capture(&mut renderer, &test_camera()).unwrap();
    let stats = presented(frame.outcome);
    assert!(stats.growths >= 1);
    assert!(stats.capacity >= u64::from(stats.total_instances));
    assert!(renderer.capacity().fits(stats.total_instances));
    assert_eq!(
        frame.metrics.text("multiplier"),
        Some(renderer.capacity().multiplier.to_string().as_str())
    );

    let inspection = &frame.inspection;
    assert_consistent(inspection);
    let canary_key = (u64::from(CANARY) << 32) | u64::from(CANARY);
    assert!(inspection.keys.iter().all(|&key| key != canary_key));
    assert!(inspection.values.iter().all(|&value| value < 8));

    // The grown buffers persist, so the next frame fits first time.
    let again = GpuHarness::capture(&mut renderer, &test_camera()).unwrap();
    assert_eq!(presented(again.outcome).growths, 0);
    finish(renderer).unwrap();
}

#[test]
#[ignore = "Requires GPU hardware"]
fn empty_scene_renders_black() {
    let harness = GpuHarness::new().unwrap();
    let frame = harness
        .render_once(&[], &test_camera(), &config(64, 64))
        .unwrap();
    let stats = presented(frame.outcome);
    assert_eq!(stats.total_instances, 0);
    assert!(frame.inspection.keys.is_empty());
    assert!(frame.inspection.ranges.iter().all(TileRange::is_empty));
    assert!(frame.image.pixels().all(|p| p.0[..3] == [0, 0, 0]));
}

#[test]
#[ignore = "Requires GPU hardware"]
fn culled_splats_never_reach_the_sort() {
    let harness = GpuHarness::new().unwrap();
    let behind = Splat::new(
        Vec3::new(0.0, 0.0, 20.0),
        Vec3::splat(0.5),
        Quat::IDENTITY,
        1.0,
        Vec3::ONE,
    );
    let aside = Splat::new(
        Vec3::new(500.0, 0.0, 0.0),
        Vec3::splat(0.01),
        Quat::IDENTITY,
        1.0,
        Vec3::ONE,
    );
    let frame = harness
        .render_once(&[behind, aside], &test_camera(), &config(128, 128))
        .unwrap();
    assert_eq!(frame.inspection.overlaps, vec![0, 0]);
    assert_eq!(frame.inspection.total_instances, 0);
    assert!(frame.inspection.ranges.iter().all(TileRange::is_empty));
}

#[test]
#[ignore = "Requires GPU hardware"]
fn full_screen_splat_covers_every_tile_once() {
    let harness = GpuHarness::new().unwrap();
    let color = Vec3::new(1.0, 0.5, 0.25);
    let splat = Splat::new(Vec3::ZERO, Vec3::splat(200.0), Quat::IDENTITY, 0.5, color);
    let config = config(64, 48);
    let frame = harness
        .render_once(&[splat], &test_camera(), &config)
        .unwrap();

    let tiles = TileGrid::new(64, 48).tile_count();
    assert_eq!(frame.inspection.total_instances, tiles);
    for (tile, range) in frame.inspection.ranges.iter().enumerate() {
        assert_eq!(
            *range,
            TileRange {
                start: tile as u32,
                end: tile as u32 + 1
            }
        );
    }

    save_output("full_screen", &frame.image).unwrap();
    let center = frame.image.get_pixel(32, 24).0;
    let expected = [color.x * 0.5, color.y * 0.5, color.z * 0.5].map(|c| c * 255.0);
    for (got, want) in center.iter().zip(expected) {
        assert!(
            (f32::from(*got) - want).abs() <= 3.0,
            "pixel {center:?} vs {expected:?}"
        );
    }
}

#[test]
#[ignore = "Requires GPU hardware"]
fn repeated_frames_are_identical() {
    let harness = GpuHarness::new().unwrap();
    let splats = random_scene(1_000, 5, 2.0);
    let mut renderer = harness.renderer(&splats, &config(200, 150)).unwrap();

    let a = GpuHarness::capture(&mut renderer, &test_camera()).unwrap();
    let b = GpuHarness::capture(&mut renderer, &test_camera()).unwrap();
    assert_eq!(a.inspection.total_instances, b.inspection.total_instances);
    assert_eq!(a.inspection.keys, b.inspection.keys);
    assert_eq!(a.inspection.ranges, b.inspection.ranges);
    assert_eq!(a.image, b.image);
    finish(renderer).unwrap();
}

#[test]
#[ignore = "Requires GPU hardware"]
fn resize_rebuilds_tile_ranges() {
    let harness = GpuHarness::new().unwrap();
    let splats = test_scene();
    let mut renderer = harness.renderer(&splats, &config(96, 64)).unwrap();
    GpuHarness::capture(&mut renderer, &test_camera()).unwrap();

    renderer.target_mut().resize(200, 120);
    let frame = GpuHarness::capture(&mut renderer, &test_camera()).unwrap();
    let stats = presented(frame.outcome);
    assert!(stats.recreates >= 1);
    assert_eq!(frame.image.dimensions(), (200, 120));
    assert_eq!(renderer.grid(), TileGrid::new(200, 120));
    assert_eq!(
        frame.inspection.ranges.len(),
        TileGrid::new(200, 120).tile_count() as usize
    );
    assert_consistent(&frame.inspection);

    renderer.target_mut().resize(0, 0);
    let mut metrics = vkgs_render::NullMetrics;
    let skipped = renderer.draw_frame(&test_camera(), &mut metrics).unwrap();
    assert_eq!(skipped, FrameOutcome::Skipped);
    finish(renderer).unwrap();
}

#[test]
#[ignore = "Requires GPU hardware"]
fn stage_timings_reach_the_sink() {
    let harness = GpuHarness::new().unwrap();
    let timestamps = harness.gpu().capabilities().supports_timestamps();
    let frame = harness
        .render_once(&test_scene(), &test_camera(), &config(128, 128))
        .unwrap();

    let total = frame.inspection.total_instances.to_string();
    assert_eq!(frame.metrics.text("instances"), Some(total.as_str()));
    if timestamps {
        for stage in ALL_STAGES {
            let stats = frame.metrics.stats(stage.name).unwrap();
            assert!(stats.last >= 0.0);
        }
    }

    // Sinks only see names and values.
    struct Count(usize);
    impl MetricsSink for Count {
        fn push_metric(&mut self, _name: &str, _value: f64) {
            self.0 += 1;
        }
        fn push_text_metric(&mut self, _name: &str, _value: &str) {}
    }
    let mut renderer = harness.renderer(&test_scene(), &config(64, 64)).unwrap();
    let mut count = Count(0);
    renderer.draw_frame(&test_camera(), &mut count).unwrap();
    assert_eq!(count.0, if timestamps { ALL_STAGES.len() } else { 0 });
    finish(renderer).unwrap();
}
