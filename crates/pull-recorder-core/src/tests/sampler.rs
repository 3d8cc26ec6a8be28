use crate::{
    capture::{Dimensions, SourceKind},
    sampler::{
        FALLBACK_DIMENSIONS, FrameSampler, MIN_SAMPLE_SIDE, SamplerConfig, sample_dimensions,
        wait_for_dimensions,
    },
    tests::fakes::FakeStream,
};

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::time::Instant;

/// WHAT: Longer edge is capped and aspect ratio kept
/// WHY: Inference cost scales with sample size
#[test]
fn given_1080p_source_when_sizing_sample_then_longer_edge_capped() {
    // Given: A 1920x1080 source
    let source = Dimensions::new(1920, 1080);

    // When: Sizing for a 512 px edge
    let target = sample_dimensions(source, 512);

    // Then: 512x288
    assert_eq!(target, Dimensions::new(512, 288));
}

/// WHAT: Small sources are never upscaled
/// WHY: Upscaling adds cost without information
#[test]
fn given_small_source_when_sizing_sample_then_unchanged() {
    let target = sample_dimensions(Dimensions::new(320, 200), 512);
    assert_eq!(target, Dimensions::new(320, 200));
}

/// WHAT: Extreme aspect ratios keep at least the minimum side
/// WHY: A zero-height buffer cannot be resized or inferred
#[test]
fn given_extreme_aspect_when_sizing_sample_then_sides_clamped() {
    let target = sample_dimensions(Dimensions::new(10_000, 1), 512);
    assert_eq!(target.width, 512);
    assert_eq!(target.height, MIN_SAMPLE_SIDE);
}

/// WHAT: Silent sources fall back to 1280x720
/// WHY: Some sources never report readiness
#[tokio::test(start_paused = true)]
async fn given_stream_never_ready_when_waiting_then_fallback_dimensions() {
    // Given: A stream with unknown dimensions whose ready() never resolves
    let mut stream = FakeStream::new(SourceKind::Screen, None);

    // When: Waiting with the default bound
    let started = Instant::now();
    let dims = wait_for_dimensions(&mut stream, Duration::from_millis(250)).await;

    // Then: Fallback after the bound
    assert_eq!(dims, FALLBACK_DIMENSIONS);
    assert!(started.elapsed() >= Duration::from_millis(250));
}

/// WHAT: Samples are produced at the configured cadence
/// WHY: Detection runs at a fixed rate regardless of the source frame rate
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used)]
async fn given_sampler_when_taking_three_samples_then_one_interval_apart() {
    // Given: A 1024x576 stream sampled once per second
    let stream = FakeStream::new(SourceKind::Window, Some(Dimensions::new(1024, 576)));
    let grabs = stream.grabs.clone();
    let mut sampler = FrameSampler::new(Box::new(stream), SamplerConfig::default());

    // When: Taking three samples
    let started = Instant::now();
    let first = sampler.next_sample().await.unwrap();
    let _second = sampler.next_sample().await.unwrap();
    let third = sampler.next_sample().await.unwrap();

    // Then: First immediately, third two intervals later, downscaled
    assert_eq!(first.captured_at, started);
    let elapsed = third.captured_at - started;
    assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_millis(2100));
    assert_eq!(third.dimensions(), Dimensions::new(512, 288));
    assert_eq!(third.pixels.len(), 512 * 288 * 4);
    assert_eq!(grabs.load(Ordering::SeqCst), 3);
}

/// WHAT: Releasing the sampler stops its stream
/// WHY: Platform capture resources must not leak
#[tokio::test]
async fn given_sampler_when_released_then_stream_stopped() {
    // Given: A sampler over a live stream
    let stream = FakeStream::new(SourceKind::Window, Some(Dimensions::new(64, 36)));
    let stops = stream.stops.clone();
    let live = stream.live.clone();
    let sampler = FrameSampler::new(Box::new(stream), SamplerConfig::default());

    // When: Releasing
    sampler.release().await;

    // Then: Stream stopped once
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert!(!live.load(Ordering::SeqCst));
}

/// WHAT: Restart swaps streams and recomputes geometry
/// WHY: A re-resolved source can have a different size
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_restart_with_new_size_when_sampling_then_new_geometry() {
    // Given: A sampler prepared on a 64x36 stream
    let first = FakeStream::new(SourceKind::Window, Some(Dimensions::new(64, 36)));
    let first_stops = first.stops.clone();
    let mut sampler = FrameSampler::new(Box::new(first), SamplerConfig::default());
    sampler.sample_now().await.unwrap();

    // When: Restarting on a 1024x1024 stream
    let second = FakeStream::new(SourceKind::Screen, Some(Dimensions::new(1024, 1024)));
    sampler.restart(Box::new(second)).await;
    let sample = sampler.sample_now().await.unwrap();

    // Then: Old stream stopped, new geometry applied
    assert_eq!(first_stops.load(Ordering::SeqCst), 1);
    assert_eq!(sample.dimensions(), Dimensions::new(512, 512));
}

/// WHAT: Downscaling a full-resolution frame yields to other tasks
/// WHY: A 4K resize on the runtime thread would stall timers and the controller
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_4k_frame_when_sampling_then_runtime_keeps_running_other_tasks() {
    // Given: A 4K source and a task queued on the same single-threaded runtime
    let stream = FakeStream::new(SourceKind::Screen, Some(Dimensions::new(3840, 2160)));
    let mut sampler = FrameSampler::new(Box::new(stream), SamplerConfig::default());
    sampler.prepare().await;
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    tokio::spawn(async move { flag.store(true, Ordering::SeqCst) });

    // When: Sampling a frame
    let sample = sampler.sample_now().await.unwrap();

    // Then: The queued task ran while the resize was in progress
    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(sample.dimensions(), Dimensions::new(512, 288));
}
