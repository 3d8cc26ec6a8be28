use crate::{
    CaptureError, CoreResult,
    capture::{CaptureSourceDescriptor, Dimensions, LiveStream},
    sampler::{DEFAULT_MAX_SAMPLE_EDGE, FALLBACK_DIMENSIONS, FrameSample, resize_rgba, sample_dimensions},
};

use std::{panic::Location, time::Duration};

use error_location::ErrorLocation;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, instrument};

/// Default detection cadence.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on waiting for a source to report its dimensions.
pub const READY_TIMEOUT: Duration = Duration::from_millis(250);

/// Frame sampler tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    /// Time between samples.
    pub interval: Duration,
    /// Upper bound on the longer edge of a sample.
    pub max_edge: u32,
    /// Upper bound on the readiness wait before the first sample.
    pub ready_timeout: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SAMPLE_INTERVAL,
            max_edge: DEFAULT_MAX_SAMPLE_EDGE,
            ready_timeout: READY_TIMEOUT,
        }
    }
}

/// Wait for a stream to report valid dimensions, bounded by `timeout`.
///
/// Sources that never signal readiness fall back to whatever they report,
/// then to [`FALLBACK_DIMENSIONS`].
#[instrument(skip(stream))]
pub async fn wait_for_dimensions(stream: &mut dyn LiveStream, timeout: Duration) -> Dimensions {
    if let Some(dims) = stream.dimensions().filter(Dimensions::is_valid) {
        return dims;
    }

    match tokio::time::timeout(timeout, stream.ready()).await {
        Ok(Ok(dims)) if dims.is_valid() => dims,
        Ok(Ok(dims)) => {
            debug!(dims = %dims, "Source reported degenerate dimensions");
            stream
                .dimensions()
                .filter(Dimensions::is_valid)
                .unwrap_or(FALLBACK_DIMENSIONS)
        }
        Ok(Err(e)) => {
            debug!(error = %e, "Source readiness failed, using fallback dimensions");
            FALLBACK_DIMENSIONS
        }
        Err(_) => {
            debug!(
                timeout_ms = timeout.as_millis(),
                "Source readiness timed out, using fallback dimensions"
            );
            stream
                .dimensions()
                .filter(Dimensions::is_valid)
                .unwrap_or(FALLBACK_DIMENSIONS)
        }
    }
}

/// Fixed-cadence frame extraction from a live stream.
///
/// Lazy: nothing is grabbed until [`FrameSampler::next_sample`] is awaited.
/// Independent of recording state, so a new start can be detected on the
/// very next tick after a stop.
pub struct FrameSampler {
    stream: Box<dyn LiveStream>,
    config: SamplerConfig,
    source: Option<Dimensions>,
    target: Option<Dimensions>,
    ticker: Option<Interval>,
}

impl FrameSampler {
    /// Wrap a live stream.
    pub fn new(stream: Box<dyn LiveStream>, config: SamplerConfig) -> Self {
        Self {
            stream,
            config,
            source: None,
            target: None,
            ticker: None,
        }
    }

    /// Descriptor of the stream being sampled.
    pub fn descriptor(&self) -> &CaptureSourceDescriptor {
        self.stream.descriptor()
    }

    /// False once the underlying stream has ended.
    pub fn is_live(&self) -> bool {
        self.stream.is_live()
    }

    /// Sample size chosen for the current source, once prepared.
    pub fn target_dimensions(&self) -> Option<Dimensions> {
        self.target
    }

    /// Wait (bounded) for the source dimensions and fix the sample geometry.
    #[instrument(skip(self), fields(source = %self.stream.descriptor().display_name))]
    pub async fn prepare(&mut self) -> Dimensions {
        let source = wait_for_dimensions(self.stream.as_mut(), self.config.ready_timeout).await;
        let target = sample_dimensions(source, self.config.max_edge);

        self.source = Some(source);
        self.target = Some(target);

        info!(source = %source, target = %target, "Frame sampler prepared");

        target
    }

    /// Wait for the next tick, then grab and downscale a frame.
    ///
    /// The first call returns immediately after preparation. Ticks missed
    /// while the caller was busy are skipped, never bursted.
    pub async fn next_sample(&mut self) -> CoreResult<FrameSample> {
        if self.target.is_none() {
            self.prepare().await;
        }

        let interval = self.config.interval;
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });
        ticker.tick().await;

        self.sample_now().await
    }

    /// Grab and downscale a frame without waiting for the cadence.
    pub async fn sample_now(&mut self) -> CoreResult<FrameSample> {
        let frame = self.stream.grab_frame().await?;
        let captured_at = Instant::now();

        let dims = frame.dimensions();
        let target = match (self.source, self.target) {
            (Some(source), Some(target)) if source == dims => target,
            _ => {
                let target = sample_dimensions(dims, self.config.max_edge);
                debug!(source = %dims, target = %target, "Source size changed, resampling geometry");
                self.source = Some(dims);
                self.target = Some(target);
                target
            }
        };

        let pixels = tokio::task::spawn_blocking(move || resize_rgba(frame, target))
            .await
            .map_err(|e| CaptureError::WorkerFailed {
                reason: format!("frame resize task failed: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })??;

        Ok(FrameSample {
            pixels,
            width: target.width,
            height: target.height,
            captured_at,
        })
    }

    /// Swap in a new stream, releasing the current one.
    #[instrument(skip(self, stream))]
    pub async fn restart(&mut self, stream: Box<dyn LiveStream>) {
        self.stream.stop().await;
        self.stream = stream;
        self.source = None;
        self.target = None;
        self.ticker = None;
        debug!(source = %self.stream.descriptor().display_name, "Frame sampler restarted");
    }

    /// Stop the stream and drop the sampler.
    #[instrument(skip(self), fields(source = %self.stream.descriptor().display_name))]
    pub async fn release(mut self) {
        self.stream.stop().await;
        debug!("Frame sampler released");
    }
}
