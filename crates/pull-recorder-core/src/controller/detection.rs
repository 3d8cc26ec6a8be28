use crate::{
    capture::{CaptureSourceProvider, LiveStream, SourceResolver},
    inference::{InferenceGate, InferenceOutcome, SampledSignal, Submission},
    sampler::{FrameSample, FrameSampler, SamplerConfig},
};

use std::{sync::Arc, time::Duration};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, trace, warn};

/// Default pause before re-resolving a source after a failure.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Detection task tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionConfig {
    /// Sampler cadence and geometry.
    pub sampler: SamplerConfig,
    /// Pause before retrying source resolution.
    pub retry_delay: Duration,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Resolves a source, samples it and pushes samples through the gate,
/// forwarding signals to the controller. Runs until `shutdown` flips.
pub(crate) struct DetectionLoop {
    pub(crate) provider: Arc<dyn CaptureSourceProvider>,
    pub(crate) resolver: SourceResolver,
    pub(crate) gate: InferenceGate,
    pub(crate) config: DetectionConfig,
    pub(crate) signals: mpsc::Sender<SampledSignal>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl DetectionLoop {
    #[instrument(skip(self), name = "detection")]
    pub(crate) async fn run(mut self) {
        info!("Detection started");

        loop {
            let stream = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => break,
                stream = open_stream(self.provider.as_ref(), &self.resolver) => stream,
            };

            let Some(stream) = stream else {
                tokio::select! {
                    biased;
                    _ = wait_for_shutdown(&mut self.shutdown) => break,
                    _ = tokio::time::sleep(self.config.retry_delay) => continue,
                }
            };

            let mut sampler = FrameSampler::new(stream, self.config.sampler);
            let stopped = self.sample(&mut sampler).await;
            sampler.release().await;

            if stopped {
                break;
            }

            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => break,
                _ = tokio::time::sleep(self.config.retry_delay) => {}
            }
        }

        info!("Detection stopped");
    }

    /// Sample until the stream dies (false) or shutdown is requested (true).
    async fn sample(&mut self, sampler: &mut FrameSampler) -> bool {
        loop {
            let sample = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => return true,
                sample = sampler.next_sample() => sample,
            };

            match sample {
                Ok(sample) => self.submit(sample),
                Err(e) if !sampler.is_live() => {
                    warn!(error = %e, "Detection source lost");
                    return false;
                }
                Err(e) => debug!(error = %e, "Sample skipped"),
            }
        }
    }

    fn submit(&self, sample: FrameSample) {
        let pending = match self.gate.try_submit(sample) {
            Submission::Accepted(pending) => pending,
            Submission::Dropped => return,
        };

        let signals = self.signals.clone();
        tokio::spawn(async move {
            if let InferenceOutcome::Signal(signal) = pending.run().await {
                if let Err(e) = signals.try_send(signal) {
                    trace!(error = %e, "Signal not delivered");
                }
            }
        });
    }
}

async fn open_stream(
    provider: &dyn CaptureSourceProvider,
    resolver: &SourceResolver,
) -> Option<Box<dyn LiveStream>> {
    let resolved = match resolver.resolve(provider).await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(error = %e, "No source for detection, retrying later");
            return None;
        }
    };

    match resolved.acquire(provider).await {
        Ok(stream) => {
            info!(source = %stream.descriptor().display_name, "Detection source acquired");
            Some(stream)
        }
        Err(e) => {
            warn!(error = %e, "Failed to open detection source, retrying later");
            None
        }
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
