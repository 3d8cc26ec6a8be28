use crate::{
    CaptureError, CoreResult,
    capture::{CaptureSourceDescriptor, CaptureSourceProvider, LiveStream, PickerOptions},
};

use std::{fmt, panic::Location};

use error_location::ErrorLocation;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Default title pattern for the target application's window.
pub const DEFAULT_WINDOW_PATTERN: &str = "FINAL FANTASY XIV";

/// Picker attempts in order: audio-inclusive first, then video-only.
const PICKER_ATTEMPTS: [PickerOptions; 2] = [
    PickerOptions {
        video: true,
        audio: true,
    },
    PickerOptions {
        video: true,
        audio: false,
    },
];

/// One step of the capture source fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    /// Named-application window matcher.
    Window,
    /// Generic desktop/screen source.
    Screen,
    /// Interactive user-driven picker.
    Picker,
}

impl SourceTier {
    /// The full chain in its default order.
    pub const DEFAULT_ORDER: [SourceTier; 3] =
        [SourceTier::Window, SourceTier::Screen, SourceTier::Picker];
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceTier::Window => f.write_str("window"),
            SourceTier::Screen => f.write_str("screen"),
            SourceTier::Picker => f.write_str("picker"),
        }
    }
}

/// Outcome of a successful resolve.
///
/// The picker tier hands back an already-open stream; the other tiers only
/// produce a descriptor that is opened on [`ResolvedSource::acquire`].
pub struct ResolvedSource {
    descriptor: CaptureSourceDescriptor,
    stream: Option<Box<dyn LiveStream>>,
}

impl ResolvedSource {
    /// Wrap a descriptor that still has to be opened.
    pub fn from_descriptor(descriptor: CaptureSourceDescriptor) -> Self {
        Self {
            descriptor,
            stream: None,
        }
    }

    /// Wrap a stream that is already open.
    pub fn from_stream(stream: Box<dyn LiveStream>) -> Self {
        Self {
            descriptor: stream.descriptor().clone(),
            stream: Some(stream),
        }
    }

    /// The resolved source descriptor.
    pub fn descriptor(&self) -> &CaptureSourceDescriptor {
        &self.descriptor
    }

    /// Turn the resolved source into a live stream.
    #[instrument(skip(self, provider), fields(source = %self.descriptor.display_name))]
    pub async fn acquire(self, provider: &dyn CaptureSourceProvider) -> CoreResult<Box<dyn LiveStream>> {
        match self.stream {
            Some(stream) => Ok(stream),
            None => provider.open(&self.descriptor).await,
        }
    }
}

impl fmt::Debug for ResolvedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSource")
            .field("descriptor", &self.descriptor)
            .field("preopened", &self.stream.is_some())
            .finish()
    }
}

/// Walks the capture tiers in order until one yields a source.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    tiers: Vec<SourceTier>,
    window_pattern: String,
}

impl SourceResolver {
    /// Create a resolver with an explicit tier order.
    pub fn new(tiers: Vec<SourceTier>, window_pattern: impl Into<String>) -> Self {
        Self {
            tiers,
            window_pattern: window_pattern.into(),
        }
    }

    /// The configured tier order.
    pub fn tiers(&self) -> &[SourceTier] {
        &self.tiers
    }

    /// Try each tier in order. Tier failures are logged and swallowed;
    /// only exhaustion of every tier is an error.
    #[instrument(skip(self, provider))]
    pub async fn resolve(&self, provider: &dyn CaptureSourceProvider) -> CoreResult<ResolvedSource> {
        let location = ErrorLocation::from(Location::caller());
        let mut tried = Vec::with_capacity(self.tiers.len());

        for &tier in &self.tiers {
            tried.push(tier.to_string());
            debug!(tier = %tier, "Trying capture tier");

            match tier {
                SourceTier::Window => match provider.select_window(&self.window_pattern).await {
                    Ok(descriptor) => return Ok(Self::resolved(tier, descriptor)),
                    Err(e) => warn!(tier = %tier, error = %e, "Capture tier failed"),
                },
                SourceTier::Screen => match provider.select_screen().await {
                    Ok(descriptor) => return Ok(Self::resolved(tier, descriptor)),
                    Err(e) => warn!(tier = %tier, error = %e, "Capture tier failed"),
                },
                SourceTier::Picker => {
                    for options in PICKER_ATTEMPTS {
                        match provider.open_picker(options).await {
                            Ok(stream) => {
                                let resolved = ResolvedSource::from_stream(stream);
                                info!(
                                    tier = %tier,
                                    audio = options.audio,
                                    source = %resolved.descriptor.display_name,
                                    "Capture source resolved"
                                );
                                return Ok(resolved);
                            }
                            Err(e) => warn!(
                                tier = %tier,
                                audio = options.audio,
                                error = %e,
                                "Capture tier failed"
                            ),
                        }
                    }
                }
            }
        }

        Err(CaptureError::NoSourceAvailable {
            tried: tried.join(", "),
            location,
        })
    }

    fn resolved(tier: SourceTier, descriptor: CaptureSourceDescriptor) -> ResolvedSource {
        info!(
            tier = %tier,
            source = %descriptor.display_name,
            kind = %descriptor.kind,
            "Capture source resolved"
        );
        ResolvedSource::from_descriptor(descriptor)
    }
}

impl Default for SourceResolver {
    fn default() -> Self {
        Self::new(SourceTier::DEFAULT_ORDER.to_vec(), DEFAULT_WINDOW_PATTERN)
    }
}
