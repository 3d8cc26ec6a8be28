mod descriptor;
mod provider;
mod resolver;

pub use {
    descriptor::{CaptureSourceDescriptor, Dimensions, RawFrame, SourceKind},
    provider::{CaptureSourceProvider, LiveStream, PickerOptions},
    resolver::{DEFAULT_WINDOW_PATTERN, ResolvedSource, SourceResolver, SourceTier},
};
