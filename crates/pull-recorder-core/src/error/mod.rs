use error_location::ErrorLocation;
use thiserror::Error;

/// Capture pipeline errors with source location tracking.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Every capture source tier failed.
    #[error("No capture source available (tried: {tried}) {location}")]
    NoSourceAvailable {
        /// Comma-separated list of the tiers that were attempted.
        tried: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// A single capture source tier could not produce a source.
    #[error("Capture source unavailable: {reason} {location}")]
    SourceUnavailable {
        /// Description of why the tier failed.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// The live stream ended while it was still in use.
    #[error("Capture source lost: {reason} {location}")]
    SourceLost {
        /// Description of how the stream ended.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// A frame buffer did not match its declared dimensions.
    #[error("Invalid frame: {reason} {location}")]
    InvalidFrame {
        /// Description of the mismatch.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// No encoder configuration could be initialized.
    #[error("Encoder initialization failed: {reason} {location}")]
    EncoderInitFailed {
        /// Description of the last initialization failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// The encoder failed while accepting frames or finalizing.
    #[error("Encoder error: {reason} {location}")]
    EncoderFailed {
        /// Description of the encoder failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// The inference engine returned an error.
    #[error("Inference failed: {reason} {location}")]
    InferenceFailed {
        /// Description of the engine failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// The inference engine returned a score tensor with an unexpected layout.
    #[error("Malformed inference output: expected {expected} finite scores, got {actual:?} {location}")]
    MalformedOutput {
        /// Number of scores the layout requires.
        expected: usize,
        /// The scores actually returned.
        actual: Vec<f32>,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// The persistence service could not store or read a recording.
    #[error("Persistence failed: {reason} {location}")]
    PersistenceFailed {
        /// Description of the persistence failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// The controller task is no longer running.
    #[error("Capture controller unavailable: {reason} {location}")]
    ControllerUnavailable {
        /// Description of why the controller could not be reached.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// A blocking worker task panicked or was cancelled.
    #[error("Worker task failed: {reason} {location}")]
    WorkerFailed {
        /// Description of the join failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// IO error from filesystem or process operations.
    #[error("IO error: {source} {location}")]
    Io {
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
        /// Source location where error occurred.
        location: ErrorLocation,
    },
}

impl From<std::io::Error> for CaptureError {
    #[track_caller]
    fn from(source: std::io::Error) -> Self {
        CaptureError::Io {
            source,
            location: ErrorLocation::from(std::panic::Location::caller()),
        }
    }
}

/// Result type alias using [`CaptureError`].
pub type Result<T> = std::result::Result<T, CaptureError>;
