use crate::{CaptureError, CoreResult};

use std::panic::Location;

use async_trait::async_trait;
use error_location::ErrorLocation;

/// Number of elements in a score tensor.
pub const SCORE_TENSOR_LEN: usize = 2;

/// Index of the start score in a score tensor.
pub const START_SCORE_INDEX: usize = 0;

/// Index of the end score in a score tensor.
pub const END_SCORE_INDEX: usize = 1;

/// Normalized planar RGB input, shape `[1, 3, H, W]`.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    /// Channel-major float data, `3 * H * W` values.
    pub data: Vec<f32>,
    /// Tensor shape, always `[1, 3, height, width]`.
    pub shape: [usize; 4],
}

impl InputTensor {
    /// Tensor height.
    pub fn height(&self) -> usize {
        self.shape[2]
    }

    /// Tensor width.
    pub fn width(&self) -> usize {
        self.shape[3]
    }
}

/// Raw detector output.
///
/// Layout: `[start_score, end_score]`, nothing more.
#[derive(Debug, Clone, PartialEq)]
pub struct RawScores(pub Vec<f32>);

impl RawScores {
    /// Validate the layout and return `(start, end)`.
    #[track_caller]
    pub fn split(&self) -> CoreResult<(f32, f32)> {
        let scores = &self.0;

        if scores.len() != SCORE_TENSOR_LEN || scores.iter().any(|s| !s.is_finite()) {
            return Err(CaptureError::MalformedOutput {
                expected: SCORE_TENSOR_LEN,
                actual: scores.clone(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok((scores[START_SCORE_INDEX], scores[END_SCORE_INDEX]))
    }
}

/// Pull start/end detector. Possibly slow, possibly failing, otherwise pure.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Score one input tensor.
    async fn infer(&self, input: &InputTensor) -> CoreResult<RawScores>;
}
