mod engine;
mod gate;
mod signal;
mod tensor;

pub use {
    engine::{
        END_SCORE_INDEX, InferenceEngine, InputTensor, RawScores, SCORE_TENSOR_LEN,
        START_SCORE_INDEX,
    },
    gate::{
        DropReason, GateStats, InferenceGate, InferenceOutcome, PendingInference, SampledSignal,
        Submission,
    },
    signal::{DEFAULT_END_THRESHOLD, DEFAULT_START_THRESHOLD, InferenceSignal, Thresholds},
    tensor::{IMAGENET_MEAN, IMAGENET_STD, MODEL_INPUT, preprocess},
};
