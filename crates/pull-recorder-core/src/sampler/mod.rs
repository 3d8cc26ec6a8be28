mod frame;
#[allow(clippy::module_inception)]
mod sampler;

pub use {
    frame::{
        DEFAULT_MAX_SAMPLE_EDGE, FALLBACK_DIMENSIONS, FrameSample, MIN_SAMPLE_SIDE,
        sample_dimensions,
    },
    sampler::{
        DEFAULT_SAMPLE_INTERVAL, FrameSampler, READY_TIMEOUT, SamplerConfig, wait_for_dimensions,
    },
};

pub(crate) use frame::resize_rgba;
