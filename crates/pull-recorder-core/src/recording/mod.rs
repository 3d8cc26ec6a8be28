mod encoder;
mod finalizer;
mod policy;
mod session;

pub use {
    encoder::{Encoder, EncoderFactory, negotiate_encoder},
    finalizer::{
        DEFAULT_CHUNK_INTERVAL, DEFAULT_FLUSH_TIMEOUT, FinalizedRecording, FinalizerConfig,
        PlaybackSource, SessionFinalizer, SessionHandle, SourceLost,
    },
    policy::{
        CODEC_CANDIDATES, ContentHint, DEFAULT_BITS_PER_PIXEL, EncoderSettings, MAX_BITRATE,
        MAX_FRAME_RATE, MIN_BITRATE, MIN_FRAME_RATE, select_frame_rate, target_bitrate,
    },
    session::{RecordingSession, SessionId, SessionStatus, TriggerOrigin, default_session_name},
};
