//! Desktop implementations of the capture, encoding and detection seams.

mod capture;
mod detector;
mod encoder;
mod ffmpeg;
mod pam;

pub use {
    capture::{CaptureBackend, FfmpegCaptureProvider},
    detector::{CommandInferenceEngine, decode_response, encode_request},
    encoder::{FfmpegEncoderFactory, VideoCodec, encoder_args},
    ffmpeg::{Ffmpeg, parse_encoder_list},
    pam::{PamHeader, parse_pam_header, read_pam_frame},
};
