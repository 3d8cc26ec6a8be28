mod capture_config;
#[allow(clippy::module_inception)]
mod config;
mod detection_config;
mod recording_config;
mod server_config;

pub(crate) use {
    capture_config::CaptureConfig, config::Config, detection_config::DetectionConfig,
    recording_config::RecordingConfig, server_config::ServerConfig,
};

pub(crate) const DEFAULT_PORT: u16 = 7878;
pub(crate) const DEFAULT_CAPTURE_FPS: u32 = 30;
pub(crate) const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1000;
pub(crate) const DEFAULT_RETRY_DELAY_MS: u64 = 5000;
pub(crate) const DEFAULT_CHUNK_INTERVAL_MS: u64 = 500;
pub(crate) const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 3000;

pub(crate) fn default_port() -> u16 {
    DEFAULT_PORT
}
