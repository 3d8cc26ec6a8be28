//! Configuration management for pull-recorder.
//!
//! Handles loading and saving TOML configuration files with cross-platform
//! paths, validation on load, and atomic write operations.

use crate::{
    AppError, AppResult,
    config::{CaptureConfig, DetectionConfig, RecordingConfig, ServerConfig},
};

use std::{
    fs,
    io::Write,
    panic::Location,
    path::{Path, PathBuf},
    time::Duration,
};

use directories::ProjectDirs;
use error_location::ErrorLocation;
use pull_recorder_core::{
    ControllerConfig,
    capture::{Dimensions, SourceResolver},
    controller::DetectionConfig as CoreDetectionConfig,
    inference::Thresholds,
    recording::FinalizerConfig,
    sampler::{READY_TIMEOUT, SamplerConfig},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Main configuration struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture source settings.
    pub capture: CaptureConfig,
    /// Automatic detection settings.
    pub detection: DetectionConfig,
    /// Recording output settings.
    pub recording: RecordingConfig,
    /// Embedded web server settings.
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from the platform config directory, creating a
    /// default file if none exists.
    #[track_caller]
    #[instrument]
    pub fn load() -> AppResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            info!("No config found, creating default");
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    /// Load and validate configuration from a specific file.
    #[track_caller]
    pub fn load_from(path: &Path) -> AppResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to read config: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let config = Self::from_toml(&contents)?;
        info!(config_path = ?path, "Configuration loaded");

        Ok(config)
    }

    /// Parse and validate a TOML document.
    #[track_caller]
    pub fn from_toml(contents: &str) -> AppResult<Self> {
        let config: Config = toml::from_str(contents).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to parse config: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Reject values the capture pipeline cannot run with.
    #[track_caller]
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |reason: String| AppError::ConfigError {
            reason,
            location: ErrorLocation::from(Location::caller()),
        };

        let d = &self.detection;
        if !d.start_threshold.is_finite() || !d.end_threshold.is_finite() {
            return Err(invalid("detection thresholds must be finite".to_string()));
        }
        if d.sample_interval_ms == 0 || d.retry_delay_ms == 0 {
            return Err(invalid(
                "detection intervals must be greater than zero".to_string(),
            ));
        }
        if d.max_sample_edge < 2 || d.model_width == 0 || d.model_height == 0 {
            return Err(invalid(format!(
                "invalid detection geometry: max_sample_edge={}, model={}x{}",
                d.max_sample_edge, d.model_width, d.model_height
            )));
        }
        if d.detector_command.as_ref().is_some_and(|cmd| cmd.is_empty()) {
            return Err(invalid("detector_command must name a program".to_string()));
        }

        if self.capture.tiers.is_empty() {
            return Err(invalid("capture tiers must not be empty".to_string()));
        }
        if self.capture.capture_fps == 0 {
            return Err(invalid("capture_fps must be greater than zero".to_string()));
        }

        let r = &self.recording;
        if r.chunk_interval_ms == 0 || r.flush_timeout_ms == 0 {
            return Err(invalid(
                "recording intervals must be greater than zero".to_string(),
            ));
        }
        if !r.bits_per_pixel.is_finite() || r.bits_per_pixel <= 0.0 {
            return Err(invalid("bits_per_pixel must be positive".to_string()));
        }

        Ok(())
    }

    /// Save configuration to the platform config directory.
    #[track_caller]
    #[instrument(skip(self))]
    pub fn save(&self) -> AppResult<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration using atomic write pattern.
    ///
    /// Writes to a temporary file first, then renames to prevent corruption
    /// if the process crashes during the write.
    #[track_caller]
    pub fn save_to(&self, config_path: &Path) -> AppResult<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let temp_path = config_path.with_extension("toml.tmp");

        let mut temp_file = fs::File::create(&temp_path).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to create temp config file: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        temp_file
            .write_all(contents.as_bytes())
            .map_err(|e| AppError::ConfigError {
                reason: format!("Failed to write temp config file: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        temp_file.sync_all().map_err(|e| AppError::ConfigError {
            reason: format!("Failed to sync temp config file: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        fs::rename(&temp_path, config_path).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to rename temp config to final: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        info!(config_path = ?config_path, "Configuration saved (atomic write)");

        Ok(())
    }

    /// Get the web server URL for opening in browser.
    pub fn server_url(&self) -> String {
        format!("http://localhost:{}", self.server.port)
    }

    /// Recordings directory, falling back to the data directory.
    #[track_caller]
    pub fn recordings_dir(&self) -> AppResult<PathBuf> {
        match &self.recording.output_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::data_dir()?.join("recordings")),
        }
    }

    /// Whether automatic detection should run.
    pub fn detection_active(&self) -> bool {
        self.detection.enabled && self.detection.detector_command.is_some()
    }

    /// Controller tuning derived from this configuration.
    pub fn controller_config(&self) -> ControllerConfig {
        let d = &self.detection;
        let r = &self.recording;

        ControllerConfig {
            resolver: SourceResolver::new(
                self.capture.tiers.clone(),
                self.capture.window_pattern.clone(),
            ),
            detection: CoreDetectionConfig {
                sampler: SamplerConfig {
                    interval: Duration::from_millis(d.sample_interval_ms),
                    max_edge: d.max_sample_edge,
                    ready_timeout: READY_TIMEOUT,
                },
                retry_delay: Duration::from_millis(d.retry_delay_ms),
            },
            thresholds: Thresholds {
                start: d.start_threshold,
                end: d.end_threshold,
            },
            model_input: Dimensions::new(d.model_width, d.model_height),
            finalizer: FinalizerConfig {
                chunk_interval: Duration::from_millis(r.chunk_interval_ms),
                flush_timeout: Duration::from_millis(r.flush_timeout_ms),
                ready_timeout: READY_TIMEOUT,
                bits_per_pixel: r.bits_per_pixel,
                content_hint: r.content_hint,
            },
        }
    }

    /// Platform data directory, home of logs and default recordings.
    #[track_caller]
    pub fn data_dir() -> AppResult<PathBuf> {
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    #[track_caller]
    fn project_dirs() -> AppResult<ProjectDirs> {
        ProjectDirs::from("com", "pull-recorder", "Pull-Recorder").ok_or_else(|| {
            AppError::ConfigError {
                reason: "Failed to get project directories".to_string(),
                location: ErrorLocation::from(Location::caller()),
            }
        })
    }

    #[track_caller]
    fn config_path() -> AppResult<PathBuf> {
        let proj_dirs = Self::project_dirs()?;
        let config_dir = proj_dirs.config_dir();

        if !config_dir.exists() {
            fs::create_dir_all(config_dir)?;
            debug!(config_dir = ?config_dir, "Created config directory");
        }

        Ok(config_dir.join("config.toml"))
    }
}
