use crate::{AppError, AppResult};

use std::{
    collections::HashSet,
    panic::Location,
    path::{Path, PathBuf},
    process::Stdio,
};

use error_location::ErrorLocation;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Located ffmpeg binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Ffmpeg {
    /// Use the configured binary, or `ffmpeg` from `PATH`.
    pub fn locate(configured: Option<&Path>) -> Self {
        let program = configured
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" }));
        debug!(program = %program.display(), "Using ffmpeg");
        Self { program }
    }

    /// Path of the binary.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// A quiet ffmpeg command, killed when dropped.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-hide_banner", "-nostats", "-loglevel", "error"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Names of the video encoders this build provides.
    #[instrument(skip(self), fields(program = %self.program.display()))]
    pub async fn video_encoders(&self) -> AppResult<HashSet<String>> {
        let output = self
            .command()
            .arg("-encoders")
            .stdout(Stdio::piped())
            .output()
            .await
            .map_err(|e| AppError::FfmpegUnavailable {
                program: self.program.display().to_string(),
                reason: e.to_string(),
                location: ErrorLocation::from(Location::caller()),
            })?;

        let encoders = parse_encoder_list(&String::from_utf8_lossy(&output.stdout));
        info!(count = encoders.len(), "Probed ffmpeg video encoders");

        Ok(encoders)
    }
}

/// Parse `ffmpeg -encoders` output into the set of video encoder names.
pub fn parse_encoder_list(output: &str) -> HashSet<String> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("------"))
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let flags = fields.next()?;
            let name = fields.next()?;
            flags.starts_with('V').then(|| name.to_string())
        })
        .collect()
}
