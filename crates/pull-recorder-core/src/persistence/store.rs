use crate::{
    CaptureError, CoreResult,
    persistence::{CatalogEntry, display_name, is_video_extension, recording_file_name},
};

use std::{
    panic::Location,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{Local, NaiveDateTime};
use error_location::ErrorLocation;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Highest collision suffix tried before giving up.
const MAX_COLLISION_SUFFIX: u32 = 999;

/// Where a recording was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRecording {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// File name within the recordings directory.
    pub filename: String,
}

/// Storage for finished recordings.
#[async_trait]
pub trait PersistenceService: Send + Sync {
    /// Store `bytes` under a name derived from `suggested_name`.
    async fn save(
        &self,
        bytes: &[u8],
        suggested_name: &str,
        extension: &str,
    ) -> CoreResult<SavedRecording>;

    /// Stored recordings, most recent first.
    async fn list(&self) -> CoreResult<Vec<CatalogEntry>>;

    /// A `data:` URI for a stored recording, for players that cannot load
    /// local file URLs.
    async fn read_as_portable_uri(&self, path: &Path) -> CoreResult<String>;
}

/// `data:<mime>;base64,<payload>`. Codec parameters are dropped from the
/// MIME type since they would break the URI syntax.
pub fn data_uri(mime_type: &str, bytes: &[u8]) -> String {
    let essence = mime_type.split(';').next().unwrap_or(mime_type).trim();
    format!("data:{};base64,{}", essence, STANDARD.encode(bytes))
}

/// MIME type for a recording file extension.
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "mkv" => "video/x-matroska",
        "mp4" => "video/mp4",
        _ => "video/webm",
    }
}

/// Recordings stored as plain files in one directory.
#[derive(Debug, Clone)]
pub struct FsRecordingStore {
    dir: PathBuf,
}

impl FsRecordingStore {
    /// Store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Recordings directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save with an explicit timestamp for the file name.
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub async fn save_at(
        &self,
        bytes: &[u8],
        suggested_name: &str,
        extension: &str,
        at: NaiveDateTime,
    ) -> CoreResult<SavedRecording> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            CaptureError::PersistenceFailed {
                reason: format!("cannot create {}: {}", self.dir.display(), e),
                location: ErrorLocation::from(Location::caller()),
            }
        })?;

        let base = recording_file_name(at, suggested_name, extension);
        let path = self.unique_path(&base).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(base);

        let tmp = self.dir.join(format!(".{}.tmp", filename));
        let written = async {
            tokio::fs::write(&tmp, bytes).await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                debug!(error = %cleanup, "Temp file cleanup failed");
            }
            return Err(CaptureError::PersistenceFailed {
                reason: format!("cannot write {}: {}", path.display(), e),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        info!(path = %path.display(), "Recording saved");

        Ok(SavedRecording { path, filename })
    }

    async fn unique_path(&self, file_name: &str) -> CoreResult<PathBuf> {
        let candidate = self.dir.join(file_name);
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }

        let (stem, ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) => (stem, Some(ext)),
            None => (file_name, None),
        };

        for n in 1..=MAX_COLLISION_SUFFIX {
            let name = match ext {
                Some(ext) => format!("{}_{}.{}", stem, n, ext),
                None => format!("{}_{}", stem, n),
            };
            let candidate = self.dir.join(name);
            if !tokio::fs::try_exists(&candidate).await? {
                return Ok(candidate);
            }
        }

        Err(CaptureError::PersistenceFailed {
            reason: format!("too many recordings named {}", file_name),
            location: ErrorLocation::from(Location::caller()),
        })
    }

    /// Resolve a catalog id to a path inside the recordings directory.
    ///
    /// Rejects ids that would escape the directory.
    pub fn path_for_id(&self, id: &str) -> Option<PathBuf> {
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && !id.contains(['/', '\\'])
            && id != "..";
        valid.then(|| self.dir.join(id))
    }
}

#[async_trait]
impl PersistenceService for FsRecordingStore {
    async fn save(
        &self,
        bytes: &[u8],
        suggested_name: &str,
        extension: &str,
    ) -> CoreResult<SavedRecording> {
        self.save_at(bytes, suggested_name, extension, Local::now().naive_local())
            .await
    }

    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    async fn list(&self) -> CoreResult<Vec<CatalogEntry>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let is_video = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(is_video_extension);
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !is_video || file_name.starts_with('.') {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable recording");
                    continue;
                }
            };

            let mtime_ms = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_millis() as i64);
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            entries.push(CatalogEntry {
                id: file_name,
                name: display_name(&stem),
                path,
                mtime_ms,
                size_bytes: metadata.len(),
            });
        }

        entries.sort_by(|a, b| b.mtime_ms.cmp(&a.mtime_ms).then_with(|| b.id.cmp(&a.id)));
        debug!(count = entries.len(), "Listed recordings");

        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn read_as_portable_uri(&self, path: &Path) -> CoreResult<String> {
        let location = ErrorLocation::from(Location::caller());
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| CaptureError::PersistenceFailed {
                reason: format!("cannot read {}: {}", path.display(), e),
                location,
            })?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("webm");
        Ok(data_uri(mime_for_extension(extension), &bytes))
    }
}
