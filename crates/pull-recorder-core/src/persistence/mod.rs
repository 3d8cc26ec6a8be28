mod catalog;
mod naming;
mod store;

pub use {
    catalog::{CatalogEntry, CatalogItem, merge_catalog},
    naming::{
        DEFAULT_RECORDING_NAME, MAX_NAME_LEN, VIDEO_EXTENSIONS, display_name, is_video_extension,
        recording_file_name, sanitize_name,
    },
    store::{FsRecordingStore, PersistenceService, SavedRecording, data_uri, mime_for_extension},
};
