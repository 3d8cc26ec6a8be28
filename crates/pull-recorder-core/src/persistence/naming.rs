use chrono::NaiveDateTime;

/// Name used when sanitizing leaves nothing.
pub const DEFAULT_RECORDING_NAME: &str = "Pull";

/// Longest sanitized name, in characters.
pub const MAX_NAME_LEN: usize = 80;

/// File extensions listed in the catalog.
pub const VIDEO_EXTENSIONS: [&str; 3] = ["webm", "mkv", "mp4"];

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Keep `[A-Za-z0-9-_. ]`, then collapse runs of spaces, trim and cap at
/// [`MAX_NAME_LEN`]. Tabs and newlines are dropped with the other
/// disallowed characters. Empty results become [`DEFAULT_RECORDING_NAME`].
pub fn sanitize_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '))
        .collect();

    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_NAME_LEN).collect();
    let trimmed = truncated.trim();

    if trimmed.is_empty() {
        DEFAULT_RECORDING_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `YYYYMMDD_HHMMSS_<sanitized>.<ext>`.
pub fn recording_file_name(at: NaiveDateTime, name: &str, extension: &str) -> String {
    format!(
        "{}_{}.{}",
        at.format(TIMESTAMP_FORMAT),
        sanitize_name(name),
        extension.trim_start_matches('.')
    )
}

/// Display name for a stored file: the stem without its timestamp prefix.
pub fn display_name(file_stem: &str) -> String {
    let mut parts = file_stem.splitn(3, '_');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(date), Some(time), Some(rest))
            if is_digits(date, 8) && is_digits(time, 6) && !rest.is_empty() =>
        {
            rest.to_string()
        }
        _ => file_stem.to_string(),
    }
}

/// True when `extension` is one of [`VIDEO_EXTENSIONS`], ignoring case.
pub fn is_video_extension(extension: &str) -> bool {
    VIDEO_EXTENSIONS
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(extension))
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}
