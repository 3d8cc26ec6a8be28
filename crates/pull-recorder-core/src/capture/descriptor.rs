use std::fmt;

use serde::{Deserialize, Serialize};

/// How a capture source was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A window of the target application, matched by title.
    Window,
    /// A whole desktop or monitor.
    Screen,
    /// A source the user chose in an interactive picker.
    UserPicked,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Window => f.write_str("window"),
            SourceKind::Screen => f.write_str("screen"),
            SourceKind::UserPicked => f.write_str("user-picked"),
        }
    }
}

/// Provider-issued reference to a selectable live video source.
///
/// Valid for a single capture attempt; the resolver never caches one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSourceDescriptor {
    /// Opaque provider identifier.
    pub id: String,
    /// Which tier produced the source.
    pub kind: SourceKind,
    /// Human-readable name, e.g. the window title.
    pub display_name: String,
}

impl CaptureSourceDescriptor {
    /// Build a descriptor.
    pub fn new(id: impl Into<String>, kind: SourceKind, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            display_name: display_name.into(),
        }
    }
}

/// Pixel dimensions of a frame or source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Build dimensions.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when both sides are non-zero.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Number of bytes in an RGBA buffer of this size.
    pub fn rgba_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A full-resolution RGBA frame as delivered by a live stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Tightly packed RGBA bytes, row-major.
    pub rgba: Vec<u8>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

impl RawFrame {
    /// Frame dimensions.
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}
