//! Media handles produced by each pipeline stage.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::formats;

/// Bytes per mebibyte. All "MB" sizes in settings and logs use this unit.
pub const MIB: u64 = 1024 * 1024;

/// Detected kind of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Audio,
    Video,
}

impl MediaKind {
    /// Guess the kind from the file extension.
    ///
    /// Unknown extensions are treated as audio; the probe refines this
    /// when the container reports a video stream.
    pub fn from_path(path: &Path) -> Self {
        if formats::is_video_path(path) {
            MediaKind::Video
        } else {
            MediaKind::Audio
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Reference to a media file on local storage.
///
/// Handles are never mutated. Each stage that transforms a file produces
/// a new handle pointing at a new path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaHandle {
    /// Path to the file.
    pub path: PathBuf,
    /// Size on disk in bytes.
    pub size_bytes: u64,
    /// Duration in whole seconds (at least 1 once probed).
    ///
    /// This is an estimate; the probe falls back to a default when the
    /// tools cannot tell.
    pub duration_secs: u64,
    /// Audio or video.
    pub kind: MediaKind,
}

impl MediaHandle {
    /// Create a handle from already-known attributes.
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64, duration_secs: u64, kind: MediaKind) -> Self {
        Self {
            path: path.into(),
            size_bytes,
            duration_secs: duration_secs.max(1),
            kind,
        }
    }

    /// Size in mebibytes.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / MIB as f64
    }

    /// File name for logging and multipart uploads.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string())
    }

    /// Whether the handle satisfies both a byte and a duration ceiling.
    pub fn fits(&self, max_bytes: u64, max_duration_secs: u64) -> bool {
        self.size_bytes <= max_bytes && self.duration_secs <= max_duration_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_extension() {
        assert_eq!(MediaKind::from_path(Path::new("talk.MP4")), MediaKind::Video);
        assert_eq!(MediaKind::from_path(Path::new("talk.m4a")), MediaKind::Audio);
        assert_eq!(MediaKind::from_path(Path::new("no_extension")), MediaKind::Audio);
    }

    #[test]
    fn duration_is_at_least_one_second() {
        let handle = MediaHandle::new("/tmp/a.wav", 10, 0, MediaKind::Audio);
        assert_eq!(handle.duration_secs, 1);
    }

    #[test]
    fn fits_checks_both_ceilings() {
        let handle = MediaHandle::new("/tmp/a.wav", 5 * MIB, 300, MediaKind::Audio);
        assert!(handle.fits(5 * MIB, 300));
        assert!(!handle.fits(5 * MIB - 1, 300));
        assert!(!handle.fits(5 * MIB, 299));
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_string(&MediaKind::Video).unwrap();
        assert_eq!(json, "\"video\"");
    }
}
