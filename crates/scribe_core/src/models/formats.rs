//! Supported input formats.

use std::path::Path;

/// Audio container/codec extensions accepted as input.
pub const AUDIO_FORMATS: &[&str] = &[
    "mp3", "wav", "ogg", "m4a", "flac", "aac", "wma", "aiff", "alac", "opus", "amr", "3gp", "aax",
    "act", "aa", "ape", "dss", "dvf", "gsm", "iklax", "ivs", "m4b", "m4p", "mmf", "mpc", "msv",
    "nmf", "nsf", "ra", "raw", "sln", "tta", "voc", "vox", "wave", "wv",
];

/// Video container extensions accepted as input.
pub const VIDEO_FORMATS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "webm", "mpeg", "mpg", "wmv", "flv", "3gp", "3g2", "m4v", "f4v",
    "f4p", "f4a", "f4b", "mts", "m2ts", "ts", "vob", "ogv", "mxf", "roq", "nsv", "rm", "rmvb",
    "asf", "amv", "m2v", "svi", "viv", "divx",
];

/// Extensions that are probed as video before any stream inspection.
///
/// `3gp` appears in both tables; it is treated as audio unless the probe
/// finds a video stream.
const VIDEO_FIRST: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "webm", "flv", "wmv", "m4v", "mpg", "mpeg",
];

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

/// Check whether a file name has a supported audio or video extension.
pub fn is_supported(file_name: &str) -> bool {
    let Some(ext) = extension(Path::new(file_name)) else {
        return false;
    };
    AUDIO_FORMATS.contains(&ext.as_str()) || VIDEO_FORMATS.contains(&ext.as_str())
}

/// Check whether the extension marks a video container.
pub fn is_video_path(path: &Path) -> bool {
    let Some(ext) = extension(path) else {
        return false;
    };
    let ext = ext.as_str();
    VIDEO_FIRST.contains(&ext) || (VIDEO_FORMATS.contains(&ext) && !AUDIO_FORMATS.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_extensions_case_insensitively() {
        assert!(is_supported("meeting.M4A"));
        assert!(is_supported("lecture.mkv"));
        assert!(is_supported("voice.opus"));
    }

    #[test]
    fn rejects_unknown_or_missing_extensions() {
        assert!(!is_supported("notes.txt"));
        assert!(!is_supported("README"));
        assert!(!is_supported(""));
    }

    #[test]
    fn ambiguous_extension_is_audio_first() {
        assert!(!is_video_path(Path::new("clip.3gp")));
        assert!(is_video_path(Path::new("clip.m2ts")));
    }
}
