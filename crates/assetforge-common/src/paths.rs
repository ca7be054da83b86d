//! Path utilities for classifying uploads by extension.
//!
//! The classification decides which assets are handed to the compression
//! pipeline, so it is shared by the ingest service and the CLI.

use std::path::Path;

use crate::FileKind;

/// Supported image file extensions.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg"];

/// Supported video file extensions.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "avi", "mkv"];

/// Supported audio file extensions.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac"];

/// Document file extensions.
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "txt", "xls", "xlsx"];

/// Source code and structured text extensions.
const CODE_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "tsx", "json", "go", "yaml", "yml", "css", "html", "md",
];

/// Return the lowercase extension of `path` including the leading dot,
/// or an empty string when there is none.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use assetforge_common::paths::dotted_extension;
///
/// assert_eq!(dotted_extension(Path::new("Photo.JPG")), ".jpg");
/// assert_eq!(dotted_extension(Path::new("README")), "");
/// ```
#[must_use]
pub fn dotted_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// Classify a file by its extension (case insensitive).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use assetforge_common::{paths::file_kind_for, FileKind};
///
/// assert_eq!(file_kind_for(Path::new("clip.MOV")), FileKind::Video);
/// assert_eq!(file_kind_for(Path::new("notes.txt")), FileKind::Document);
/// assert_eq!(file_kind_for(Path::new("archive.zip")), FileKind::Other);
/// ```
#[must_use]
pub fn file_kind_for(path: &Path) -> FileKind {
    let Some(ext) = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
    else {
        return FileKind::Other;
    };
    let ext = ext.as_str();

    if IMAGE_EXTENSIONS.contains(&ext) {
        FileKind::Image
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        FileKind::Video
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        FileKind::Audio
    } else if DOCUMENT_EXTENSIONS.contains(&ext) {
        FileKind::Document
    } else if CODE_EXTENSIONS.contains(&ext) {
        FileKind::Code
    } else {
        FileKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_images() {
        assert_eq!(file_kind_for(Path::new("a.jpg")), FileKind::Image);
        assert_eq!(file_kind_for(Path::new("a.JPEG")), FileKind::Image);
        assert_eq!(file_kind_for(Path::new("/srv/cdn/a.webp")), FileKind::Image);
        assert_eq!(file_kind_for(Path::new("logo.svg")), FileKind::Image);
    }

    #[test]
    fn test_videos() {
        assert_eq!(file_kind_for(Path::new("movie.mp4")), FileKind::Video);
        assert_eq!(file_kind_for(Path::new("movie.MKV")), FileKind::Video);
        assert_eq!(file_kind_for(Path::new("movie.webm")), FileKind::Video);
    }

    #[test]
    fn test_audio_documents_code() {
        assert_eq!(file_kind_for(Path::new("song.flac")), FileKind::Audio);
        assert_eq!(file_kind_for(Path::new("report.xlsx")), FileKind::Document);
        assert_eq!(file_kind_for(Path::new("main.go")), FileKind::Code);
        assert_eq!(file_kind_for(Path::new("config.yml")), FileKind::Code);
    }

    #[test]
    fn test_other() {
        assert_eq!(file_kind_for(Path::new("archive.tar.gz")), FileKind::Other);
        assert_eq!(file_kind_for(Path::new("no_extension")), FileKind::Other);
    }

    #[test]
    fn test_dotted_extension() {
        assert_eq!(dotted_extension(Path::new("a/b/c.PNG")), ".png");
        assert_eq!(dotted_extension(Path::new("archive.tar.gz")), ".gz");
        assert_eq!(dotted_extension(Path::new("Makefile")), "");
    }
}
