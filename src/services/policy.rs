//! Rendering policy applied by the service boundary, not by the stream itself.

use crate::error::{Result, StoreError};
use crate::models::FileRecord;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Must be checked before opening a stream for the image view.
pub fn ensure_renderable_image(record: &FileRecord) -> Result<()> {
    if record.is_image() {
        Ok(())
    } else {
        Err(StoreError::InvalidContentType(record.content_type.clone()))
    }
}

/// Uploader-declared content type, or the octet-stream default when none was sent.
pub fn normalize_content_type(declared: &str) -> String {
    let declared = declared.trim();
    if declared.is_empty() {
        DEFAULT_CONTENT_TYPE.to_string()
    } else {
        declared.to_string()
    }
}

/// Best-effort guess from a file extension, for callers with no declared type.
pub fn guess_content_type(filename: &str) -> String {
    mime_guess::from_path(filename).first_or_octet_stream().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_defaults() {
        assert_eq!(normalize_content_type("  "), DEFAULT_CONTENT_TYPE);
        assert_eq!(normalize_content_type("text/plain"), "text/plain");
    }

    #[test]
    fn guesses_follow_the_extension() {
        assert_eq!(guess_content_type("photo.JPG"), "image/jpeg");
        assert_eq!(guess_content_type("scan.png"), "image/png");
        assert_eq!(guess_content_type("clip.webm"), "video/webm");
        assert_eq!(guess_content_type("notes"), DEFAULT_CONTENT_TYPE);
    }
}
