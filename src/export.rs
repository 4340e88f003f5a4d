//! Frame export for the file-save collaborator.
//!
//! Writes a composited frame to disk as PNG (lossless) or JPEG (quality 90).
//! Failures are `ExportFailure`: surfaced to the user, in-memory state
//! untouched.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat, RgbImage};

use crate::error::ViewerError;
use crate::frame::Frame;

pub const JPEG_QUALITY: u8 = 90;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Jpeg,
}

impl ExportFormat {
    /// Infer from a path extension; defaults to PNG when there is none.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("jpg") | Some("jpeg") => Self::Jpeg,
            _ => Self::Png,
        }
    }
}

/// Write `frame` to `path`. Recoverable: the caller keeps all state on error.
pub fn export_frame(frame: &Frame, path: &Path, format: ExportFormat) -> Result<(), ViewerError> {
    let (width, height) = frame.size();
    let img = RgbImage::from_raw(width, height, frame.data().to_vec())
        .ok_or_else(|| ViewerError::ExportFailure("frame buffer size mismatch".into()))?;

    let result = match format {
        ExportFormat::Png => img
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| e.to_string()),
        ExportFormat::Jpeg => File::create(path)
            .map_err(|e| e.to_string())
            .and_then(|file| {
                JpegEncoder::new_with_quality(BufWriter::new(file), JPEG_QUALITY)
                    .encode(img.as_raw(), width, height, ExtendedColorType::Rgb8)
                    .map_err(|e| e.to_string())
            }),
    };

    result.map_err(|detail| {
        ViewerError::ExportFailure(format!("{}: {}", path.display(), detail))
    })
}
