//! Value types shared across the queue, pipeline, and adapters.

use bytes::Bytes;
use serde::Serialize;

/// Monotonically increasing task identifier. Ids start at 1 and are never
/// reused for the lifetime of the process.
pub type TaskId = u64;

/// Output encodings the renderer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Canonical file extension, appended to artifact names that lack one.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpeg" | "jpg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }
}

/// Fixed capture surface. When present, the screenshot covers exactly this
/// viewport; otherwise the full scrollable page is captured.
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub format: ImageFormat,
    /// Compression quality, only meaningful for [`ImageFormat::Jpeg`].
    pub quality: Option<u8>,
    pub viewport: Option<Viewport>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::Png,
            quality: None,
            viewport: None,
        }
    }
}

/// A captured screenshot plus the encoding it was captured in.
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub bytes: Bytes,
    pub format: ImageFormat,
}

/// A persisted artifact, as reported back to pollers.
#[derive(Debug, Clone, Serialize)]
pub struct StoredArtifact {
    pub bucket: String,
    pub object_path: String,
    pub public_url: String,
    /// True when the artifact landed in the default bucket because the
    /// requested bucket could not be ensured.
    pub fallback: bool,
}

/// Where a rendered card should be uploaded.
#[derive(Debug, Clone, Default)]
pub struct UploadTarget {
    pub bucket: Option<String>,
    pub base_dir: String,
    pub file_name: Option<String>,
}

/// A single-row, single-column write performed after a successful upload.
/// The value written is always the artifact's public URL.
#[derive(Debug, Clone)]
pub struct RecordUpdate {
    pub table: String,
    pub primary_key_column: String,
    pub primary_key_value: String,
    pub column: String,
}

/// Observable state of an accepted task.
#[derive(Debug, Clone)]
pub enum TaskStatus {
    Pending,
    Completed(StoredArtifact),
    Failed(String),
}
