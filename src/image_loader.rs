//! Image loading utilities
//!
//! Turns uploaded bytes, files and data URIs into immutable [`ImageHandle`]s.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, ImageFormat};

use crate::error::{PortraitError, Result};

/// Where the pixels behind a handle live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Encoded image bytes held in memory
    Bytes { data: Arc<[u8]>, format: ImageFormat },
    /// Content URI resolved by an external asset collaborator
    Uri(String),
}

/// Opaque, immutable reference to image data plus its dimensions
///
/// Cloning is cheap: byte buffers are shared, never copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    source: ImageSource,
    width: u32,
    height: u32,
}

impl ImageHandle {
    /// Create a handle from encoded image bytes
    ///
    /// Only the header is inspected here; a truncated body surfaces later
    /// when the pixels are decoded.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        let data: Arc<[u8]> = bytes.into();
        let format = image::guess_format(&data)
            .map_err(|e| PortraitError::UnreadableImage(e.to_string()))?;
        let (width, height) = image::ImageReader::with_format(Cursor::new(&data[..]), format)
            .into_dimensions()
            .map_err(|e| PortraitError::UnreadableImage(e.to_string()))?;

        Ok(Self {
            source: ImageSource::Bytes { data, format },
            width,
            height,
        })
    }

    /// Create a handle that points at an externally hosted image
    pub fn from_uri(uri: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            source: ImageSource::Uri(uri.into()),
            width,
            height,
        }
    }

    /// Encode a decoded image as PNG and wrap it in a handle
    pub fn from_image(image: &DynamicImage) -> Result<Self> {
        let mut buf = Cursor::new(Vec::new());
        image
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| PortraitError::UnreadableImage(e.to_string()))?;

        Ok(Self {
            source: ImageSource::Bytes {
                data: buf.into_inner().into(),
                format: ImageFormat::Png,
            },
            width: image.width(),
            height: image.height(),
        })
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Encoded bytes, if the handle holds them
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.source {
            ImageSource::Bytes { data, .. } => Some(data),
            ImageSource::Uri(_) => None,
        }
    }

    /// URI, if the handle points at an external image
    pub fn uri(&self) -> Option<&str> {
        match &self.source {
            ImageSource::Uri(uri) => Some(uri),
            ImageSource::Bytes { .. } => None,
        }
    }

    /// File extension matching the encoded format (`png` for URIs)
    pub fn extension(&self) -> &'static str {
        match &self.source {
            ImageSource::Bytes { format, .. } => {
                format.extensions_str().first().copied().unwrap_or("png")
            }
            ImageSource::Uri(_) => "png",
        }
    }

    /// Decode the pixels
    pub fn decode(&self) -> Result<DynamicImage> {
        match &self.source {
            ImageSource::Bytes { data, format } => {
                image::load_from_memory_with_format(data, *format)
                    .map_err(|e| PortraitError::UnreadableImage(e.to_string()))
            }
            ImageSource::Uri(uri) => Err(PortraitError::UnreadableImage(format!(
                "no inline pixel data behind {}",
                uri
            ))),
        }
    }
}

/// Load an uploaded image file
///
/// The extension must be one of [`SUPPORTED_EXTENSIONS`].
pub fn load_image(path: &Path) -> Result<ImageHandle> {
    if !is_supported_format(path) {
        return Err(PortraitError::UnreadableImage(format!(
            "{}: unsupported file type (expected one of {})",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }
    let bytes = std::fs::read(path)
        .map_err(|e| PortraitError::UnreadableImage(format!("{}: {}", path.display(), e)))?;
    validated(bytes)
}

/// Load uploaded bytes
pub fn load_image_from_bytes(bytes: &[u8]) -> Result<ImageHandle> {
    validated(bytes.to_vec())
}

/// Uploads are decoded in full so a corrupt body is refused immediately
fn validated(bytes: Vec<u8>) -> Result<ImageHandle> {
    let handle = ImageHandle::from_bytes(bytes)?;
    handle.decode()?;
    Ok(handle)
}

/// Load an image from a `data:<mime>;base64,<payload>` URI
pub fn load_image_from_data_uri(uri: &str) -> Result<ImageHandle> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| PortraitError::UnreadableImage("not a data URI".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| PortraitError::UnreadableImage("data URI has no payload".to_string()))?;
    if !meta.ends_with(";base64") {
        return Err(PortraitError::UnreadableImage(
            "only base64 data URIs are supported".to_string(),
        ));
    }

    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| PortraitError::UnreadableImage(e.to_string()))?;
    validated(bytes)
}

/// Upload file extensions, compared case-insensitively
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

pub fn is_supported_format(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(ext))
        })
}
