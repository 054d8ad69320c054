//! Download and share collaborators
//!
//! The core only prepares a named byte stream or a share payload. Writing
//! files and talking to share targets happens behind [`Exporter`] and
//! [`Sharer`], and their failures never touch the workflow state.

use std::borrow::Cow;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{PortraitError, Result};
use crate::image_loader::ImageHandle;

/// A result image ready to be written somewhere
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedImage {
    pub filename: String,
    data: Arc<[u8]>,
}

impl ExportedImage {
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Stream over the encoded bytes
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.data[..])
    }
}

/// `<subject>-portrait.<ext>`, with the subject reduced to a safe slug
pub fn export_filename(subject: &str, extension: &str) -> String {
    let slug: String = subject
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "my" } else { slug };
    format!("{}-portrait.{}", slug, extension)
}

/// Turn a result handle into a downloadable byte stream
pub fn export_result(result: &ImageHandle, subject: &str) -> Result<ExportedImage> {
    let data: Arc<[u8]> = match result.bytes() {
        Some(bytes) => bytes.into(),
        None => {
            return Err(PortraitError::Export(format!(
                "result is only available at {}",
                result.uri().unwrap_or("an external location")
            )))
        }
    };

    Ok(ExportedImage {
        filename: export_filename(subject, result.extension()),
        data,
    })
}

/// Stores an exported image, returning where it went
pub trait Exporter {
    fn save(&self, image: &ExportedImage) -> Result<String>;
}

/// Writes exports into a directory
#[derive(Debug, Clone)]
pub struct DirectoryExporter {
    dir: PathBuf,
}

impl DirectoryExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Exporter for DirectoryExporter {
    fn save(&self, image: &ExportedImage) -> Result<String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| PortraitError::Export(format!("{}: {}", self.dir.display(), e)))?;
        let path = self.dir.join(&image.filename);
        std::fs::write(&path, image.bytes())
            .map_err(|e| PortraitError::Export(format!("{}: {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), bytes = image.bytes().len(), "portrait saved");
        Ok(path.display().to_string())
    }
}

/// What gets handed to a share target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharePayload {
    pub title: String,
    pub text: String,
    pub image: ImageHandle,
}

/// A platform share target
pub trait Sharer {
    fn share(&self, payload: &SharePayload) -> Result<()>;
}

/// Shares by copying the portrait and its caption to the system clipboard
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipboardSharer;

impl Sharer for ClipboardSharer {
    fn share(&self, payload: &SharePayload) -> Result<()> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| PortraitError::Share(e.to_string()))?;

        if payload.image.bytes().is_some() {
            let rgba = payload
                .image
                .decode()
                .map_err(|e| PortraitError::Share(e.to_string()))?
                .to_rgba8();
            clipboard
                .set_image(arboard::ImageData {
                    width: rgba.width() as usize,
                    height: rgba.height() as usize,
                    bytes: Cow::Owned(rgba.into_raw()),
                })
                .map_err(|e| PortraitError::Share(e.to_string()))?;
            return Ok(());
        }

        let mut text = format!("{}\n{}", payload.title, payload.text);
        if let Some(uri) = payload.image.uri() {
            text.push('\n');
            text.push_str(uri);
        }
        clipboard
            .set_text(text)
            .map_err(|e| PortraitError::Share(e.to_string()))
    }
}

/// Transient message for the UI after a download or share attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Warning(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Info(msg) | Notice::Warning(msg) => msg,
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Notice::Warning(_))
    }
}
