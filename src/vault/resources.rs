//! Images pasted into notes. They all live flat under `_resources/` at the
//! vault root and are referenced from markdown by absolute vault path.

use std::path::Path;

use super::{ensure_parent, Vault};
use crate::error::KbaseError;
use crate::path::VaultPath;

pub const RESOURCES_DIR: &str = "_resources";

pub const MAX_IMAGE_SIZE: u64 = 10 * 1024 * 1024;

pub const IMAGE_CONTENT_TYPES: [&str; 6] =
    ["image/jpeg", "image/jpg", "image/png", "image/gif", "image/webp", "image/svg+xml"];

pub const IMAGE_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg"];

/// Bytes of a stored image and the content type to serve them with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// Lower-cased extension of `file_name` with its leading dot, or `""`.
fn dotted_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .map(|extension| format!(".{}", extension.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub fn content_type_for(file_name: &str) -> &'static str {
    match dotted_extension(file_name).as_str() {
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        ".svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Size is checked first, then the declared content type, then the extension.
fn validate_image(file_name: &str, content_type: &str, size: u64) -> Result<String, KbaseError> {
    if size > MAX_IMAGE_SIZE {
        return Err(KbaseError::ImageTooLarge(size));
    }
    if !IMAGE_CONTENT_TYPES.contains(&content_type) {
        return Err(KbaseError::UnsupportedImageType(content_type.to_string()));
    }
    let extension = dotted_extension(file_name);
    if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        return Err(KbaseError::UnsupportedImageExtension(extension));
    }
    Ok(extension)
}

/// Maps a requested image path into `_resources/`: `abc.png`,
/// `/abc.png` and `_resources/abc.png` all name the same file.
pub fn resource_path(raw: &str) -> Result<VaultPath, KbaseError> {
    let path = VaultPath::parse(raw)?;
    if path.segments().next() == Some(RESOURCES_DIR) {
        Ok(path)
    } else {
        VaultPath::parse(RESOURCES_DIR)?.join(path.as_str())
    }
}

impl Vault {
    /// Stores an uploaded image under a fresh random name, keeping only the
    /// original extension. Returns the stored path.
    pub fn save_image(&self, file_name: &str, content_type: &str, bytes: &[u8]) -> Result<VaultPath, KbaseError> {
        let extension = validate_image(file_name, content_type, bytes.len() as u64)?;
        let name = format!("{}{extension}", uuid::Uuid::new_v4());
        let path = VaultPath::parse(RESOURCES_DIR)?.join(&name)?;

        let file_path = self.resolve(&path)?;
        ensure_parent(&file_path)?;
        std::fs::write(&file_path, bytes)?;
        log::info!("Stored image {path} ({} bytes)", bytes.len());
        Ok(path)
    }

    pub fn read_image(&self, raw: &str) -> Result<Image, KbaseError> {
        let path = resource_path(raw)?;
        let file_path = self.resolve(&path)?;
        if !file_path.exists() {
            return Err(KbaseError::NotFound(path.to_string()));
        }
        if !file_path.is_file() {
            return Err(KbaseError::NotAFile(path.to_string()));
        }
        Ok(Image {
            bytes: std::fs::read(&file_path)?,
            content_type: content_type_for(path.file_name()),
        })
    }
}
