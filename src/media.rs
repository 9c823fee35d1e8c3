//! Recipe image storage.
//!
//! Clients upload images inline as `data:image/<type>;base64,<payload>`. Decoded
//! files land in `<media.root>/recipes/images/` under a random name and are served
//! back from `<media.base_url>`.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use uuid::Uuid;

use crate::config::MediaConfig;
use crate::error::AppError;

const IMAGE_SUBDIR: &str = "recipes/images";

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("expected a data URI of the form data:image/<type>;base64,<payload>")]
    NotDataUri,
    #[error("unsupported image type '{0}'")]
    UnsupportedType(String),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image is empty")]
    Empty,
    #[error("image exceeds {max} bytes")]
    TooLarge { max: usize },
    #[error("failed to store image: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ImageError> for AppError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::Io(e) => AppError::from(e),
            other => AppError::validation("image", other.to_string()),
        }
    }
}

/// A decoded upload ready to be written.
#[derive(Debug)]
pub struct DecodedImage {
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

pub fn decode_data_uri(input: &str, max_bytes: usize) -> Result<DecodedImage, ImageError> {
    let rest = input.trim().strip_prefix("data:").ok_or(ImageError::NotDataUri)?;
    let (meta, payload) = rest.split_once(',').ok_or(ImageError::NotDataUri)?;
    let mime = meta.strip_suffix(";base64").ok_or(ImageError::NotDataUri)?;
    let extension = match mime.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        other => return Err(ImageError::UnsupportedType(other.to_string())),
    };
    // base64 expands by 4/3; reject obviously oversized payloads before decoding
    if payload.len() / 4 * 3 > max_bytes + 3 {
        return Err(ImageError::TooLarge { max: max_bytes });
    }
    let bytes = STANDARD.decode(payload.trim())?;
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(ImageError::TooLarge { max: max_bytes });
    }
    Ok(DecodedImage { extension, bytes })
}

/// Writes `image` under the media root and returns its public URL.
pub async fn store_image(cfg: &MediaConfig, image: DecodedImage) -> Result<String, ImageError> {
    let dir = Path::new(&cfg.root).join(IMAGE_SUBDIR);
    tokio::fs::create_dir_all(&dir).await?;
    let file_name = format!("{}.{}", Uuid::new_v4().simple(), image.extension);
    tokio::fs::write(dir.join(&file_name), &image.bytes).await?;
    tracing::debug!("Stored recipe image {} ({} bytes)", file_name, image.bytes.len());
    Ok(format!("{}{}/{}", cfg.base_url, IMAGE_SUBDIR, file_name))
}

/// Maps a public URL produced by [`store_image`] back to its file. Anything else
/// (foreign URLs, traversal attempts) yields `None`.
fn file_for_url(cfg: &MediaConfig, url: &str) -> Option<PathBuf> {
    let relative = url.strip_prefix(&cfg.base_url)?;
    let file_name = relative.strip_prefix(IMAGE_SUBDIR)?.strip_prefix('/')?;
    if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name.starts_with('.') {
        return None;
    }
    Some(Path::new(&cfg.root).join(IMAGE_SUBDIR).join(file_name))
}

/// Best-effort removal of a replaced or orphaned image.
pub async fn remove_image(cfg: &MediaConfig, url: &str) {
    let Some(path) = file_for_url(cfg, url) else {
        return;
    };
    if let Err(e) = tokio::fs::remove_file(&path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove image {}: {}", path.display(), e);
        }
    }
}
