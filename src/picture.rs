use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{ImageReader, RgbImage};

use crate::error::ImageLoadError;

const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// A decoded image chosen by the user. Never mutated after decode.
#[derive(Debug, Clone)]
pub struct SelectedImage {
    pub path: PathBuf,
    /// Full-resolution pixels handed to the description worker.
    pub pixels: Arc<RgbImage>,
    /// Downscaled copy for the image area.
    pub thumbnail: RgbImage,
}

/// Whether `path` carries one of the accepted image extensions.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Decode the JPEG or PNG at `path` and build a thumbnail whose longest side
/// is at most `thumbnail_size`.
pub fn load_image(path: &Path, thumbnail_size: u32) -> Result<SelectedImage, ImageLoadError> {
    if !is_supported(path) {
        return Err(ImageLoadError::UnsupportedFormat(path.to_path_buf()));
    }

    let io_err = |source| ImageLoadError::Io {
        path: path.to_path_buf(),
        source,
    };
    let decoded = ImageReader::open(path)
        .map_err(io_err)?
        .with_guessed_format()
        .map_err(io_err)?
        .decode()
        .map_err(|source| ImageLoadError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    let pixels = decoded.to_rgb8();
    // `thumbnail` would upscale small images
    let thumbnail = if pixels.width() <= thumbnail_size && pixels.height() <= thumbnail_size {
        pixels.clone()
    } else {
        decoded.thumbnail(thumbnail_size, thumbnail_size).to_rgb8()
    };
    log::info!(
        "Loaded {} ({}x{}, thumbnail {}x{})",
        path.display(),
        pixels.width(),
        pixels.height(),
        thumbnail.width(),
        thumbnail.height()
    );

    Ok(SelectedImage {
        path: path.to_path_buf(),
        pixels: Arc::new(pixels),
        thumbnail,
    })
}
