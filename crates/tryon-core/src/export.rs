//! Screenshot export: video frame under the overlay surface, saved as PNG.

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Screenshots always overwrite this file in the output directory.
pub const SCREENSHOT_FILE_NAME: &str = "tryon_screenshot.png";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("output directory not found: {0}")]
    DirectoryNotFound(String),
    #[error("encode failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Stretch `video` to the overlay's size and alpha-blend the overlay on top.
///
/// The result always has the overlay surface's dimensions.
pub fn compose(video: &RgbImage, overlay: &RgbaImage) -> RgbaImage {
    let (width, height) = overlay.dimensions();
    let mut canvas = if video.dimensions() == (width, height) {
        DynamicImage::ImageRgb8(video.clone()).into_rgba8()
    } else {
        let scaled = imageops::resize(video, width, height, FilterType::Triangle);
        DynamicImage::ImageRgb8(scaled).into_rgba8()
    };
    imageops::overlay(&mut canvas, overlay, 0, 0);
    canvas
}

/// Compose and write a PNG screenshot into `dir`.
pub fn save_screenshot(video: &RgbImage, overlay: &RgbaImage, dir: &Path) -> Result<PathBuf, ExportError> {
    if !dir.is_dir() {
        return Err(ExportError::DirectoryNotFound(dir.display().to_string()));
    }
    let path = dir.join(SCREENSHOT_FILE_NAME);
    let image = compose(video, overlay);
    image.save_with_format(&path, ImageFormat::Png)?;

    tracing::info!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "screenshot saved"
    );
    Ok(path)
}
