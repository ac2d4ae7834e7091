//! Frame sources consumed by the render loop.

use crate::frame::Frame;
use image::RgbImage;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

/// Something that can hand out the most recent video frame.
///
/// Returns `None` while no frame is available yet.
pub trait CaptureSource {
    fn current_frame(&self) -> Option<Frame>;
}

/// A fixed image replayed as every frame.
pub struct StillSource {
    image: RgbImage,
    sequence: AtomicU32,
}

impl StillSource {
    pub fn open(path: &Path) -> Result<Self, image::ImageError> {
        let image = image::open(path)?.to_rgb8();
        tracing::info!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "loaded still image"
        );
        Ok(Self::from_image(image))
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self {
            image,
            sequence: AtomicU32::new(0),
        }
    }
}

impl CaptureSource for StillSource {
    fn current_frame(&self) -> Option<Frame> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        Some(Frame::new(self.image.clone(), seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_still_source_sequence_advances() {
        let source = StillSource::from_image(RgbImage::new(4, 3));
        let a = source.current_frame().unwrap();
        let b = source.current_frame().unwrap();
        assert_eq!((a.width(), a.height()), (4, 3));
        assert_eq!(b.sequence, a.sequence + 1);
    }

    #[test]
    fn test_still_source_missing_file() {
        assert!(StillSource::open(Path::new("/nonexistent/face.png")).is_err());
    }
}
