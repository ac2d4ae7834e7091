//! Presentation surface and input source for the engine loop.

use crate::engine::EngineError;
use image::{RgbImage, RgbaImage};
use std::collections::VecDeque;
use tryon_core::{UiEvent, Viewport};

/// Where composited frames go and where user input comes from.
pub trait Frontend {
    /// The loop stops once this returns false.
    fn is_open(&self) -> bool;

    fn viewport(&self) -> Viewport;

    /// Show the video frame with the overlay surface on top.
    fn present(&mut self, video: &RgbImage, overlay: &RgbaImage) -> Result<(), EngineError>;

    /// Input gathered since the last call.
    fn poll_input(&mut self) -> Vec<UiEvent>;
}

/// Frontend without a window. Closes after a fixed number of frames, if given.
pub struct Headless {
    viewport: Viewport,
    max_frames: Option<u64>,
    presented: u64,
    pending: VecDeque<UiEvent>,
}

impl Headless {
    pub fn new(viewport: Viewport, max_frames: Option<u64>) -> Self {
        Self {
            viewport,
            max_frames,
            presented: 0,
            pending: VecDeque::new(),
        }
    }

    /// Queue an event for the next `poll_input`.
    #[cfg(test)]
    pub fn push_event(&mut self, event: UiEvent) {
        self.pending.push_back(event);
    }

    #[cfg(test)]
    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl Frontend for Headless {
    fn is_open(&self) -> bool {
        self.max_frames.map_or(true, |max| self.presented < max)
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn present(&mut self, _video: &RgbImage, _overlay: &RgbaImage) -> Result<(), EngineError> {
        self.presented += 1;
        Ok(())
    }

    fn poll_input(&mut self) -> Vec<UiEvent> {
        self.pending.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_closes_after_max_frames() {
        let mut frontend = Headless::new(Viewport::new(8, 8), Some(2));
        let video = RgbImage::new(8, 8);
        let overlay = RgbaImage::new(8, 8);
        assert!(frontend.is_open());
        frontend.present(&video, &overlay).unwrap();
        assert!(frontend.is_open());
        frontend.present(&video, &overlay).unwrap();
        assert!(!frontend.is_open());
    }

    #[test]
    fn test_headless_drains_events_once() {
        let mut frontend = Headless::new(Viewport::new(8, 8), None);
        frontend.push_event(UiEvent::Reset);
        frontend.push_event(UiEvent::Screenshot);
        assert_eq!(frontend.poll_input().len(), 2);
        assert!(frontend.poll_input().is_empty());
    }
}
