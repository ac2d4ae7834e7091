//! tryon-hw — Video sources for the try-on loop.
//!
//! Provides V4L2-based camera streaming and a still-image source behind a
//! common `CaptureSource` trait.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, CameraStream, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
pub use source::{CaptureSource, StillSource};
