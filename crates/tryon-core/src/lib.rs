//! tryon-core — Face landmark tracking and eyewear overlay alignment.
//!
//! Runs a face-mesh model via ONNX Runtime, aligns a glTF eyewear model to
//! the detected landmarks, rasterizes it onto a transparent surface and
//! composites screenshots.

pub mod adjustment;
pub mod alignment;
pub mod detector;
pub mod export;
pub mod loader;
pub mod render;
pub mod scene;
pub mod session;
pub mod types;

pub use adjustment::{ManualAdjustment, PointerEvent, PointerInput, SliderId, UiEvent, Viewport};
pub use detector::{DetectorError, DetectorOptions, FaceMeshDetector, InputLayout, LandmarkDetector};
pub use render::{Renderer, SoftwareRenderer};
pub use scene::{Mesh, OverlayObject, Scene, Transform};
pub use session::{AlignmentOutcome, Session};
pub use types::{DetectionResults, FaceKeypoints, LandmarkPoint, LandmarkSet};
