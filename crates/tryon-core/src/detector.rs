//! Face-mesh landmark detector via ONNX Runtime.
//!
//! Runs a single-face landmark model (468 points, 478 with refined irises)
//! on a square region of interest. The first detection scans the whole frame;
//! afterwards the region follows the previous landmarks until the face score
//! drops below the tracking threshold.

use crate::types::{DetectionResults, LandmarkPoint, LandmarkSet, FACE_MESH_LANDMARKS, REFINED_FACE_MESH_LANDMARKS};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const FACE_MESH_INPUT_SIZE: usize = 192;
const FACE_MESH_PIXEL_SCALE: f32 = 1.0 / 255.0;
const ROI_EXPANSION: f32 = 1.5;
const LANDMARK_VALUES: usize = FACE_MESH_LANDMARKS * 3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — place a face landmark ONNX model in models/")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("invalid detector options: {0}")]
    InvalidOptions(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Detector settings. Only the first face is ever tracked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorOptions {
    pub max_faces: usize,
    /// Keep the ten iris points when the model provides them.
    pub refine_landmarks: bool,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            max_faces: 1,
            refine_landmarks: true,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

impl DetectorOptions {
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.max_faces == 0 {
            return Err(DetectorError::InvalidOptions("max_faces must be at least 1".into()));
        }
        for (name, value) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(DetectorError::InvalidOptions(format!(
                    "{name} must be between 0.0 and 1.0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Memory layout the model expects for its image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    #[default]
    Nhwc,
    Nchw,
}

/// Produces face landmarks for a frame.
///
/// Implementations may suspend while inference runs; callers await one
/// result before submitting the next frame.
#[allow(async_fn_in_trait)]
pub trait LandmarkDetector {
    async fn process(&mut self, frame: &RgbImage) -> Result<DetectionResults, DetectorError>;
}

/// Square region of interest in frame pixels. May extend past the frame edges.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Roi {
    x: f32,
    y: f32,
    size: f32,
}

impl Roi {
    /// Smallest square containing the frame, centered on it.
    fn full_frame(width: u32, height: u32) -> Self {
        let size = width.max(height) as f32;
        Self {
            x: (width as f32 - size) / 2.0,
            y: (height as f32 - size) / 2.0,
            size,
        }
    }

    /// Expanded square around a landmark set given in normalized coordinates.
    fn around(face: &LandmarkSet, width: u32, height: u32) -> Option<Self> {
        let (x0, y0, x1, y1) = face.bounds()?;
        let (w, h) = (width as f32, height as f32);
        let size = ((x1 - x0) * w).max((y1 - y0) * h) * ROI_EXPANSION;
        if !size.is_finite() || size < 1.0 {
            return None;
        }
        let cx = (x0 + x1) / 2.0 * w;
        let cy = (y0 + y1) / 2.0 * h;
        Some(Self {
            x: cx - size / 2.0,
            y: cy - size / 2.0,
            size,
        })
    }

    /// Model-input pixel coordinates to a normalized frame landmark.
    fn to_frame(&self, mx: f32, my: f32, mz: f32, width: u32, height: u32) -> LandmarkPoint {
        let k = self.size / FACE_MESH_INPUT_SIZE as f32;
        LandmarkPoint {
            x: (self.x + mx * k) / width as f32,
            y: (self.y + my * k) / height as f32,
            z: mz * k / width as f32,
        }
    }
}

/// Raw tensors from one inference.
struct RawOutput {
    landmarks: Vec<f32>,
    score_logit: Option<f32>,
}

struct FaceMeshModel {
    session: Session,
    num_outputs: usize,
}

impl FaceMeshModel {
    fn infer(&mut self, input: Array4<f32>) -> Result<RawOutput, DetectorError> {
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut tensors = Vec::with_capacity(self.num_outputs);
        for idx in 0..self.num_outputs {
            let (_, data) = outputs[idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("output {idx}: {e}")))?;
            tensors.push(data.to_vec());
        }

        let lengths: Vec<usize> = tensors.iter().map(Vec::len).collect();
        let (landmarks_idx, score_idx) = discover_outputs(&lengths).ok_or_else(|| {
            DetectorError::InferenceFailed(format!("no landmark tensor among outputs of lengths {lengths:?}"))
        })?;

        Ok(RawOutput {
            score_logit: score_idx.map(|i| tensors[i][0]),
            landmarks: std::mem::take(&mut tensors[landmarks_idx]),
        })
    }
}

/// Face-mesh ONNX detector with region-of-interest tracking.
pub struct FaceMeshDetector {
    model: Arc<Mutex<FaceMeshModel>>,
    options: DetectorOptions,
    layout: InputLayout,
    tracked: Option<Roi>,
}

impl FaceMeshDetector {
    /// Load the face landmark ONNX model from the given path.
    pub fn load(model_path: &str, options: DetectorOptions, layout: InputLayout) -> Result<Self, DetectorError> {
        options.validate()?;
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }
        if options.max_faces > 1 {
            tracing::warn!(max_faces = options.max_faces, "only the first face is tracked");
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let num_outputs = session.outputs().len();
        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            ?layout,
            "loaded face mesh model"
        );

        Ok(Self {
            model: Arc::new(Mutex::new(FaceMeshModel { session, num_outputs })),
            options,
            layout,
            tracked: None,
        })
    }
}

impl LandmarkDetector for FaceMeshDetector {
    async fn process(&mut self, frame: &RgbImage) -> Result<DetectionResults, DetectorError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Ok(DetectionResults::empty());
        }

        let tracking = self.tracked.is_some();
        let roi = self.tracked.unwrap_or_else(|| Roi::full_frame(width, height));
        let input = preprocess(frame, roi, self.layout);

        let model = Arc::clone(&self.model);
        let raw = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| DetectorError::InferenceFailed("model lock poisoned".into()))?;
            model.infer(input)
        })
        .await
        .map_err(|e| DetectorError::InferenceFailed(format!("inference task: {e}")))??;

        let score = raw.score_logit.map(sigmoid).unwrap_or(1.0);
        let threshold = if tracking {
            self.options.min_tracking_confidence
        } else {
            self.options.min_detection_confidence
        };
        if score < threshold {
            tracing::trace!(score, threshold, tracking, "face below confidence threshold");
            self.tracked = None;
            return Ok(DetectionResults::empty());
        }

        let face = decode_landmarks(&raw.landmarks, roi, width, height, self.options.refine_landmarks);
        self.tracked = Roi::around(&face, width, height);
        tracing::trace!(score, points = face.len(), tracking, "face landmarks decoded");

        Ok(DetectionResults::single(face))
    }
}

/// Find the landmark and face-score tensors by element count.
///
/// Landmarks are the first output holding at least 468 xyz triples; the score
/// is the first single-element output, if any.
fn discover_outputs(lengths: &[usize]) -> Option<(usize, Option<usize>)> {
    let landmarks = lengths
        .iter()
        .position(|&len| len >= LANDMARK_VALUES && len % 3 == 0)?;
    let score = lengths.iter().position(|&len| len == 1);
    Some((landmarks, score))
}

/// Resample `roi` into a 192×192 tensor scaled to [0, 1]. Pixels outside the frame are black.
fn preprocess(frame: &RgbImage, roi: Roi, layout: InputLayout) -> Array4<f32> {
    let n = FACE_MESH_INPUT_SIZE;
    let mut tensor = match layout {
        InputLayout::Nhwc => Array4::<f32>::zeros((1, n, n, 3)),
        InputLayout::Nchw => Array4::<f32>::zeros((1, 3, n, n)),
    };

    let (width, height) = frame.dimensions();
    let step = roi.size / n as f32;
    let sample = |x: i64, y: i64, c: usize| -> f32 {
        if x >= 0 && x < width as i64 && y >= 0 && y < height as i64 {
            frame.get_pixel(x as u32, y as u32)[c] as f32
        } else {
            0.0
        }
    };

    for oy in 0..n {
        let sy = roi.y + (oy as f32 + 0.5) * step - 0.5;
        let y0 = sy.floor();
        let fy = sy - y0;
        for ox in 0..n {
            let sx = roi.x + (ox as f32 + 0.5) * step - 0.5;
            let x0 = sx.floor();
            let fx = sx - x0;
            let (x0, y0) = (x0 as i64, y0 as i64);

            for c in 0..3 {
                let val = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                    + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                    + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                    + sample(x0 + 1, y0 + 1, c) * fx * fy;
                let val = val * FACE_MESH_PIXEL_SCALE;
                match layout {
                    InputLayout::Nhwc => tensor[[0, oy, ox, c]] = val,
                    InputLayout::Nchw => tensor[[0, c, oy, ox]] = val,
                }
            }
        }
    }

    tensor
}

/// Map raw model landmarks back to normalized frame coordinates.
fn decode_landmarks(raw: &[f32], roi: Roi, width: u32, height: u32, refine: bool) -> LandmarkSet {
    let mut count = raw.len() / 3;
    if !refine && count >= REFINED_FACE_MESH_LANDMARKS {
        count = FACE_MESH_LANDMARKS;
    }
    let points = raw
        .chunks_exact(3)
        .take(count)
        .map(|p| roi.to_frame(p[0], p[1], p[2], width, height))
        .collect();
    LandmarkSet::new(points)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_default_options() {
        let opts = DetectorOptions::default();
        assert_eq!(opts.max_faces, 1);
        assert!(opts.refine_landmarks);
        assert_eq!(opts.min_detection_confidence, 0.5);
        assert_eq!(opts.min_tracking_confidence, 0.5);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_options_reject_bad_values() {
        let zero_faces = DetectorOptions { max_faces: 0, ..DetectorOptions::default() };
        assert!(zero_faces.validate().is_err());

        let bad_conf = DetectorOptions { min_tracking_confidence: 1.5, ..DetectorOptions::default() };
        assert!(matches!(bad_conf.validate(), Err(DetectorError::InvalidOptions(_))));
    }

    #[test]
    fn test_load_missing_model() {
        let result = FaceMeshDetector::load("/nonexistent/face_landmark.onnx", DetectorOptions::default(), InputLayout::Nhwc);
        assert!(matches!(result, Err(DetectorError::ModelNotFound(_))));
    }

    #[test]
    fn test_discover_outputs() {
        // 478 * 3 landmarks, then a face flag
        assert_eq!(discover_outputs(&[1434, 1]), Some((0, Some(1))));
        // Flag first, 468 * 3 landmarks second
        assert_eq!(discover_outputs(&[1, 1404]), Some((1, Some(0))));
        // No flag
        assert_eq!(discover_outputs(&[1404]), Some((0, None)));
        // Nothing usable
        assert_eq!(discover_outputs(&[1, 10]), None);
    }

    #[test]
    fn test_full_frame_roi_is_centered_square() {
        let roi = Roi::full_frame(640, 480);
        assert_eq!(roi.size, 640.0);
        assert_eq!(roi.x, 0.0);
        assert_eq!(roi.y, -80.0);
    }

    #[test]
    fn test_roi_mapping_corners() {
        let roi = Roi::full_frame(640, 480);
        let top_left = roi.to_frame(0.0, 0.0, 0.0, 640, 480);
        let center = roi.to_frame(96.0, 96.0, 0.0, 640, 480);
        assert!((top_left.x - 0.0).abs() < 1e-6);
        assert!((top_left.y + 80.0 / 480.0).abs() < 1e-6);
        assert!((center.x - 0.5).abs() < 1e-6);
        assert!((center.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_roi_around_landmarks() {
        let face = LandmarkSet::new(vec![
            LandmarkPoint::new(0.25, 0.25, 0.0),
            LandmarkPoint::new(0.75, 0.5, 0.0),
        ]);
        let roi = Roi::around(&face, 400, 400).unwrap();
        // 200 px wide, 100 px tall, expanded 1.5x on the larger side
        assert!((roi.size - 300.0).abs() < 1e-4);
        assert!((roi.x + roi.size / 2.0 - 200.0).abs() < 1e-4);
        assert!((roi.y + roi.size / 2.0 - 150.0).abs() < 1e-4);
    }

    #[test]
    fn test_roi_around_degenerate_face() {
        let face = LandmarkSet::new(vec![LandmarkPoint::new(0.5, 0.5, 0.0); 3]);
        assert!(Roi::around(&face, 640, 480).is_none());
        assert!(Roi::around(&LandmarkSet::default(), 640, 480).is_none());
    }

    #[test]
    fn test_preprocess_pads_outside_frame() {
        let frame = RgbImage::from_pixel(200, 100, Rgb([255, 255, 255]));
        let tensor = preprocess(&frame, Roi::full_frame(200, 100), InputLayout::Nhwc);
        assert_eq!(tensor.shape(), &[1, 192, 192, 3]);
        // Top rows fall above the frame
        assert_eq!(tensor[[0, 0, 96, 0]], 0.0);
        // Center is inside
        assert!((tensor[[0, 96, 96, 1]] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_preprocess_nchw_layout() {
        let frame = RgbImage::from_pixel(64, 64, Rgb([0, 51, 255]));
        let tensor = preprocess(&frame, Roi::full_frame(64, 64), InputLayout::Nchw);
        assert_eq!(tensor.shape(), &[1, 3, 192, 192]);
        assert!((tensor[[0, 1, 96, 96]] - 0.2).abs() < 1e-5);
        assert!((tensor[[0, 2, 96, 96]] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_decode_landmarks_drops_irises_without_refine() {
        let raw = vec![96.0f32; REFINED_FACE_MESH_LANDMARKS * 3];
        let roi = Roi::full_frame(100, 100);
        assert_eq!(decode_landmarks(&raw, roi, 100, 100, true).len(), 478);
        let base = decode_landmarks(&raw, roi, 100, 100, false);
        assert_eq!(base.len(), 468);
        assert!((base.points[0].x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }
}
