use serde::{Deserialize, Serialize};

// Face-mesh landmark topology (468 points, 478 with refined irises).
// Indices are positional and only valid for that model family.
pub const NOSE_TIP: usize = 1;
pub const LEFT_EAR: usize = 234;
pub const RIGHT_EAR: usize = 454;
pub const LEFT_EYE_UPPER: usize = 159;
pub const RIGHT_EYE_UPPER: usize = 386;

/// Minimum landmark count for a set to be usable (highest keypoint index + 1).
pub const MIN_LANDMARKS: usize = RIGHT_EAR + 1;

/// Landmark count of the base face mesh.
pub const FACE_MESH_LANDMARKS: usize = 468;
/// Landmark count with refined iris points.
pub const REFINED_FACE_MESH_LANDMARKS: usize = 478;

/// A detected landmark in normalized image coordinates.
///
/// `x` and `y` are roughly in [0, 1]; `z` is relative depth on the same scale as `x`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Ordered landmarks for one face, indexed by the face-mesh topology.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    pub points: Vec<LandmarkPoint>,
}

impl LandmarkSet {
    pub fn new(points: Vec<LandmarkPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Axis-aligned bounds as (min_x, min_y, max_x, max_y), or `None` when empty.
    pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let first = self.points.first()?;
        let init = (first.x, first.y, first.x, first.y);
        Some(self.points.iter().fold(init, |(x0, y0, x1, y1), p| {
            (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y))
        }))
    }
}

/// Output of one detector invocation: zero or more faces, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResults {
    pub faces: Vec<LandmarkSet>,
}

impl DetectionResults {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(face: LandmarkSet) -> Self {
        Self { faces: vec![face] }
    }

    /// The face the overlay follows. Additional faces are ignored.
    pub fn primary(&self) -> Option<&LandmarkSet> {
        self.faces.first()
    }
}

/// The five landmarks the overlay alignment reads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FaceKeypoints {
    pub nose: LandmarkPoint,
    pub left_ear: LandmarkPoint,
    pub right_ear: LandmarkPoint,
    pub left_eye: LandmarkPoint,
    pub right_eye: LandmarkPoint,
}

impl FaceKeypoints {
    /// Pick the keypoints out of a landmark set.
    ///
    /// Returns `None` when the set has fewer than [`MIN_LANDMARKS`] points.
    pub fn from_landmarks(set: &LandmarkSet) -> Option<Self> {
        if set.len() < MIN_LANDMARKS {
            return None;
        }
        let p = &set.points;
        Some(Self {
            nose: p[NOSE_TIP],
            left_ear: p[LEFT_EAR],
            right_ear: p[RIGHT_EAR],
            left_eye: p[LEFT_EYE_UPPER],
            right_eye: p[RIGHT_EYE_UPPER],
        })
    }

    /// Horizontal ear spread, used as a head yaw proxy.
    pub fn yaw_proxy(&self) -> f32 {
        self.right_ear.x - self.left_ear.x
    }

    /// Vertical eye offset, used as a head roll proxy.
    pub fn roll_proxy(&self) -> f32 {
        self.right_eye.y - self.left_eye.y
    }
}
