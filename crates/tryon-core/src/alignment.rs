//! Overlay alignment from face keypoints.
//!
//! Maps normalized image coordinates into scene space and turns ear/eye
//! displacement into yaw and roll, then layers the manual adjustment on top.

use crate::adjustment::ManualAdjustment;
use crate::scene::Transform;
use crate::types::FaceKeypoints;
use glam::Vec3;

/// Re-centers normalized [0, 1] image coordinates around the scene origin.
const IMAGE_CENTER: f32 = 0.5;
/// Depth the overlay sits at before manual offset.
const OVERLAY_DEPTH: f32 = -0.5;
/// Radians of yaw per unit of normalized ear spread.
pub const YAW_GAIN: f32 = 5.0;
/// Radians of roll per unit of normalized eye offset.
pub const ROLL_GAIN: f32 = 2.5;

/// Overlay position in scene space. Image Y grows downward, scene Y upward.
pub fn overlay_position(face: &FaceKeypoints, adjustment: &ManualAdjustment) -> Vec3 {
    Vec3::new(
        face.nose.x - IMAGE_CENTER + adjustment.offset.x,
        -face.nose.y + IMAGE_CENTER + adjustment.offset.y,
        OVERLAY_DEPTH + adjustment.offset.z,
    )
}

/// Yaw (rotation about Y) including the manual correction.
pub fn overlay_yaw(face: &FaceKeypoints, adjustment: &ManualAdjustment) -> f32 {
    -face.yaw_proxy() * YAW_GAIN + adjustment.rotation_y
}

/// Roll (rotation about Z) including the manual correction.
pub fn overlay_roll(face: &FaceKeypoints, adjustment: &ManualAdjustment) -> f32 {
    -face.roll_proxy() * ROLL_GAIN + adjustment.rotation_z
}

/// Recompute `transform` for this frame.
///
/// Rotation about X is left as it was.
pub fn align(transform: &mut Transform, face: &FaceKeypoints, adjustment: &ManualAdjustment) {
    transform.position = overlay_position(face, adjustment);
    transform.rotation.y = overlay_yaw(face, adjustment);
    transform.rotation.z = overlay_roll(face, adjustment);
    transform.set_uniform_scale(adjustment.scale);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LandmarkPoint;

    fn face(nose: (f32, f32), ears: (f32, f32), eyes: (f32, f32)) -> FaceKeypoints {
        FaceKeypoints {
            nose: LandmarkPoint::new(nose.0, nose.1, 0.0),
            left_ear: LandmarkPoint::new(ears.0, 0.5, 0.0),
            right_ear: LandmarkPoint::new(ears.1, 0.5, 0.0),
            left_eye: LandmarkPoint::new(0.4, eyes.0, 0.0),
            right_eye: LandmarkPoint::new(0.6, eyes.1, 0.0),
        }
    }

    fn neutral() -> ManualAdjustment {
        ManualAdjustment { scale: 1.0, ..ManualAdjustment::default() }
    }

    #[test]
    fn test_centered_face_maps_to_origin() {
        let f = face((0.5, 0.5), (0.5, 0.5), (0.4, 0.4));
        let mut t = Transform::default();
        align(&mut t, &f, &neutral());

        assert!(t.position.abs_diff_eq(Vec3::new(0.0, 0.0, -0.5), 1e-6));
        assert_eq!(t.rotation.y, 0.0);
        assert_eq!(t.rotation.z, 0.0);
    }

    #[test]
    fn test_ear_spread_sets_yaw() {
        let f = face((0.5, 0.5), (0.3, 0.7), (0.4, 0.4));
        let yaw = overlay_yaw(&f, &neutral());
        assert!((yaw + 2.0).abs() < 1e-5, "yaw = {yaw}");
    }

    #[test]
    fn test_eye_offset_sets_roll() {
        let f = face((0.5, 0.5), (0.5, 0.5), (0.40, 0.44));
        let roll = overlay_roll(&f, &neutral());
        assert!((roll + 0.1).abs() < 1e-5, "roll = {roll}");
    }

    #[test]
    fn test_image_y_is_inverted() {
        let f = face((0.7, 0.2), (0.5, 0.5), (0.4, 0.4));
        let pos = overlay_position(&f, &neutral());
        assert!((pos.x - 0.2).abs() < 1e-6);
        assert!((pos.y - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_manual_adjustment_is_additive() {
        let f = face((0.5, 0.5), (0.3, 0.7), (0.4, 0.4));
        let adj = ManualAdjustment {
            offset: Vec3::new(0.1, -0.1, 0.2),
            rotation_y: 0.5,
            rotation_z: -0.25,
            scale: 1.2,
        };
        let mut t = Transform::default();
        align(&mut t, &f, &adj);

        assert!(t.position.abs_diff_eq(Vec3::new(0.1, -0.1, -0.3), 1e-6));
        assert!((t.rotation.y + 1.5).abs() < 1e-5);
        assert!((t.rotation.z + 0.25).abs() < 1e-6);
        assert_eq!(t.scale, Vec3::splat(1.2));
    }

    #[test]
    fn test_pitch_is_untouched() {
        let f = face((0.5, 0.5), (0.5, 0.5), (0.4, 0.4));
        let mut t = Transform::default();
        t.rotation.x = 0.3;
        align(&mut t, &f, &neutral());
        assert_eq!(t.rotation.x, 0.3);
    }
}
