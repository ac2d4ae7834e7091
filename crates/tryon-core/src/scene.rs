//! Scene graph: camera, light and the overlay object.

use glam::{EulerRot, Mat4, Quat, Vec3};
use std::f32::consts::FRAC_PI_3;

const CAMERA_FOV_DEGREES: f32 = 75.0;
const CAMERA_NEAR: f32 = 0.1;
const CAMERA_FAR: f32 = 1000.0;
const CAMERA_DISTANCE: f32 = 1.0;

/// Scale and Y rotation the overlay starts with once its asset has loaded.
pub const INITIAL_OVERLAY_SCALE: f32 = 0.85;
pub const INITIAL_OVERLAY_YAW: f32 = FRAC_PI_3;

/// Position, Euler rotation (XYZ order, radians) and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Model matrix: translate * rotate(X, then Y, then Z) * scale.
    pub fn matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        );
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }

    pub fn set_uniform_scale(&mut self, scale: f32) {
        self.scale = Vec3::splat(scale);
    }
}

/// One triangle list with a flat base color.
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
    /// Linear RGBA in [0, 1].
    pub base_color: [f32; 4],
}

impl Primitive {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub primitives: Vec<Primitive>,
}

impl Mesh {
    pub fn triangle_count(&self) -> usize {
        self.primitives.iter().map(Primitive::triangle_count).sum()
    }
}

/// The eyewear model placed in the scene.
#[derive(Debug, Clone)]
pub struct OverlayObject {
    pub mesh: Mesh,
    pub transform: Transform,
}

impl OverlayObject {
    pub fn new(mesh: Mesh) -> Self {
        let mut transform = Transform::default();
        transform.rotation = Vec3::new(0.0, INITIAL_OVERLAY_YAW, 0.0);
        transform.set_uniform_scale(INITIAL_OVERLAY_SCALE);
        Self { mesh, transform }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PerspectiveCamera {
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
}

impl PerspectiveCamera {
    /// Camera looking down -Z from `(0, 0, 1)`.
    pub fn new(aspect: f32) -> Self {
        Self {
            fov_y_degrees: CAMERA_FOV_DEGREES,
            aspect,
            near: CAMERA_NEAR,
            far: CAMERA_FAR,
            position: Vec3::new(0.0, 0.0, CAMERA_DISTANCE),
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, Vec3::NEG_Z, Vec3::Y)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh_gl(
            self.fov_y_degrees.to_radians(),
            self.aspect,
            self.near,
            self.far,
        )
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }
}

/// Directional light shining from `position` towards the origin.
#[derive(Debug, Clone, Copy)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
    pub position: Vec3,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
            position: Vec3::new(0.0, 1.0, 1.0),
        }
    }
}

impl DirectionalLight {
    /// Unit vector pointing from the surface towards the light.
    pub fn direction(&self) -> Vec3 {
        self.position.normalize_or_zero()
    }
}

/// Scene owned by the session for the application lifetime.
#[derive(Debug, Clone)]
pub struct Scene {
    pub camera: PerspectiveCamera,
    pub light: DirectionalLight,
    /// `None` until the asset has loaded.
    pub overlay: Option<OverlayObject>,
}

impl Scene {
    pub fn new(viewport_width: u32, viewport_height: u32) -> Self {
        let aspect = viewport_width.max(1) as f32 / viewport_height.max(1) as f32;
        Self {
            camera: PerspectiveCamera::new(aspect),
            light: DirectionalLight::default(),
            overlay: None,
        }
    }

    pub fn overlay_transform(&self) -> Option<Transform> {
        self.overlay.as_ref().map(|o| o.transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_transform_is_identity() {
        assert!(Transform::default().matrix().abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn test_transform_applies_scale_then_translation() {
        let t = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Vec3::ZERO,
            scale: Vec3::splat(2.0),
        };
        let p = t.matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!(p.abs_diff_eq(Vec3::new(3.0, 2.0, 3.0), 1e-6));
    }

    #[test]
    fn test_transform_yaw_rotates_x_towards_negative_z() {
        let t = Transform {
            rotation: Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0),
            ..Transform::default()
        };
        let p = t.matrix().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::NEG_Z, 1e-6), "got {p:?}");
    }

    #[test]
    fn test_overlay_initial_transform() {
        let overlay = OverlayObject::new(Mesh::default());
        assert_eq!(overlay.transform.scale, Vec3::splat(0.85));
        assert!((overlay.transform.rotation.y - FRAC_PI_3).abs() < 1e-6);
        assert_eq!(overlay.transform.position, Vec3::ZERO);
    }

    #[test]
    fn test_camera_projects_axis_point_to_center() {
        let camera = PerspectiveCamera::new(16.0 / 9.0);
        let clip = camera.view_projection() * Vec3::new(0.0, 0.0, -0.5).extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-6 && ndc.y.abs() < 1e-6);
        assert!(ndc.z > -1.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_light_direction_is_normalized() {
        let dir = DirectionalLight::default().direction();
        assert!((dir.length() - 1.0).abs() < 1e-6);
        assert!(dir.y > 0.0 && dir.z > 0.0);
    }

    #[test]
    fn test_scene_starts_without_overlay() {
        let scene = Scene::new(1280, 720);
        assert!(scene.overlay.is_none());
        assert!((scene.camera.aspect - 1280.0 / 720.0).abs() < 1e-6);
    }
}
