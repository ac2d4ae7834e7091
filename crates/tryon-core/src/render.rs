//! Software rasterizer for the overlay scene.
//!
//! Draws into a transparent RGBA surface so only overlay pixels cover the
//! video when composited. The surface is retained until the next render.

use crate::scene::{Primitive, Scene};
use glam::{Mat4, Vec3, Vec4};
use image::{Rgba, RgbaImage};

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Draws a [`Scene`] into a retained surface.
pub trait Renderer {
    fn render(&mut self, scene: &Scene);

    /// The most recently drawn frame.
    fn surface(&self) -> &RgbaImage;

    fn resize(&mut self, width: u32, height: u32);
}

/// CPU renderer with a depth buffer and flat Lambert shading.
pub struct SoftwareRenderer {
    surface: RgbaImage,
    depth: Vec<f32>,
}

/// A triangle vertex after projection: screen x/y in pixels, NDC depth.
#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    depth: f32,
}

impl SoftwareRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface: RgbaImage::from_pixel(width, height, TRANSPARENT),
            depth: vec![f32::INFINITY; (width * height) as usize],
        }
    }

    fn clear(&mut self) {
        for pixel in self.surface.pixels_mut() {
            *pixel = TRANSPARENT;
        }
        self.depth.fill(f32::INFINITY);
    }

    fn draw_primitive(&mut self, primitive: &Primitive, model: Mat4, view_projection: Mat4, light: Vec3, light_color: Vec3) {
        let mvp = view_projection * model;
        let (width, height) = self.surface.dimensions();

        for tri in primitive.indices.chunks_exact(3) {
            let fetch = |i: u32| primitive.positions.get(i as usize).copied();
            let (Some(a), Some(b), Some(c)) = (fetch(tri[0]), fetch(tri[1]), fetch(tri[2])) else {
                continue;
            };

            let world = [
                model.transform_point3(a),
                model.transform_point3(b),
                model.transform_point3(c),
            ];
            let normal = (world[1] - world[0]).cross(world[2] - world[0]).normalize_or_zero();
            // Double-sided: light whichever face points at the camera side.
            let lambert = normal.dot(light).abs();
            let shade = light_color * lambert;

            let clip = [mvp * a.extend(1.0), mvp * b.extend(1.0), mvp * c.extend(1.0)];
            let Some(screen) = project_triangle(&clip, width, height) else {
                continue;
            };

            let base = primitive.base_color;
            let color = Rgba([
                to_u8(base[0] * shade.x),
                to_u8(base[1] * shade.y),
                to_u8(base[2] * shade.z),
                to_u8(base[3]),
            ]);
            self.fill_triangle(&screen, color);
        }
    }

    fn fill_triangle(&mut self, v: &[ScreenVertex; 3], color: Rgba<u8>) {
        let (width, height) = self.surface.dimensions();
        let area = edge(v[0], v[1], v[2].x, v[2].y);
        if area.abs() < f32::EPSILON {
            return;
        }

        let min_x = v.iter().map(|p| p.x).fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
        let min_y = v.iter().map(|p| p.y).fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
        let max_x = v.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max).ceil().min(width as f32 - 1.0);
        let max_y = v.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max).ceil().min(height as f32 - 1.0);
        if max_x < 0.0 || max_y < 0.0 {
            return;
        }

        for y in min_y..=max_y as u32 {
            for x in min_x..=max_x as u32 {
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;
                let w0 = edge(v[1], v[2], px, py) / area;
                let w1 = edge(v[2], v[0], px, py) / area;
                let w2 = edge(v[0], v[1], px, py) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }

                let depth = w0 * v[0].depth + w1 * v[1].depth + w2 * v[2].depth;
                let idx = (y * width + x) as usize;
                if depth < self.depth[idx] {
                    self.depth[idx] = depth;
                    self.surface.put_pixel(x, y, color);
                }
            }
        }
    }
}

impl Renderer for SoftwareRenderer {
    fn render(&mut self, scene: &Scene) {
        self.clear();
        let Some(overlay) = &scene.overlay else {
            return;
        };

        let model = overlay.transform.matrix();
        let view_projection = scene.camera.view_projection();
        let light = scene.light.direction();
        let light_color = scene.light.color * scene.light.intensity;

        for primitive in &overlay.mesh.primitives {
            self.draw_primitive(primitive, model, view_projection, light, light_color);
        }
    }

    fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.surface.dimensions() != (width, height) {
            *self = Self::new(width, height);
        }
    }
}

/// Clip-space triangle to screen space. Triangles touching the near plane are dropped.
fn project_triangle(clip: &[Vec4; 3], width: u32, height: u32) -> Option<[ScreenVertex; 3]> {
    if clip.iter().any(|c| c.w <= f32::EPSILON || c.z < -c.w) {
        return None;
    }
    let to_screen = |c: &Vec4| {
        let ndc = c.truncate() / c.w;
        ScreenVertex {
            x: (ndc.x + 1.0) * 0.5 * width as f32,
            y: (1.0 - ndc.y) * 0.5 * height as f32,
            depth: ndc.z,
        }
    };
    Some([to_screen(&clip[0]), to_screen(&clip[1]), to_screen(&clip[2])])
}

/// Signed area of (a, b, p), scaled by 2. Sign follows winding.
fn edge(a: ScreenVertex, b: ScreenVertex, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Mesh, OverlayObject, Transform};

    fn quad(z: f32, color: [f32; 4]) -> Primitive {
        Primitive {
            positions: vec![
                Vec3::new(-0.1, -0.1, z),
                Vec3::new(0.1, -0.1, z),
                Vec3::new(0.1, 0.1, z),
                Vec3::new(-0.1, 0.1, z),
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
            base_color: color,
        }
    }

    fn scene_with(primitives: Vec<Primitive>) -> Scene {
        let mut scene = Scene::new(64, 64);
        let mut overlay = OverlayObject::new(Mesh { primitives });
        overlay.transform = Transform {
            position: Vec3::new(0.0, 0.0, -0.5),
            ..Transform::default()
        };
        scene.overlay = Some(overlay);
        scene
    }

    #[test]
    fn test_empty_scene_is_transparent() {
        let mut renderer = SoftwareRenderer::new(32, 24);
        renderer.render(&Scene::new(32, 24));
        assert_eq!(renderer.surface().dimensions(), (32, 24));
        assert!(renderer.surface().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_overlay_covers_center_only() {
        let mut renderer = SoftwareRenderer::new(64, 64);
        renderer.render(&scene_with(vec![quad(0.0, [1.0, 1.0, 1.0, 1.0])]));

        let surface = renderer.surface();
        assert_eq!(surface.get_pixel(32, 32)[3], 255);
        assert_eq!(surface.get_pixel(0, 0)[3], 0);
        assert_eq!(surface.get_pixel(63, 63)[3], 0);
    }

    #[test]
    fn test_render_clears_previous_frame() {
        let mut renderer = SoftwareRenderer::new(64, 64);
        renderer.render(&scene_with(vec![quad(0.0, [1.0, 1.0, 1.0, 1.0])]));
        renderer.render(&Scene::new(64, 64));
        assert!(renderer.surface().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_nearer_triangle_wins() {
        let mut renderer = SoftwareRenderer::new(64, 64);
        let far = quad(-0.1, [1.0, 0.0, 0.0, 1.0]);
        let near = quad(0.1, [0.0, 0.0, 1.0, 1.0]);
        renderer.render(&scene_with(vec![near, far]));

        let center = renderer.surface().get_pixel(32, 32);
        assert_eq!(center[0], 0);
        assert!(center[2] > 0);
    }

    #[test]
    fn test_geometry_behind_camera_is_skipped() {
        let mut renderer = SoftwareRenderer::new(64, 64);
        // Overlay at z = -0.5, so a quad at +2.0 lands behind the camera at z = 1.
        renderer.render(&scene_with(vec![quad(2.0, [1.0, 1.0, 1.0, 1.0])]));
        assert!(renderer.surface().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_out_of_range_indices_are_ignored() {
        let mut renderer = SoftwareRenderer::new(16, 16);
        let broken = Primitive {
            positions: vec![Vec3::ZERO],
            indices: vec![0, 1, 2],
            base_color: [1.0; 4],
        };
        renderer.render(&scene_with(vec![broken]));
        assert!(renderer.surface().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_resize_replaces_surface() {
        let mut renderer = SoftwareRenderer::new(8, 8);
        renderer.resize(20, 10);
        assert_eq!(renderer.surface().dimensions(), (20, 10));
    }
}
