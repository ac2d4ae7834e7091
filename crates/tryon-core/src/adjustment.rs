//! Manual fit adjustments driven by UI input.
//!
//! Sliders hold the displayed control values; [`ManualAdjustment`] holds what
//! the alignment reads. Drag input moves the overlay offset relative to the
//! last pointer position.

use glam::Vec3;

pub const DEFAULT_SCALE: f32 = 0.85;
const SCALE_RANGE: (f32, f32) = (0.1, 2.0);
const SCALE_STEP: f32 = 0.01;
const ROTATION_RANGE: (f32, f32) = (-1.0, 1.0);
const ROTATION_STEP: f32 = 0.01;

/// User corrections layered on top of the inferred head pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManualAdjustment {
    pub offset: Vec3,
    pub rotation_y: f32,
    pub rotation_z: f32,
    pub scale: f32,
}

impl Default for ManualAdjustment {
    fn default() -> Self {
        Self {
            offset: Vec3::ZERO,
            rotation_y: 0.0,
            rotation_z: 0.0,
            scale: DEFAULT_SCALE,
        }
    }
}

impl ManualAdjustment {
    /// Clear offset and rotations. Scale is kept.
    pub fn reset(&mut self) {
        self.offset = Vec3::ZERO;
        self.rotation_y = 0.0;
        self.rotation_z = 0.0;
    }
}

/// A bounded numeric input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slider {
    min: f32,
    max: f32,
    step: f32,
    default: f32,
    value: f32,
}

impl Slider {
    pub fn new(min: f32, max: f32, step: f32, default: f32) -> Self {
        let default = default.clamp(min, max);
        Self { min, max, step, default, value: default }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn range(&self) -> (f32, f32) {
        (self.min, self.max)
    }

    /// Set the value, clamped to the range. Non-finite input is ignored.
    pub fn set(&mut self, value: f32) -> f32 {
        if value.is_finite() {
            self.value = value.clamp(self.min, self.max);
        }
        self.value
    }

    /// Move by `steps` increments.
    pub fn nudge(&mut self, steps: i32) -> f32 {
        self.set(self.value + steps as f32 * self.step)
    }

    pub fn reset(&mut self) -> f32 {
        self.value = self.default;
        self.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SliderId {
    Scale,
    RotationY,
    RotationZ,
}

/// The three fit sliders.
#[derive(Debug, Clone, PartialEq)]
pub struct Controls {
    pub scale: Slider,
    pub rotation_y: Slider,
    pub rotation_z: Slider,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            scale: Slider::new(SCALE_RANGE.0, SCALE_RANGE.1, SCALE_STEP, DEFAULT_SCALE),
            rotation_y: Slider::new(ROTATION_RANGE.0, ROTATION_RANGE.1, ROTATION_STEP, 0.0),
            rotation_z: Slider::new(ROTATION_RANGE.0, ROTATION_RANGE.1, ROTATION_STEP, 0.0),
        }
    }
}

impl Controls {
    pub fn slider_mut(&mut self, id: SliderId) -> &mut Slider {
        match id {
            SliderId::Scale => &mut self.scale,
            SliderId::RotationY => &mut self.rotation_y,
            SliderId::RotationZ => &mut self.rotation_z,
        }
    }
}

/// Pointer position source. Touch input only ever reads the first touch.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerInput {
    Mouse { x: f32, y: f32 },
    Touch(Vec<(f32, f32)>),
}

impl PointerInput {
    pub fn position(&self) -> Option<(f32, f32)> {
        match self {
            PointerInput::Mouse { x, y } => Some((*x, *y)),
            PointerInput::Touch(touches) => touches.first().copied(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    Down(PointerInput),
    Move(PointerInput),
    Up,
}

/// Everything the UI can ask of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    SliderInput(SliderId, f32),
    Nudge(SliderId, i32),
    Reset,
    Pointer(PointerEvent),
    Screenshot,
}

/// Pixel dimensions of the surface pointer coordinates refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// In-progress drag, from press to release.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DragState {
    pub dragging: bool,
    pub last: (f32, f32),
}

impl DragState {
    pub fn start(&mut self, x: f32, y: f32) {
        self.dragging = true;
        self.last = (x, y);
    }

    /// Accumulate pointer motion into `offset`.
    ///
    /// Screen-down motion lowers `offset.y` since scene Y grows upward.
    /// Returns false when no drag is active.
    pub fn update(&mut self, x: f32, y: f32, viewport: Viewport, offset: &mut Vec3) -> bool {
        if !self.dragging || viewport.width == 0 || viewport.height == 0 {
            return false;
        }
        let dx = (x - self.last.0) / viewport.width as f32;
        let dy = (y - self.last.1) / viewport.height as f32;
        offset.x += dx;
        offset.y -= dy;
        self.last = (x, y);
        true
    }

    pub fn end(&mut self) {
        self.dragging = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_keeps_scale() {
        let mut adj = ManualAdjustment {
            offset: Vec3::new(0.1, -0.2, 0.3),
            rotation_y: 0.4,
            rotation_z: -0.5,
            scale: 1.3,
        };
        adj.reset();
        assert_eq!(adj.offset, Vec3::ZERO);
        assert_eq!(adj.rotation_y, 0.0);
        assert_eq!(adj.rotation_z, 0.0);
        assert_eq!(adj.scale, 1.3);
    }

    #[test]
    fn test_slider_clamps_to_range() {
        let mut s = Slider::new(-1.0, 1.0, 0.1, 0.0);
        assert_eq!(s.set(5.0), 1.0);
        assert_eq!(s.set(-5.0), -1.0);
        assert_eq!(s.set(0.25), 0.25);
    }

    #[test]
    fn test_slider_ignores_nan() {
        let mut s = Slider::new(0.0, 1.0, 0.1, 0.5);
        assert_eq!(s.set(f32::NAN), 0.5);
    }

    #[test]
    fn test_slider_nudge_and_reset() {
        let mut s = Slider::new(0.0, 1.0, 0.25, 0.5);
        assert_eq!(s.nudge(1), 0.75);
        assert_eq!(s.nudge(4), 1.0);
        assert_eq!(s.reset(), 0.5);
    }

    #[test]
    fn test_default_controls_match_adjustment_defaults() {
        let controls = Controls::default();
        let adj = ManualAdjustment::default();
        assert_eq!(controls.scale.value(), adj.scale);
        assert_eq!(controls.rotation_y.value(), adj.rotation_y);
        assert_eq!(controls.rotation_z.value(), adj.rotation_z);
    }

    #[test]
    fn test_drag_moves_offset_relative_to_viewport() {
        let viewport = Viewport::new(1000, 800);
        let mut drag = DragState::default();
        let mut offset = Vec3::ZERO;

        drag.start(100.0, 100.0);
        assert!(drag.update(150.0, 130.0, viewport, &mut offset));

        assert!((offset.x - 0.05).abs() < 1e-6, "x = {}", offset.x);
        assert!((offset.y + 0.0375).abs() < 1e-6, "y = {}", offset.y);
        assert_eq!(drag.last, (150.0, 130.0));
    }

    #[test]
    fn test_drag_is_incremental() {
        let viewport = Viewport::new(1000, 1000);
        let mut drag = DragState::default();
        let mut offset = Vec3::ZERO;

        drag.start(0.0, 0.0);
        drag.update(100.0, 0.0, viewport, &mut offset);
        drag.update(200.0, 0.0, viewport, &mut offset);
        assert!((offset.x - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_move_without_press_is_ignored() {
        let mut drag = DragState::default();
        let mut offset = Vec3::ZERO;
        assert!(!drag.update(50.0, 50.0, Viewport::new(100, 100), &mut offset));
        assert_eq!(offset, Vec3::ZERO);
    }

    #[test]
    fn test_release_stops_drag() {
        let mut drag = DragState::default();
        let mut offset = Vec3::ZERO;
        drag.start(0.0, 0.0);
        drag.end();
        assert!(!drag.update(10.0, 10.0, Viewport::new(100, 100), &mut offset));
        assert_eq!(offset, Vec3::ZERO);
    }

    #[test]
    fn test_touch_reads_first_point_only() {
        let touch = PointerInput::Touch(vec![(1.0, 2.0), (30.0, 40.0)]);
        assert_eq!(touch.position(), Some((1.0, 2.0)));
        assert_eq!(PointerInput::Touch(Vec::new()).position(), None);
    }
}
