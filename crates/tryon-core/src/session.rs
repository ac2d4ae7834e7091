//! Per-session state shared by UI handlers and the alignment loop.

use crate::adjustment::{Controls, DragState, ManualAdjustment, PointerEvent, SliderId, UiEvent, Viewport};
use crate::alignment;
use crate::scene::{OverlayObject, Scene};
use crate::types::{DetectionResults, FaceKeypoints};

/// What one detection pass did to the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentOutcome {
    Updated,
    OverlayNotLoaded,
    NoFace,
    InsufficientLandmarks(usize),
    /// The capture source had no frame yet; nothing was detected.
    NoFrame,
}

/// Scene plus user adjustments. Owned by the loop and mutated only between cycles.
#[derive(Debug, Clone)]
pub struct Session {
    pub scene: Scene,
    pub adjustment: ManualAdjustment,
    pub controls: Controls,
    pub drag: DragState,
}

impl Session {
    pub fn new(viewport: Viewport) -> Self {
        let controls = Controls::default();
        let adjustment = ManualAdjustment {
            scale: controls.scale.value(),
            ..ManualAdjustment::default()
        };
        Self {
            scene: Scene::new(viewport.width, viewport.height),
            adjustment,
            controls,
            drag: DragState::default(),
        }
    }

    pub fn overlay_loaded(&self) -> bool {
        self.scene.overlay.is_some()
    }

    /// Install the loaded overlay. Later loads replace earlier ones.
    pub fn set_overlay(&mut self, overlay: OverlayObject) {
        tracing::info!(triangles = overlay.mesh.triangle_count(), "overlay attached to scene");
        self.scene.overlay = Some(overlay);
    }

    /// Update the overlay transform from a detection pass.
    pub fn apply_detection(&mut self, results: &DetectionResults) -> AlignmentOutcome {
        let Some(overlay) = self.scene.overlay.as_mut() else {
            return AlignmentOutcome::OverlayNotLoaded;
        };
        let Some(face) = results.primary() else {
            return AlignmentOutcome::NoFace;
        };
        let Some(keypoints) = FaceKeypoints::from_landmarks(face) else {
            return AlignmentOutcome::InsufficientLandmarks(face.len());
        };
        alignment::align(&mut overlay.transform, &keypoints, &self.adjustment);
        AlignmentOutcome::Updated
    }

    /// Apply a UI event. Screenshot requests are not session state and are ignored here.
    pub fn handle(&mut self, event: &UiEvent, viewport: Viewport) {
        match event {
            UiEvent::SliderInput(id, value) => {
                let value = self.controls.slider_mut(*id).set(*value);
                self.apply_slider(*id, value);
            }
            UiEvent::Nudge(id, steps) => {
                let value = self.controls.slider_mut(*id).nudge(*steps);
                self.apply_slider(*id, value);
            }
            UiEvent::Reset => self.reset(),
            UiEvent::Pointer(pointer) => self.handle_pointer(pointer, viewport),
            UiEvent::Screenshot => {}
        }
    }

    fn apply_slider(&mut self, id: SliderId, value: f32) {
        match id {
            SliderId::Scale => {
                self.adjustment.scale = value;
                // Scale shows up right away; rotation waits for the next detection.
                if let Some(overlay) = self.scene.overlay.as_mut() {
                    overlay.transform.set_uniform_scale(value);
                }
            }
            SliderId::RotationY => self.adjustment.rotation_y = value,
            SliderId::RotationZ => self.adjustment.rotation_z = value,
        }
    }

    fn reset(&mut self) {
        self.adjustment.reset();
        self.controls.rotation_y.reset();
        self.controls.rotation_z.reset();
        tracing::debug!(scale = self.adjustment.scale, "manual adjustment reset");
    }

    fn handle_pointer(&mut self, pointer: &PointerEvent, viewport: Viewport) {
        match pointer {
            PointerEvent::Down(input) => {
                if let Some((x, y)) = input.position() {
                    self.drag.start(x, y);
                }
            }
            PointerEvent::Move(input) => {
                if let Some((x, y)) = input.position() {
                    self.drag.update(x, y, viewport, &mut self.adjustment.offset);
                }
            }
            PointerEvent::Up => self.drag.end(),
        }
    }
}
