//! Native window frontend built on minifb.

use crate::engine::EngineError;
use crate::frontend::Frontend;
use image::{RgbImage, RgbaImage};
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, WindowOptions};
use tryon_core::export;
use tryon_core::{PointerEvent, PointerInput, SliderId, UiEvent, Viewport};

pub struct Window {
    window: minifb::Window,
    buffer: Vec<u32>,
    viewport: Viewport,
    mouse_down: bool,
    last_mouse: Option<(f32, f32)>,
}

impl Window {
    pub fn new(title: &str, viewport: Viewport) -> Result<Self, EngineError> {
        let (width, height) = (viewport.width as usize, viewport.height as usize);
        let window = minifb::Window::new(title, width, height, WindowOptions::default())
            .map_err(|e| EngineError::Frontend(format!("failed to create window: {e}")))?;

        tracing::info!(width, height, "window opened");
        Ok(Self {
            window,
            buffer: vec![0; width * height],
            viewport,
            mouse_down: false,
            last_mouse: None,
        })
    }

    fn pointer_event(&mut self) -> Option<UiEvent> {
        let down = self.window.get_mouse_down(MouseButton::Left);
        let position = self.window.get_mouse_pos(MouseMode::Discard);
        let (event, dragging) = pointer_transition(self.mouse_down, down, position, self.last_mouse);
        self.mouse_down = dragging;
        if position.is_some() {
            self.last_mouse = position;
        }
        event
    }
}

/// Turn one mouse sample into a pointer event and the new drag flag.
///
/// The button only counts while the cursor is over the window: holding it
/// outside does nothing, and carrying a held button into the window starts
/// a drag at the entry point.
fn pointer_transition(
    was_down: bool,
    down: bool,
    position: Option<(f32, f32)>,
    last: Option<(f32, f32)>,
) -> (Option<UiEvent>, bool) {
    match (was_down, down, position) {
        (false, true, Some((x, y))) => (
            Some(UiEvent::Pointer(PointerEvent::Down(PointerInput::Mouse { x, y }))),
            true,
        ),
        (true, true, Some((x, y))) if last != Some((x, y)) => (
            Some(UiEvent::Pointer(PointerEvent::Move(PointerInput::Mouse { x, y }))),
            true,
        ),
        (true, false, _) => (Some(UiEvent::Pointer(PointerEvent::Up)), false),
        (was_down, down, _) => (None, was_down && down),
    }
}

impl Frontend for Window {
    fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn present(&mut self, video: &RgbImage, overlay: &RgbaImage) -> Result<(), EngineError> {
        let composed = export::compose(video, overlay);
        let (width, height) = (composed.width() as usize, composed.height() as usize);
        self.buffer.resize(width * height, 0);
        for (dst, px) in self.buffer.iter_mut().zip(composed.pixels()) {
            let [r, g, b, _] = px.0;
            *dst = (r as u32) << 16 | (g as u32) << 8 | b as u32;
        }
        self.window
            .update_with_buffer(&self.buffer, width, height)
            .map_err(|e| EngineError::Frontend(e.to_string()))
    }

    fn poll_input(&mut self) -> Vec<UiEvent> {
        let mut events: Vec<UiEvent> = self
            .window
            .get_keys_pressed(KeyRepeat::Yes)
            .into_iter()
            .filter_map(key_event)
            .collect();
        events.extend(self.pointer_event());
        events
    }
}

fn key_event(key: Key) -> Option<UiEvent> {
    let event = match key {
        Key::Equal | Key::NumPadPlus => UiEvent::Nudge(SliderId::Scale, 1),
        Key::Minus | Key::NumPadMinus => UiEvent::Nudge(SliderId::Scale, -1),
        Key::A => UiEvent::Nudge(SliderId::RotationY, -1),
        Key::D => UiEvent::Nudge(SliderId::RotationY, 1),
        Key::Q => UiEvent::Nudge(SliderId::RotationZ, -1),
        Key::E => UiEvent::Nudge(SliderId::RotationZ, 1),
        Key::R => UiEvent::Reset,
        Key::S | Key::Space => UiEvent::Screenshot,
        _ => return None,
    };
    Some(event)
}
