use crate::frontend::Frontend;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tryon_core::export::{self, ExportError};
use tryon_core::{
    AlignmentOutcome, DetectionResults, LandmarkDetector, OverlayObject, Renderer, Session, UiEvent,
    Viewport,
};
use tryon_hw::CaptureSource;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("frontend error: {0}")]
    Frontend(String),
    #[error("export error: {0}")]
    Export(#[from] ExportError),
    #[error("no frame captured yet")]
    NoFrame,
    #[error("engine loop exited")]
    ChannelClosed,
}

/// Messages sent from UI handlers and background loaders to the loop.
#[derive(Debug)]
pub enum EngineRequest {
    Ui(UiEvent),
    OverlayLoaded(OverlayObject),
}

/// Clone-safe handle to the engine loop.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineRequest>,
}

impl EngineHandle {
    pub fn send_ui(&self, event: UiEvent) -> Result<(), EngineError> {
        self.tx
            .send(EngineRequest::Ui(event))
            .map_err(|_| EngineError::ChannelClosed)
    }

    pub fn overlay_loaded(&self, overlay: OverlayObject) -> Result<(), EngineError> {
        self.tx
            .send(EngineRequest::OverlayLoaded(overlay))
            .map_err(|_| EngineError::ChannelClosed)
    }
}

/// The detection/render loop.
///
/// Owns the session; UI events and loaded assets arrive through
/// [`EngineHandle`] or the frontend and are applied between cycles.
pub struct Engine<C, D, R, F> {
    source: C,
    detector: D,
    renderer: R,
    frontend: F,
    session: Session,
    requests: mpsc::UnboundedReceiver<EngineRequest>,
    screenshot_dir: PathBuf,
    frame_interval: Duration,
    viewport: Viewport,
    last_frame: Option<RgbImage>,
}

impl<C, D, R, F> Engine<C, D, R, F>
where
    C: CaptureSource,
    D: LandmarkDetector,
    R: Renderer,
    F: Frontend,
{
    pub fn new(
        source: C,
        detector: D,
        mut renderer: R,
        frontend: F,
        screenshot_dir: &Path,
        target_fps: u32,
    ) -> (Self, EngineHandle) {
        let viewport = frontend.viewport();
        renderer.resize(viewport.width, viewport.height);
        let (tx, requests) = mpsc::unbounded_channel();
        let engine = Self {
            source,
            detector,
            renderer,
            frontend,
            session: Session::new(viewport),
            requests,
            screenshot_dir: screenshot_dir.to_path_buf(),
            frame_interval: Duration::from_secs_f64(1.0 / f64::from(target_fps.max(1))),
            viewport,
            last_frame: None,
        };
        (engine, EngineHandle { tx })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    #[cfg(test)]
    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    /// Run cycles until the frontend closes.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            width = self.viewport.width,
            height = self.viewport.height,
            interval_ms = self.frame_interval.as_millis() as u64,
            "engine loop started"
        );
        let mut cycles: u64 = 0;
        while self.frontend.is_open() {
            ticker.tick().await;
            self.cycle().await?;
            cycles += 1;
        }
        tracing::info!(cycles, "engine loop exiting");
        Ok(())
    }

    /// One detection cycle: capture, detect, align, render, present, then apply input.
    ///
    /// The scene is rendered every cycle. Without a new frame the previous one
    /// is presented again, if there is one.
    pub async fn cycle(&mut self) -> Result<AlignmentOutcome, EngineError> {
        self.drain_requests();
        self.sync_viewport();

        let outcome = match self.source.current_frame() {
            Some(frame) => {
                let results = match self.detector.process(&frame.image).await {
                    Ok(results) => results,
                    Err(e) => {
                        tracing::warn!(seq = frame.sequence, error = %e, "landmark detection failed");
                        DetectionResults::empty()
                    }
                };
                let outcome = self.session.apply_detection(&results);
                log_outcome(frame.sequence, outcome);
                self.last_frame = Some(frame.image);
                outcome
            }
            None => {
                tracing::trace!("no frame available");
                AlignmentOutcome::NoFrame
            }
        };

        self.renderer.render(&self.session.scene);
        if let Some(video) = self.last_frame.as_ref() {
            self.frontend.present(video, self.renderer.surface())?;
        }

        self.apply_input();
        Ok(outcome)
    }

    /// Compose the last presented frame with the overlay surface and save it.
    pub fn screenshot(&self) -> Result<PathBuf, EngineError> {
        let video = self.last_frame.as_ref().ok_or(EngineError::NoFrame)?;
        Ok(export::save_screenshot(video, self.renderer.surface(), &self.screenshot_dir)?)
    }

    fn drain_requests(&mut self) {
        while let Ok(request) = self.requests.try_recv() {
            match request {
                EngineRequest::Ui(event) => self.dispatch(event),
                EngineRequest::OverlayLoaded(overlay) => self.session.set_overlay(overlay),
            }
        }
    }

    fn apply_input(&mut self) {
        for event in self.frontend.poll_input() {
            self.dispatch(event);
        }
    }

    fn dispatch(&mut self, event: UiEvent) {
        match event {
            UiEvent::Screenshot => {
                if let Err(e) = self.screenshot() {
                    tracing::warn!(error = %e, "screenshot failed");
                }
            }
            other => self.session.handle(&other, self.viewport),
        }
    }

    fn sync_viewport(&mut self) {
        let viewport = self.frontend.viewport();
        if viewport == self.viewport || viewport.width == 0 || viewport.height == 0 {
            return;
        }
        tracing::debug!(width = viewport.width, height = viewport.height, "viewport resized");
        self.renderer.resize(viewport.width, viewport.height);
        self.session.scene.camera.aspect = viewport.width as f32 / viewport.height as f32;
        self.viewport = viewport;
    }
}

fn log_outcome(seq: u32, outcome: AlignmentOutcome) {
    match outcome {
        AlignmentOutcome::Updated => tracing::trace!(seq, "overlay aligned"),
        AlignmentOutcome::InsufficientLandmarks(count) => {
            tracing::debug!(seq, count, "too few landmarks, overlay unchanged")
        }
        AlignmentOutcome::NoFace | AlignmentOutcome::OverlayNotLoaded | AlignmentOutcome::NoFrame => {
            tracing::trace!(seq, ?outcome, "overlay unchanged")
        }
    }
}

/// Load the overlay asset in the background and hand it to the loop.
///
/// A failed load only logs; the loop keeps running without an overlay.
pub fn spawn_asset_load(path: PathBuf, handle: EngineHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let display = path.display().to_string();
        let loaded = tokio::task::spawn_blocking(move || tryon_core::loader::load_mesh(&path)).await;
        match loaded {
            Ok(Ok(mesh)) => {
                if handle.overlay_loaded(OverlayObject::new(mesh)).is_err() {
                    tracing::debug!(path = %display, "engine gone before overlay arrived");
                }
            }
            Ok(Err(e)) => tracing::warn!(path = %display, error = %e, "overlay asset failed to load"),
            Err(e) => tracing::warn!(path = %display, error = %e, "overlay load task failed"),
        }
    })
}
