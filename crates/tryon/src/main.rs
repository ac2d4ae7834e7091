use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tryon_core::{
    FaceKeypoints, FaceMeshDetector, LandmarkDetector, OverlayObject, SliderId, SoftwareRenderer, UiEvent,
    Viewport,
};
use tryon_hw::{Camera, CaptureSource, StillSource};

mod config;
mod engine;
mod frontend;
mod window;

use config::Config;
use engine::Engine;
use frontend::Headless;

#[derive(Parser)]
#[command(name = "tryon", about = "Eyewear try-on with webcam face tracking")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the try-on window
    Run {
        /// V4L2 device (e.g., /dev/video0)
        #[arg(short, long)]
        device: Option<String>,
        /// Use a still image instead of the camera
        #[arg(short, long)]
        image: Option<PathBuf>,
        /// Eyewear glTF/GLB asset
        #[arg(short, long)]
        asset: Option<PathBuf>,
        /// Face landmark ONNX model
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
    /// Fit the overlay to a still image and save a screenshot
    Snapshot {
        #[arg(short, long)]
        image: PathBuf,
        /// Output directory (default: screenshot_dir from config)
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[arg(short, long)]
        asset: Option<PathBuf>,
        #[arg(short, long)]
        model: Option<PathBuf>,
        /// Overlay scale, as the scale slider
        #[arg(long)]
        scale: Option<f32>,
        /// Extra yaw in radians
        #[arg(long, allow_hyphen_values = true)]
        rotate_y: Option<f32>,
        /// Extra roll in radians
        #[arg(long, allow_hyphen_values = true)]
        rotate_z: Option<f32>,
    },
    /// Run the detector on an image and print keypoints as JSON
    Detect {
        #[arg(short, long)]
        image: PathBuf,
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
    /// List V4L2 capture devices
    Devices,
    /// Print an example configuration file
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            device,
            image,
            asset,
            model,
        } => {
            let mut config = Config::load(cli.config.as_deref())?;
            if let Some(device) = device {
                config.camera_device = device;
            }
            override_paths(&mut config, asset, model);
            let detector = load_detector(&config)?;

            match image {
                Some(path) => {
                    let source = StillSource::open(&path)
                        .with_context(|| format!("failed to open {}", path.display()))?;
                    run_window(source, detector, &config).await?;
                }
                None => {
                    let stream = Camera::open(&config.camera_device, config.capture_width, config.capture_height)
                        .and_then(Camera::start)
                        .with_context(|| format!("camera {} unavailable", config.camera_device))?;
                    run_window(stream, detector, &config).await?;
                }
            }
        }
        Commands::Snapshot {
            image,
            out,
            asset,
            model,
            scale,
            rotate_y,
            rotate_z,
        } => {
            let mut config = Config::load(cli.config.as_deref())?;
            override_paths(&mut config, asset, model);
            if let Some(out) = out {
                config.screenshot_dir = out;
            }
            let adjustments = slider_overrides(scale, rotate_y, rotate_z);
            let path = snapshot(&image, &config, adjustments).await?;
            println!("{}", path.display());
        }
        Commands::Detect { image, model } => {
            let mut config = Config::load(cli.config.as_deref())?;
            override_paths(&mut config, None, model);
            let mut detector = load_detector(&config)?;
            let frame = image::open(&image)
                .with_context(|| format!("failed to open {}", image.display()))?
                .to_rgb8();
            let results = detector.process(&frame).await?;

            let report = match results.primary() {
                Some(face) => serde_json::json!({
                    "faces": results.faces.len(),
                    "landmarks": face.len(),
                    "keypoints": FaceKeypoints::from_landmarks(face),
                }),
                None => serde_json::json!({ "faces": 0 }),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}\t{} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Config => print!("{}", config::EXAMPLE_CONFIG),
    }

    Ok(())
}

fn override_paths(config: &mut Config, asset: Option<PathBuf>, model: Option<PathBuf>) {
    if let Some(asset) = asset {
        config.asset_path = asset;
    }
    if let Some(model) = model {
        config.model_path = model;
    }
}

/// Slider events for the adjustment flags that were given.
fn slider_overrides(scale: Option<f32>, rotate_y: Option<f32>, rotate_z: Option<f32>) -> Vec<UiEvent> {
    [
        (SliderId::Scale, scale),
        (SliderId::RotationY, rotate_y),
        (SliderId::RotationZ, rotate_z),
    ]
    .into_iter()
    .filter_map(|(id, value)| value.map(|v| UiEvent::SliderInput(id, v)))
    .collect()
}

fn load_detector(config: &Config) -> Result<FaceMeshDetector> {
    let detector = FaceMeshDetector::load(
        &config.model_path.to_string_lossy(),
        config.detector,
        config.input_layout,
    )?;
    Ok(detector)
}

/// Run the interactive loop until the window closes or Ctrl-C.
async fn run_window<C: CaptureSource>(source: C, detector: FaceMeshDetector, config: &Config) -> Result<()> {
    let viewport = Viewport::new(config.viewport_width, config.viewport_height);
    let window = window::Window::new("tryon", viewport)?;
    let renderer = SoftwareRenderer::new(viewport.width, viewport.height);
    let (mut engine, handle) = Engine::new(
        source,
        detector,
        renderer,
        window,
        &config.screenshot_dir,
        config.target_fps,
    );
    engine::spawn_asset_load(config.asset_path.clone(), handle);

    tokio::select! {
        result = engine.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
    }
    tracing::info!("tryon shutting down");
    Ok(())
}

/// One cycle on a still image, sized to the image, then a screenshot.
///
/// `adjustments` are applied after the overlay is attached and before detection.
async fn snapshot(image_path: &Path, config: &Config, adjustments: Vec<UiEvent>) -> Result<PathBuf> {
    let frame = image::open(image_path)
        .with_context(|| format!("failed to open {}", image_path.display()))?
        .to_rgb8();
    let viewport = Viewport::new(frame.width(), frame.height());
    let detector = load_detector(config)?;

    let (mut engine, handle) = Engine::new(
        StillSource::from_image(frame),
        detector,
        SoftwareRenderer::new(viewport.width, viewport.height),
        Headless::new(viewport, Some(1)),
        &config.screenshot_dir,
        config.target_fps,
    );

    match tryon_core::loader::load_mesh(&config.asset_path) {
        Ok(mesh) => handle.overlay_loaded(OverlayObject::new(mesh))?,
        Err(e) => tracing::warn!(path = %config.asset_path.display(), error = %e, "overlay asset failed to load"),
    }

    for event in adjustments {
        handle.send_ui(event)?;
    }

    let outcome = engine.cycle().await?;
    tracing::info!(
        ?outcome,
        transform = ?engine.session().scene.overlay_transform(),
        "snapshot cycle finished"
    );
    Ok(engine.screenshot()?)
}
