//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use crate::source::CaptureSource;
use image::RgbImage;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// How long `start` waits for the first frame before giving up.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on a single buffer dequeue.
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Motion-JPEG, one JPEG image per buffer.
    Mjpg,
    /// Packed 24-bit RGB.
    Rgb3,
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    /// Negotiated pixel format.
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0") and request a resolution.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Ask for YUYV; webcams that only stream compressed frames negotiate MJPG instead.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"MJPG") {
            PixelFormat::Mjpg
        } else if fourcc == FourCC::new(b"RGB3") {
            PixelFormat::Rgb3
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, MJPG, or RGB3)"
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    /// Convert a raw buffer to RGB based on the negotiated format.
    fn buf_to_rgb(&self, buf: &[u8]) -> Result<RgbImage, CameraError> {
        let converted = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height),
            PixelFormat::Rgb3 => frame::rgb24_to_rgb(buf, self.width, self.height),
            PixelFormat::Mjpg => frame::mjpg_to_rgb(buf),
        };
        converted.map_err(|e| {
            CameraError::CaptureFailed(format!("{:?} conversion failed: {e}", self.pixel_format))
        })
    }

    /// Stream continuously on a dedicated thread, keeping only the newest frame.
    ///
    /// Blocks until the first frame arrives so a camera that cannot deliver
    /// fails here rather than later in the render loop.
    pub fn start(self) -> Result<CameraStream, CameraError> {
        let latest: Arc<Mutex<Option<Frame>>> = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), CameraError>>();
        let (width, height) = (self.width, self.height);
        let device_path = self.device_path.clone();

        let thread_latest = Arc::clone(&latest);
        let thread_running = Arc::clone(&running);
        let handle = std::thread::Builder::new()
            .name("tryon-capture".into())
            .spawn(move || capture_loop(self, thread_latest, thread_running, ready_tx))
            .map_err(|e| CameraError::CaptureFailed(format!("failed to spawn capture thread: {e}")))?;

        let mut stream = CameraStream {
            latest,
            running,
            handle: Some(handle),
            width,
            height,
        };

        match await_first_frame(&ready_rx, FIRST_FRAME_TIMEOUT, &device_path) {
            Ok(()) => {
                tracing::info!(device = %device_path, width, height, "camera streaming");
                Ok(stream)
            }
            Err(e) => {
                stream.stop();
                Err(e)
            }
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// Wait for the capture thread to report its first frame or its startup error.
fn await_first_frame(
    ready: &mpsc::Receiver<Result<(), CameraError>>,
    timeout: Duration,
    device_path: &str,
) -> Result<(), CameraError> {
    match ready.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(CameraError::CaptureFailed(format!(
            "no frame from {device_path} within {}s",
            timeout.as_secs_f32()
        ))),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(CameraError::CaptureFailed(format!(
            "capture thread for {device_path} exited before the first frame"
        ))),
    }
}

/// A dequeue that hit the poll timeout; the loop re-checks `running` and retries.
fn is_dequeue_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
    )
}

fn capture_loop(
    camera: Camera,
    latest: Arc<Mutex<Option<Frame>>>,
    running: Arc<AtomicBool>,
    ready: mpsc::Sender<Result<(), CameraError>>,
) {
    let mut stream = match MmapStream::with_buffers(&camera.device, BufType::VideoCapture, 4) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(CameraError::CaptureFailed(format!(
                "failed to create mmap stream: {e}"
            ))));
            return;
        }
    };
    // Bounded poll so a stalled device cannot keep the thread from seeing `running`.
    stream.set_timeout(DEQUEUE_TIMEOUT);

    let mut first = true;
    while running.load(Ordering::Relaxed) {
        let (buf, meta) = match stream.next() {
            Ok(next) => next,
            Err(e) if is_dequeue_timeout(&e) => {
                tracing::trace!(error = %e, "no buffer ready");
                continue;
            }
            Err(e) => {
                let err = CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}"));
                if first {
                    let _ = ready.send(Err(err));
                } else {
                    tracing::error!(error = %err, "capture stopped");
                }
                return;
            }
        };

        match camera.buf_to_rgb(buf) {
            Ok(image) => {
                let frame = Frame::new(image, meta.sequence);
                if let Ok(mut slot) = latest.lock() {
                    *slot = Some(frame);
                }
                if first {
                    first = false;
                    let _ = ready.send(Ok(()));
                }
            }
            Err(e) => tracing::debug!(seq = meta.sequence, error = %e, "dropping frame"),
        }
    }
    tracing::debug!("capture thread exiting");
}

/// A running capture thread. Stops when dropped.
pub struct CameraStream {
    latest: Arc<Mutex<Option<Frame>>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    pub width: u32,
    pub height: u32,
}

impl CameraStream {
    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl CaptureSource for CameraStream {
    fn current_frame(&self) -> Option<Frame> {
        self.latest.lock().ok()?.clone()
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_first_frame_timeout_is_an_error() {
        let (tx, rx) = mpsc::channel::<Result<(), CameraError>>();
        let started = Instant::now();
        let result = await_first_frame(&rx, Duration::from_millis(20), "/dev/video9");
        assert!(matches!(result, Err(CameraError::CaptureFailed(msg)) if msg.contains("/dev/video9")));
        assert!(started.elapsed() < Duration::from_secs(2));
        drop(tx);
    }

    #[test]
    fn test_first_frame_thread_exit_is_an_error() {
        let (tx, rx) = mpsc::channel::<Result<(), CameraError>>();
        drop(tx);
        let result = await_first_frame(&rx, Duration::from_secs(5), "/dev/video9");
        assert!(matches!(result, Err(CameraError::CaptureFailed(msg)) if msg.contains("exited")));
    }

    #[test]
    fn test_first_frame_forwards_startup_error() {
        let (tx, rx) = mpsc::channel();
        tx.send(Err(CameraError::StreamingNotSupported)).unwrap();
        let result = await_first_frame(&rx, Duration::from_secs(5), "/dev/video9");
        assert!(matches!(result, Err(CameraError::StreamingNotSupported)));
    }

    #[test]
    fn test_first_frame_ready() {
        let (tx, rx) = mpsc::channel();
        tx.send(Ok(())).unwrap();
        assert!(await_first_frame(&rx, Duration::from_secs(5), "/dev/video9").is_ok());
    }

    #[test]
    fn test_dequeue_timeout_is_retried() {
        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "VIDIOC_DQBUF");
        let broken = std::io::Error::new(std::io::ErrorKind::Other, "device unplugged");
        assert!(is_dequeue_timeout(&timed_out));
        assert!(!is_dequeue_timeout(&broken));
    }

    #[test]
    fn test_stop_joins_thread_watching_running_flag() {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = std::thread::spawn(move || {
            while flag.load(Ordering::Relaxed) {
                std::thread::sleep(DEQUEUE_TIMEOUT / 10);
            }
        });
        let stream = CameraStream {
            latest: Arc::new(Mutex::new(None)),
            running,
            handle: Some(handle),
            width: 2,
            height: 2,
        };
        assert!(stream.current_frame().is_none());
        let started = Instant::now();
        drop(stream);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
