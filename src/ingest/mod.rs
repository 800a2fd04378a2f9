//! Frame sources.
//!
//! A `FrameSource` is one open camera handle. Sources are opened through a
//! `SourceOpener`, which picks the driver from the device string:
//! - `stub://<name>`: synthetic frames (testing)
//! - `http://` / `https://`: MJPEG or JPEG-snapshot IP cameras
//! - device paths such as `/dev/video0` (feature: ingest-v4l2)
//!
//! A camera that cannot be opened degrades to `UnavailableSource`, whose reads
//! always fail. Capture workers treat those failures as transient, so a
//! missing camera never stops the process.

pub mod mjpeg;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};

use crate::config::CameraSettings;
use crate::frame::Frame;

pub use mjpeg::HttpCameraSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// One open camera handle.
pub trait FrameSource: Send {
    fn name(&self) -> &str;

    /// Capture one frame. Errors are per-read and not fatal to the source.
    fn read_frame(&mut self) -> Result<Frame>;

    /// Release the underlying device. Idempotent; dropping the source also
    /// releases it.
    fn release(&mut self) {}
}

/// Opens sources for camera settings.
pub trait SourceOpener: Send + Sync {
    fn open(&self, camera: &CameraSettings) -> Box<dyn FrameSource>;
}

/// Opener for real devices, falling back to `UnavailableSource`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceOpener;

impl DeviceOpener {
    pub fn new() -> Self {
        Self
    }
}

impl SourceOpener for DeviceOpener {
    fn open(&self, camera: &CameraSettings) -> Box<dyn FrameSource> {
        match open_device(camera) {
            Ok(source) => source,
            Err(err) => {
                log::warn!("camera {} unavailable: {:#}", camera.device, err);
                Box::new(UnavailableSource::new(&camera.device))
            }
        }
    }
}

fn open_device(camera: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let device = camera.device.as_str();
    if device.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(device)));
    }
    if device.starts_with("http://") || device.starts_with("https://") {
        return Ok(Box::new(HttpCameraSource::open(device)?));
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Source::open(camera)?))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(anyhow!(
            "device {} requires the ingest-v4l2 feature",
            device
        ))
    }
}

/// Stand-in for a camera that could not be opened.
pub struct UnavailableSource {
    name: String,
}

impl UnavailableSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl FrameSource for UnavailableSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_frame(&mut self) -> Result<Frame> {
        Err(anyhow!("camera {} unavailable", self.name))
    }
}
