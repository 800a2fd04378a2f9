//! V4L2 camera source (feature `ingest-v4l2`).
//!
//! Opens a local device node such as `/dev/video0`, requests RGB24 at the
//! configured rate and hands out each captured buffer as a `Frame`. The
//! device is closed when the source is released or dropped.

use anyhow::{Context, Result};
use ouroboros::self_referencing;

use super::FrameSource;
use crate::config::CameraSettings;
use crate::frame::Frame;

const PREFERRED_WIDTH: u32 = 640;
const PREFERRED_HEIGHT: u32 = 480;

pub struct V4l2Source {
    device: String,
    state: Option<V4l2State>,
    width: u32,
    height: u32,
    frame_count: u64,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn open(camera: &CameraSettings) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&camera.device)
            .with_context(|| format!("open v4l2 device {}", camera.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = PREFERRED_WIDTH;
        format.height = PREFERRED_HEIGHT;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    camera.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        let params = v4l::video::capture::Parameters::with_fps(camera.fps);
        if let Err(err) = device.set_params(&params) {
            log::warn!(
                "V4l2Source: failed to set fps on {}: {}",
                camera.device,
                err
            );
        }

        let state = V4l2StateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Source: opened {} ({}x{})",
            camera.device,
            format.width,
            format.height
        );
        Ok(Self {
            device: camera.device.clone(),
            state: Some(state),
            width: format.width,
            height: format.height,
            frame_count: 0,
        })
    }
}

impl FrameSource for V4l2Source {
    fn name(&self) -> &str {
        &self.device
    }

    fn read_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device released")?;
        let pixels = state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .context("capture v4l2 frame")?;
        self.frame_count += 1;
        Frame::from_rgb(self.width, self.height, pixels)
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "V4l2Source: released {} after {} frames",
                self.device,
                self.frame_count
            );
        }
    }
}
