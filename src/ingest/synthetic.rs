//! Synthetic frame source for `stub://` devices.
//!
//! Produces a moving RGB gradient so that downstream stages see frames that
//! change over time. Always available; used by tests and bench setups without
//! cameras attached.

use anyhow::Result;

use super::FrameSource;
use crate::frame::Frame;

const SYNTHETIC_WIDTH: u32 = 320;
const SYNTHETIC_HEIGHT: u32 = 240;

pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_size(name, SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT)
    }

    pub fn with_size(name: impl Into<String>, width: u32, height: u32) -> Self {
        let name = name.into();
        log::info!("SyntheticSource: opened {} ({}x{})", name, width, height);
        Self {
            name,
            width,
            height,
            frame_count: 0,
        }
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let mut pixels = vec![0u8; rgb_len(self.width, self.height)];
        let shift = self.frame_count;
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 / 3 + shift * 4) % 256) as u8;
        }
        pixels
    }
}

/// Byte length of a packed RGB buffer, computed in `usize`.
fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        Frame::from_rgb(self.width, self.height, self.generate_pixels())
    }
}
