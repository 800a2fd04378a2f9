//! Frames and the single-slot handoff between pipeline stages.
//!
//! - `Frame`: an owned RGB image plus its capture time. Not `Clone`; a frame
//!   has exactly one owner as it moves from capture to analysis to display.
//! - `LatestSlot<T>`: capacity-one channel. Pushing onto a full slot drops the
//!   stale value, popping blocks until a value is present. Consumers always see
//!   the newest frame and never a backlog.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

/// Box colour used for road obstacles.
pub const ROAD_BOX: Rgb<u8> = Rgb([0, 255, 0]);
/// Box colour used for cargo-bay objects.
pub const CARGO_BOX: Rgb<u8> = Rgb([0, 0, 255]);

const BOX_THICKNESS: i32 = 2;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One captured image.
pub struct Frame {
    image: RgbImage,
    captured_at: SystemTime,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: SystemTime::now(),
        }
    }

    /// Build a frame from packed RGB24 pixels.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("failed to wrap {}x{} RGB buffer", width, height))?;
        Ok(Self::new(image))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Draw a hollow box given pixel-space corners. Coordinates are clamped to
    /// the image; degenerate boxes are ignored.
    pub fn draw_box(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, color: Rgb<u8>) {
        let (width, height) = (self.width(), self.height());
        if width == 0 || height == 0 {
            return;
        }
        let max_x = (width - 1) as f32;
        let max_y = (height - 1) as f32;
        let left = x1.min(x2).clamp(0.0, max_x).round() as i32;
        let right = x1.max(x2).clamp(0.0, max_x).round() as i32;
        let top = y1.min(y2).clamp(0.0, max_y).round() as i32;
        let bottom = y1.max(y2).clamp(0.0, max_y).round() as i32;

        for inset in 0..BOX_THICKNESS {
            let w = right - left + 1 - 2 * inset;
            let h = bottom - top + 1 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(left + inset, top + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(&mut self.image, rect, color);
        }
    }

    /// Encode as baseline JPEG for the streaming sink.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.image.as_raw().len() / 8);
        JpegEncoder::new_with_quality(&mut out, quality)
            .encode_image(&self.image)
            .context("encode frame as jpeg")?;
        Ok(out)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// LatestSlot: capacity-one, overwrite-on-full channel
// ----------------------------------------------------------------------------

/// Single-slot handoff. One producer, one consumer per instance.
pub struct LatestSlot<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

/// Slot carrying frames between pipeline stages.
pub type FrameSlot = LatestSlot<Frame>;

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    // A panicking holder cannot leave the Option half-written, so poison is ignored.
    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value`, dropping whatever was waiting. Never blocks beyond the
    /// time needed to discard the stale value. Returns true if a value was
    /// displaced.
    pub fn push(&self, value: T) -> bool {
        let stale = {
            let mut slot = self.lock();
            slot.replace(value)
        };
        self.ready.notify_one();
        // Dropped outside the lock.
        let displaced = stale.is_some();
        drop(stale);
        displaced
    }

    /// Block until a value is present, then take it.
    pub fn pop(&self) -> T {
        let mut slot = self.lock();
        loop {
            if let Some(value) = slot.take() {
                return value;
            }
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like `pop`, but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        loop {
            if let Some(value) = slot.take() {
                return Some(value);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .ready
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            slot = guard;
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_overwrites_stale_value() {
        let slot = LatestSlot::new();
        assert!(!slot.push(1));
        assert!(slot.push(2));
        assert!(slot.push(3));
        assert_eq!(slot.pop(), 3);
        assert!(slot.is_empty());
    }

    #[test]
    fn pop_returns_latest_after_every_push_sequence() {
        let slot = LatestSlot::new();
        for run in 1..20u32 {
            for v in 0..run {
                slot.push(v);
            }
            assert_eq!(slot.try_pop(), Some(run - 1));
            assert_eq!(slot.try_pop(), None);
        }
    }

    #[test]
    fn pop_blocks_until_push() {
        let slot = Arc::new(LatestSlot::new());
        let producer = slot.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            producer.push("frame");
        });
        assert_eq!(slot.pop(), "frame");
        handle.join().unwrap();
    }

    #[test]
    fn pop_timeout_expires_on_empty_slot() {
        let slot: LatestSlot<u8> = LatestSlot::new();
        let start = Instant::now();
        assert_eq!(slot.pop_timeout(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn from_rgb_rejects_wrong_length() {
        assert!(Frame::from_rgb(4, 4, vec![0; 10]).is_err());
        let frame = Frame::from_rgb(4, 4, vec![0; 48]).unwrap();
        assert_eq!((frame.width(), frame.height()), (4, 4));
    }

    #[test]
    fn draw_box_clamps_and_paints_edges() {
        let mut frame = Frame::from_rgb(20, 10, vec![0; 20 * 10 * 3]).unwrap();
        frame.draw_box(-5.0, 2.0, 50.0, 7.0, ROAD_BOX);
        assert_eq!(*frame.image().get_pixel(0, 2), ROAD_BOX);
        assert_eq!(*frame.image().get_pixel(19, 7), ROAD_BOX);
        assert_eq!(*frame.image().get_pixel(1, 3), ROAD_BOX);
        assert_eq!(*frame.image().get_pixel(10, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn encode_jpeg_produces_soi_marker() {
        let frame = Frame::from_rgb(8, 8, vec![128; 8 * 8 * 3]).unwrap();
        let jpeg = frame.encode_jpeg(80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
