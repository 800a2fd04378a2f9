//! HTTP camera source.
//!
//! Pulls frames from IP cameras that serve either a multipart MJPEG stream or
//! a single JPEG per request. JPEGs are decoded in memory with `image`.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::Duration;

use super::FrameSource;
use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpCameraSource {
    url: String,
    agent: ureq::Agent,
    stream: Option<HttpStream>,
    frame_count: u64,
}

enum HttpStream {
    Mjpeg(MjpegStream),
    SingleJpeg,
}

impl HttpCameraSource {
    /// Connect to the camera. Fails if the first request fails.
    pub fn open(url: &str) -> Result<Self> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();
        let mut source = Self {
            url: url.to_string(),
            agent,
            stream: None,
            frame_count: 0,
        };
        source.connect()?;
        Ok(source)
    }

    fn connect(&mut self) -> Result<()> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .with_context(|| format!("connect to camera stream {}", self.url))?;
        let content_type = response.header("Content-Type").unwrap_or("");
        if content_type.to_lowercase().contains("multipart") {
            self.stream = Some(HttpStream::Mjpeg(MjpegStream::new(Box::new(
                response.into_reader(),
            ))));
        } else {
            self.stream = Some(HttpStream::SingleJpeg);
        }
        log::info!("HttpCameraSource: connected to {}", self.url);
        Ok(())
    }

    fn fetch_single_jpeg(&self) -> Result<Vec<u8>> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .with_context(|| format!("fetch jpeg snapshot from {}", self.url))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_JPEG_BYTES as u64)
            .read_to_end(&mut bytes)
            .context("read jpeg snapshot")?;
        if bytes.is_empty() {
            return Err(anyhow!("empty jpeg snapshot"));
        }
        Ok(bytes)
    }
}

impl FrameSource for HttpCameraSource {
    fn name(&self) -> &str {
        &self.url
    }

    fn read_frame(&mut self) -> Result<Frame> {
        if self.stream.is_none() {
            self.connect()?;
        }
        let jpeg_bytes = match self.stream.as_mut() {
            Some(HttpStream::Mjpeg(stream)) => match stream.read_next_jpeg() {
                Ok(bytes) => bytes,
                Err(err) => {
                    // Reconnect on the next read.
                    self.stream = None;
                    return Err(err);
                }
            },
            Some(HttpStream::SingleJpeg) => self.fetch_single_jpeg()?,
            None => return Err(anyhow!("camera stream {} not connected", self.url)),
        };
        let image = image::load_from_memory(&jpeg_bytes)
            .context("decode jpeg")?
            .into_rgb8();
        self.frame_count += 1;
        Ok(Frame::new(image))
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            log::info!(
                "HttpCameraSource: released {} after {} frames",
                self.url,
                self.frame_count
            );
        }
    }
}

struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn read_next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(frame);
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Err(anyhow!("mjpeg stream ended"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

/// Locate the first complete JPEG (SOI .. EOI) in `buffer`.
fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn finds_jpeg_between_multipart_headers() {
        let mut data = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        data.extend_from_slice(&[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);
        data.extend_from_slice(b"\r\n--frame");
        let (start, end) = find_jpeg_bounds(&data).unwrap();
        assert_eq!(&data[start..end], &[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);
    }

    #[test]
    fn incomplete_jpeg_has_no_bounds() {
        assert_eq!(find_jpeg_bounds(&[0xFF, 0xD8, 1, 2]), None);
        assert_eq!(find_jpeg_bounds(&[1, 2, 3]), None);
    }

    #[test]
    fn mjpeg_stream_yields_parts_in_order() {
        let mut data = Vec::new();
        for payload in [7u8, 8u8] {
            data.extend_from_slice(b"--frame\r\n\r\n");
            data.extend_from_slice(&[0xFF, 0xD8, payload, 0xFF, 0xD9]);
        }
        let mut stream = MjpegStream::new(Box::new(Cursor::new(data)));
        assert_eq!(stream.read_next_jpeg().unwrap()[2], 7);
        assert_eq!(stream.read_next_jpeg().unwrap()[2], 8);
        assert!(stream.read_next_jpeg().is_err());
    }
}
