//! HTTP surface: live multipart video streams and the mode-control endpoint.
//!
//! A plain `std::net` HTTP/1.1 server. The accept loop polls a non-blocking
//! listener and checks a shutdown flag between polls; every accepted
//! connection gets its own thread, since stream responses stay open for as
//! long as the viewer watches.
//!
//! Routes (GET only):
//! - `/`: status page with the current mode, mode links and both streams
//! - `/road`, `/second`: `multipart/x-mixed-replace` JPEG streams
//! - `/set/<mode>`: switch the secondary stream to `driver` or `cargo`
//! - `/health`: JSON status

use anyhow::{anyhow, Result};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::frame::FrameSlot;
use crate::mode::{ModeController, OperatingMode};

const MAX_REQUEST_BYTES: usize = 8192;
const STREAM_BOUNDARY: &str = "frame";
/// How long a stream waits for a frame before re-checking shutdown.
const STREAM_POLL: Duration = Duration::from_millis(250);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub jpeg_quality: u8,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:5000".to_string(),
            jpeg_quality: 80,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting connections. Open streams end at their next poll.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("http server thread panicked"))?;
        }
        Ok(())
    }
}

/// Shared state every connection handler reads.
struct Surface {
    cfg: ApiConfig,
    controller: Arc<ModeController>,
    road: Arc<FrameSlot>,
    second: Arc<FrameSlot>,
    shutdown: Arc<AtomicBool>,
}

pub struct StreamServer {
    cfg: ApiConfig,
    controller: Arc<ModeController>,
    road: Arc<FrameSlot>,
    second: Arc<FrameSlot>,
}

impl StreamServer {
    /// `road` and `second` are the display slots the analysis workers fill.
    pub fn new(
        cfg: ApiConfig,
        controller: Arc<ModeController>,
        road: Arc<FrameSlot>,
        second: Arc<FrameSlot>,
    ) -> Self {
        Self {
            cfg,
            controller,
            road,
            second,
        }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let surface = Arc::new(Surface {
            cfg: self.cfg,
            controller: self.controller,
            road: self.road,
            second: self.second,
            shutdown: shutdown.clone(),
        });
        let join = std::thread::Builder::new()
            .name("http-accept".to_string())
            .spawn(move || {
                if let Err(err) = run_server(listener, surface) {
                    log::error!("http server stopped: {}", err);
                }
            })?;
        log::info!("http surface listening on {}", addr);

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_server(listener: TcpListener, surface: Arc<Surface>) -> Result<()> {
    loop {
        if surface.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let surface = surface.clone();
                let spawned = std::thread::Builder::new()
                    .name("http-conn".to_string())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &surface) {
                            log::debug!("http connection from {} ended: {:#}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::warn!("http connection from {} dropped: {}", peer, err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, surface: &Surface) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        return write_text_response(&mut stream, 405, "method not allowed");
    }

    match request.path.as_str() {
        "/" => {
            let page = status_page(surface.controller.current());
            write_response(&mut stream, 200, "text/html; charset=utf-8", page.as_bytes())
        }
        "/road" => stream_frames(stream, &surface.road, surface),
        "/second" => stream_frames(stream, &surface.second, surface),
        "/health" => {
            let body = serde_json::json!({
                "status": "ok",
                "mode": surface.controller.current().as_str(),
            });
            write_response(
                &mut stream,
                200,
                "application/json",
                &serde_json::to_vec(&body)?,
            )
        }
        path => match path.strip_prefix("/set/") {
            Some(requested) => set_mode(&mut stream, requested, &surface.controller),
            None => write_text_response(&mut stream, 404, "not found"),
        },
    }
}

fn set_mode(stream: &mut TcpStream, requested: &str, controller: &ModeController) -> Result<()> {
    let mode: OperatingMode = match requested.parse() {
        Ok(mode) => mode,
        Err(err) => return write_text_response(stream, 400, &err.to_string()),
    };
    match controller.switch_to(mode) {
        Ok(active) => write_text_response(stream, 200, &format!("Mode changed to {}", active)),
        Err(err) => {
            log::error!("mode switch to {} failed: {:#}", mode, err);
            write_text_response(stream, 500, "mode switch failed")
        }
    }
}

/// Serve `slot` as a multipart JPEG stream until the viewer disconnects or
/// the server shuts down.
fn stream_frames(mut stream: TcpStream, slot: &FrameSlot, surface: &Surface) -> Result<()> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        STREAM_BOUNDARY
    );
    stream.write_all(header.as_bytes())?;

    while !surface.shutdown.load(Ordering::SeqCst) {
        let Some(frame) = slot.pop_timeout(STREAM_POLL) else {
            continue;
        };
        let jpeg = match frame.encode_jpeg(surface.cfg.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(err) => {
                log::debug!("stream frame skipped: {:#}", err);
                continue;
            }
        };
        stream.write_all(&multipart_chunk(&jpeg))?;
    }
    Ok(())
}

/// One self-delimited part of a multipart stream.
fn multipart_chunk(jpeg: &[u8]) -> Vec<u8> {
    let head = format!(
        "--{}\r\nContent-Type: image/jpeg\r\n\r\n",
        STREAM_BOUNDARY
    );
    let mut chunk = Vec::with_capacity(head.len() + jpeg.len() + 2);
    chunk.extend_from_slice(head.as_bytes());
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(b"\r\n");
    chunk
}

fn status_page(mode: OperatingMode) -> String {
    format!(
        "<!doctype html>\n<html><body>\n\
         <h2>Current Mode: {}</h2>\n\
         <a href='/set/driver'>Driver</a> |\n\
         <a href='/set/cargo'>Cargo</a><br><br>\n\
         <img src=/road width=48%>\n\
         <img src=/second width=48%>\n\
         </body></html>\n",
        mode.as_str().to_uppercase()
    )
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let request_line = text
        .split("\r\n")
        .next()
        .ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
    })
}

fn write_text_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "text/plain; charset=utf-8", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
}
