//! Capture workers.
//!
//! A `CaptureWorker` owns one `FrameSource` on a dedicated thread, samples it
//! at a fixed frequency and pushes every frame into a `FrameSlot`. Read
//! failures skip the push and the loop carries on.
//!
//! `stop()` is sequenced: once it returns, the thread has exited, the source
//! has been released and no further push can happen. The stop flag is checked
//! under the same lock `stop()` takes, immediately before each push.

use anyhow::{anyhow, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::frame::FrameSlot;
use crate::ingest::FrameSource;

/// Cooperative stop flag with an interruptible sleep.
#[derive(Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stop(&self) {
        *self.lock() = true;
        self.wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.lock()
    }

    /// Sleep for up to `timeout`. Returns true if stopped.
    pub fn sleep(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.lock();
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .wake
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            stopped = guard;
        }
        *stopped
    }

    /// Run `f` unless stopped. `stop()` blocks while `f` runs.
    pub fn unless_stopped<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let stopped = self.lock();
        if *stopped {
            return None;
        }
        let out = f();
        drop(stopped);
        Some(out)
    }
}

/// Counters reported when a capture worker exits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_pushed: u64,
    /// Frames overwritten in the slot before a consumer took them.
    pub frames_displaced: u64,
    pub read_failures: u64,
}

/// Handle to a running capture thread.
pub struct CaptureWorker {
    name: String,
    signal: Arc<StopSignal>,
    join: Option<JoinHandle<CaptureStats>>,
}

impl CaptureWorker {
    /// Start sampling `source` at `fps` into `slot`.
    pub fn spawn(
        name: &str,
        source: Box<dyn FrameSource>,
        slot: Arc<FrameSlot>,
        fps: u32,
    ) -> Result<Self> {
        if fps == 0 {
            return Err(anyhow!("capture {} needs a frequency above zero", name));
        }
        let period = Duration::from_secs_f64(1.0 / fps as f64);
        let signal = Arc::new(StopSignal::new());
        let thread_signal = signal.clone();
        let thread_name = name.to_string();
        let join = std::thread::Builder::new()
            .name(format!("capture-{}", name.to_lowercase()))
            .spawn(move || run_capture(&thread_name, source, &slot, period, &thread_signal))?;
        log::info!("capture {} started at {} fps", name, fps);
        Ok(Self {
            name: name.to_string(),
            signal,
            join: Some(join),
        })
    }

    /// Signal the loop to exit and wait until the source is released.
    pub fn stop(mut self) -> Result<CaptureStats> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<CaptureStats> {
        self.signal.stop();
        let Some(join) = self.join.take() else {
            return Ok(CaptureStats::default());
        };
        let stats = join
            .join()
            .map_err(|_| anyhow!("capture {} thread panicked", self.name))?;
        log::info!(
            "capture {} stopped: pushed={} displaced={} read_failures={}",
            self.name,
            stats.frames_pushed,
            stats.frames_displaced,
            stats.read_failures
        );
        Ok(stats)
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        if self.join.is_some() {
            if let Err(err) = self.shutdown() {
                log::error!("{}", err);
            }
        }
    }
}

fn run_capture(
    name: &str,
    mut source: Box<dyn FrameSource>,
    slot: &FrameSlot,
    period: Duration,
    signal: &StopSignal,
) -> CaptureStats {
    let mut stats = CaptureStats::default();
    let mut consecutive_failures = 0u64;

    while !signal.is_stopped() {
        let started = Instant::now();

        match source.read_frame() {
            Ok(frame) => {
                consecutive_failures = 0;
                match signal.unless_stopped(|| slot.push(frame)) {
                    Some(displaced) => {
                        stats.frames_pushed += 1;
                        if displaced {
                            stats.frames_displaced += 1;
                        }
                    }
                    None => break,
                }
            }
            Err(err) => {
                stats.read_failures += 1;
                consecutive_failures += 1;
                if consecutive_failures == 1 {
                    log::warn!("capture {}: read failed: {:#}", name, err);
                } else {
                    log::debug!("capture {}: read failed: {:#}", name, err);
                }
            }
        }

        if let Some(remaining) = period.checked_sub(started.elapsed()) {
            if signal.sleep(remaining) {
                break;
            }
        }
    }

    source.release();
    stats
}
