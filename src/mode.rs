//! Operating mode and the secondary-stream mode controller.
//!
//! The secondary capture worker feeds either the driver-facing or the
//! cargo-facing camera into one shared slot. `ModeController::switch_to`
//! serializes switches behind a lock and stops the running worker (joining
//! it, so its device handle is released) before the new one is opened. Any
//! frame the old camera left in the slot is dropped before the new mode is
//! entered.
//!
//! Every real switch bumps an epoch. The secondary analysis worker compares
//! the epoch it last saw with the current one and resets its own detection
//! state when they differ; the controller never touches that state directly.

use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::capture::CaptureWorker;
use crate::config::CameraSet;
use crate::frame::FrameSlot;
use crate::ingest::SourceOpener;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperatingMode {
    Driver,
    Cargo,
}

impl OperatingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingMode::Driver => "driver",
            OperatingMode::Cargo => "cargo",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "driver" => Ok(OperatingMode::Driver),
            "cargo" => Ok(OperatingMode::Cargo),
            other => Err(anyhow!(
                "unknown mode '{}' (expected driver or cargo)",
                other
            )),
        }
    }
}

/// Mode plus the switch counter it was entered with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeSnapshot {
    pub mode: OperatingMode,
    pub epoch: u64,
}

/// Process-wide operating mode. Written only by `ModeController`; workers
/// read a snapshot at the start of each iteration.
pub struct ModeState {
    current: RwLock<ModeSnapshot>,
}

impl ModeState {
    pub fn new(mode: OperatingMode) -> Self {
        Self {
            current: RwLock::new(ModeSnapshot { mode, epoch: 0 }),
        }
    }

    pub fn snapshot(&self) -> ModeSnapshot {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> OperatingMode {
        self.snapshot().mode
    }

    fn enter(&self, mode: OperatingMode) -> ModeSnapshot {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        current.mode = mode;
        current.epoch += 1;
        *current
    }
}

pub struct ModeController {
    state: Arc<ModeState>,
    /// Held for the whole of a switch; also owns the running worker.
    worker: Mutex<Option<CaptureWorker>>,
    opener: Arc<dyn SourceOpener>,
    cameras: CameraSet,
    slot: Arc<FrameSlot>,
}

impl ModeController {
    /// Enter `initial` and start its capture worker.
    pub fn start(
        initial: OperatingMode,
        cameras: CameraSet,
        opener: Arc<dyn SourceOpener>,
        slot: Arc<FrameSlot>,
    ) -> Result<Self> {
        let controller = Self {
            state: Arc::new(ModeState::new(initial)),
            worker: Mutex::new(None),
            opener,
            cameras,
            slot,
        };
        let worker = controller.spawn_worker(initial)?;
        *controller.lock_worker()? = Some(worker);
        log::info!("mode controller started in {} mode", initial);
        Ok(controller)
    }

    pub fn current(&self) -> OperatingMode {
        self.state.mode()
    }

    pub fn snapshot(&self) -> ModeSnapshot {
        self.state.snapshot()
    }

    /// Shared handle for workers that read the mode.
    pub fn state(&self) -> Arc<ModeState> {
        self.state.clone()
    }

    /// Switch the secondary stream to `mode`. Requesting the active mode is a
    /// no-op while its worker runs; after a failed start it retries.
    /// Concurrent callers queue on the switch lock.
    pub fn switch_to(&self, mode: OperatingMode) -> Result<OperatingMode> {
        let mut worker = self.lock_worker()?;
        if self.state.mode() == mode && worker.is_some() {
            return Ok(mode);
        }

        let previous = self.state.mode();
        if let Some(running) = worker.take() {
            if let Err(err) = running.stop() {
                log::error!("stopping {} capture: {:#}", previous, err);
            }
        }
        // The old worker has exited, so nothing refills the slot with its frames.
        if self.slot.try_pop().is_some() {
            log::debug!("dropped pending {} frame", previous);
        }

        let entered = self.state.enter(mode);
        log::info!(
            "mode switched {} -> {} (epoch {})",
            previous,
            entered.mode,
            entered.epoch
        );

        *worker = Some(self.spawn_worker(mode)?);
        Ok(mode)
    }

    /// Stop the secondary capture worker. The mode is left as is.
    pub fn stop(&self) -> Result<()> {
        let running = self.lock_worker()?.take();
        if let Some(running) = running {
            running.stop()?;
        }
        Ok(())
    }

    fn spawn_worker(&self, mode: OperatingMode) -> Result<CaptureWorker> {
        let camera = self.cameras.secondary(mode);
        let source = self.opener.open(camera);
        CaptureWorker::spawn(mode.as_str(), source, self.slot.clone(), camera.fps)
    }

    fn lock_worker(&self) -> Result<std::sync::MutexGuard<'_, Option<CaptureWorker>>> {
        self.worker
            .lock()
            .map_err(|_| anyhow!("mode switch lock poisoned"))
    }
}
