use anyhow::Result;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::alert::{AlertDispatcher, AlertKind};
use crate::detect::{BackendRegistry, DetectionCapability, DetectionResult};
use crate::frame::{Frame, FrameSlot, CARGO_BOX};
use crate::mode::{ModeState, OperatingMode};

use super::geometry::{DrowsinessTracker, FaceMetrics};

/// Driver or cargo analysis, chosen per frame from the current mode.
///
/// Owns the drowsiness counter. When the mode epoch moves on, the counter is
/// reset before the next frame is analysed.
pub struct SecondaryAnalysis {
    detectors: Arc<BackendRegistry>,
    alerts: Arc<AlertDispatcher>,
    mode: Arc<ModeState>,
    confidence: f32,
    drowsiness: DrowsinessTracker,
    epoch: u64,
}

impl SecondaryAnalysis {
    pub fn new(
        detectors: Arc<BackendRegistry>,
        alerts: Arc<AlertDispatcher>,
        mode: Arc<ModeState>,
        confidence: f32,
    ) -> Self {
        let epoch = mode.snapshot().epoch;
        Self {
            detectors,
            alerts,
            mode,
            confidence,
            drowsiness: DrowsinessTracker::new(),
            epoch,
        }
    }

    pub fn drowsy_frames(&self) -> u32 {
        self.drowsiness.closed_frames()
    }

    /// Analyse one frame under the current mode. Returns the alert conditions
    /// found; each was handed to the dispatcher, which may have suppressed it.
    pub fn process_frame(&mut self, frame: &mut Frame) -> Vec<AlertKind> {
        let snapshot = self.mode.snapshot();
        if snapshot.epoch != self.epoch {
            self.epoch = snapshot.epoch;
            self.drowsiness.reset();
        }

        let found = match snapshot.mode {
            OperatingMode::Driver => self.analyse_driver(frame),
            OperatingMode::Cargo => self.analyse_cargo(frame),
        };
        for kind in &found {
            self.alerts.raise_kind(*kind);
        }
        found
    }

    fn analyse_driver(&mut self, frame: &Frame) -> Vec<AlertKind> {
        let mut found = Vec::new();

        let faces = self.detect(DetectionCapability::FaceLandmarks, frame);
        if let Some(metrics) = faces.landmarks.first().and_then(FaceMetrics::measure) {
            if self.drowsiness.observe(metrics.eye_openness) {
                found.push(AlertKind::DriverDrowsy);
            }
            if metrics.is_yawning() {
                found.push(AlertKind::DriverYawning);
            }
            if metrics.is_looking_away() {
                found.push(AlertKind::DriverLookingAway);
            }
        }

        let objects = self.detect(DetectionCapability::Objects, frame);
        if objects.objects.iter().any(|object| object.is_phone()) {
            found.push(AlertKind::PhoneUsage);
        }
        found
    }

    fn analyse_cargo(&self, frame: &mut Frame) -> Vec<AlertKind> {
        let objects = self.detect(DetectionCapability::Objects, frame);
        for object in &objects.objects {
            frame.draw_box(object.x1, object.y1, object.x2, object.y2, CARGO_BOX);
        }

        let hands = self.detect(DetectionCapability::HandLandmarks, frame);
        if hands.landmarks.is_empty() {
            Vec::new()
        } else {
            vec![AlertKind::UnauthorizedCargoAccess]
        }
    }

    /// Detector failures count as "nothing found" for this frame.
    fn detect(&self, capability: DetectionCapability, frame: &Frame) -> DetectionResult {
        self.detectors
            .detect(capability, frame, self.confidence)
            .unwrap_or_else(|err| {
                log::debug!("{:?} detection skipped: {:#}", capability, err);
                DetectionResult::default()
            })
    }

    pub fn run(mut self, input: Arc<FrameSlot>, output: Arc<FrameSlot>) {
        loop {
            let mut frame = input.pop();
            self.process_frame(&mut frame);
            output.push(frame);
        }
    }

    pub fn spawn(self, input: Arc<FrameSlot>, output: Arc<FrameSlot>) -> Result<JoinHandle<()>> {
        let handle = std::thread::Builder::new()
            .name("analysis-secondary".to_string())
            .spawn(move || self.run(input, output))?;
        Ok(handle)
    }
}
