use anyhow::Result;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// No-op backend. Claims every capability and never detects anything, so the
/// pipeline keeps streaming when no model backend is available.
#[derive(Default)]
pub struct StubBackend;

impl StubBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, _capability: DetectionCapability) -> bool {
        true
    }

    fn detect(
        &mut self,
        _capability: DetectionCapability,
        _frame: &Frame,
        _confidence: f32,
    ) -> Result<DetectionResult> {
        Ok(DetectionResult::default())
    }
}
