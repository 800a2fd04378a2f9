use anyhow::Result;

use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// Perception capabilities a backend can provide.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DetectionCapability {
    /// Object boxes with class ids.
    Objects,
    /// Dense face mesh landmarks.
    FaceLandmarks,
    /// Hand landmarks, one set per hand.
    HandLandmarks,
}

/// Detector backend trait.
///
/// Backends are black boxes to the pipeline: a frame and a confidence
/// threshold go in, geometry comes out. The pipeline only reads the returned
/// boxes, landmarks and class ids.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on a frame. The frame is borrowed for the call only.
    fn detect(
        &mut self,
        capability: DetectionCapability,
        frame: &Frame,
        confidence: f32,
    ) -> Result<DetectionResult>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
