//! Analysis workers.
//!
//! Each worker pops the newest frame from its input slot, runs the detector
//! collaborators, annotates the frame and pushes it to a display slot.
//! - `RoadAnalysis`: obstacle boxes on the road stream, never alerts.
//! - `SecondaryAnalysis`: driver or cargo monitoring, depending on the mode.

pub mod geometry;
mod primary;
mod secondary;

pub use geometry::{DrowsinessTracker, FaceMetrics};
pub use primary::RoadAnalysis;
pub use secondary::SecondaryAnalysis;
