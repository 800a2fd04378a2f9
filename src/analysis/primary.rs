use anyhow::Result;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::detect::{BackendRegistry, DetectionCapability};
use crate::frame::{Frame, FrameSlot, ROAD_BOX};

/// Road-facing obstacle annotation. Always on, independent of the operating
/// mode; produces no alerts.
pub struct RoadAnalysis {
    detectors: Arc<BackendRegistry>,
    confidence: f32,
}

impl RoadAnalysis {
    pub fn new(detectors: Arc<BackendRegistry>, confidence: f32) -> Self {
        Self {
            detectors,
            confidence,
        }
    }

    /// Draw one box per detected object. Returns the number of boxes drawn.
    pub fn process_frame(&self, frame: &mut Frame) -> usize {
        let result = match self
            .detectors
            .detect(DetectionCapability::Objects, frame, self.confidence)
        {
            Ok(result) => result,
            Err(err) => {
                log::debug!("road detection skipped: {:#}", err);
                return 0;
            }
        };
        for object in &result.objects {
            frame.draw_box(object.x1, object.y1, object.x2, object.y2, ROAD_BOX);
        }
        result.objects.len()
    }

    pub fn run(self, input: Arc<FrameSlot>, output: Arc<FrameSlot>) {
        loop {
            let mut frame = input.pop();
            self.process_frame(&mut frame);
            output.push(frame);
        }
    }

    pub fn spawn(self, input: Arc<FrameSlot>, output: Arc<FrameSlot>) -> Result<JoinHandle<()>> {
        let handle = std::thread::Builder::new()
            .name("analysis-road".to_string())
            .spawn(move || self.run(input, output))?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectionResult, DetectorBackend, ObjectDetection};
    use std::time::Duration;

    struct OneBox;

    impl DetectorBackend for OneBox {
        fn name(&self) -> &'static str {
            "one_box"
        }

        fn supports(&self, capability: DetectionCapability) -> bool {
            capability == DetectionCapability::Objects
        }

        fn detect(
            &mut self,
            _capability: DetectionCapability,
            _frame: &Frame,
            _confidence: f32,
        ) -> Result<DetectionResult> {
            Ok(DetectionResult {
                objects: vec![ObjectDetection {
                    x1: 2.0,
                    y1: 2.0,
                    x2: 12.0,
                    y2: 12.0,
                    confidence: 0.9,
                    class_id: 2,
                }],
                landmarks: Vec::new(),
            })
        }
    }

    #[test]
    fn annotated_frames_reach_the_display_slot() {
        let mut registry = BackendRegistry::new();
        registry.register(OneBox);
        let analysis = RoadAnalysis::new(Arc::new(registry), 0.4);

        let input = Arc::new(FrameSlot::new());
        let output = Arc::new(FrameSlot::new());
        analysis.spawn(input.clone(), output.clone()).unwrap();

        input.push(Frame::from_rgb(16, 16, vec![0; 16 * 16 * 3]).unwrap());
        let frame = output.pop_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(frame.image().get_pixel(2, 2), &ROAD_BOX);
        assert_eq!(frame.image().get_pixel(7, 7), &image::Rgb([0, 0, 0]));
    }

    #[test]
    fn missing_backend_still_passes_frames_through() {
        let analysis = RoadAnalysis::new(Arc::new(BackendRegistry::new()), 0.4);
        let mut frame = Frame::from_rgb(4, 4, vec![9; 48]).unwrap();
        assert_eq!(analysis.process_frame(&mut frame), 0);
        assert!(frame.image().as_raw().iter().all(|v| *v == 9));
    }
}
