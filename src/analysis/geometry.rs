//! Face-mesh geometry for driver monitoring.
//!
//! Landmark indices follow the 468/478-point face mesh layout. All ratios are
//! computed on normalized coordinates.

use crate::detect::LandmarkSet;

/// Six points per eye: outer corner, two upper lid, inner corner, two lower lid.
pub const LEFT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
pub const RIGHT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];
pub const MOUTH_TOP: usize = 13;
pub const MOUTH_BOTTOM: usize = 14;
pub const MOUTH_LEFT: usize = 78;
pub const MOUTH_RIGHT: usize = 308;
pub const NOSE_TIP: usize = 1;

/// Eye openness below this counts as closed.
pub const EYE_CLOSED_RATIO: f32 = 0.18;
/// Consecutive closed-eye frames that make one drowsiness episode.
pub const DROWSY_FRAMES: u32 = 12;
pub const YAWN_RATIO: f32 = 0.6;
/// Nose positions outside this horizontal band count as looking away.
pub const GAZE_BAND: (f32, f32) = (0.35, 0.65);

/// Vertical lid spread over horizontal eye width for one eye.
pub fn eye_aspect_ratio(face: &LandmarkSet, eye: &[usize; 6]) -> Option<f32> {
    let p0 = face.get(eye[0])?;
    let p1 = face.get(eye[1])?;
    let p3 = face.get(eye[3])?;
    let p5 = face.get(eye[5])?;
    let horizontal = p0.distance(&p3);
    if horizontal == 0.0 {
        return Some(0.0);
    }
    Some(p1.distance(&p5) / horizontal)
}

/// Mean eye aspect ratio over both eyes.
pub fn eye_openness(face: &LandmarkSet) -> Option<f32> {
    let left = eye_aspect_ratio(face, &LEFT_EYE)?;
    let right = eye_aspect_ratio(face, &RIGHT_EYE)?;
    Some((left + right) / 2.0)
}

/// Lip gap over mouth width.
pub fn mouth_aspect_ratio(face: &LandmarkSet) -> Option<f32> {
    let top = face.get(MOUTH_TOP)?;
    let bottom = face.get(MOUTH_BOTTOM)?;
    let left = face.get(MOUTH_LEFT)?;
    let right = face.get(MOUTH_RIGHT)?;
    let horizontal = (left.x - right.x).abs();
    if horizontal == 0.0 {
        return Some(0.0);
    }
    Some((top.y - bottom.y).abs() / horizontal)
}

/// Per-frame driver measurements.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceMetrics {
    pub eye_openness: f32,
    pub mouth_openness: f32,
    pub nose_x: f32,
}

impl FaceMetrics {
    /// `None` when the landmark set is too short to be a face mesh.
    pub fn measure(face: &LandmarkSet) -> Option<Self> {
        Some(Self {
            eye_openness: eye_openness(face)?,
            mouth_openness: mouth_aspect_ratio(face)?,
            nose_x: face.get(NOSE_TIP)?.x,
        })
    }

    pub fn is_yawning(&self) -> bool {
        self.mouth_openness > YAWN_RATIO
    }

    pub fn is_looking_away(&self) -> bool {
        self.nose_x < GAZE_BAND.0 || self.nose_x > GAZE_BAND.1
    }
}

/// Counts consecutive closed-eye frames.
#[derive(Clone, Debug, Default)]
pub struct DrowsinessTracker {
    closed_frames: u32,
}

impl DrowsinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one eye-openness reading. Returns true on the frame that completes
    /// an episode; the count then starts over.
    pub fn observe(&mut self, eye_openness: f32) -> bool {
        if eye_openness < EYE_CLOSED_RATIO {
            self.closed_frames += 1;
        } else {
            self.closed_frames = 0;
        }
        if self.closed_frames >= DROWSY_FRAMES {
            self.closed_frames = 0;
            return true;
        }
        false
    }

    pub fn closed_frames(&self) -> u32 {
        self.closed_frames
    }

    pub fn reset(&mut self) {
        self.closed_frames = 0;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::face;
    use super::*;
    use crate::detect::Landmark;

    #[test]
    fn ratios_follow_landmarks() {
        let metrics = FaceMetrics::measure(&face(0.3, 0.2, 0.5)).unwrap();
        assert!((metrics.eye_openness - 0.3).abs() < 1e-4);
        assert!((metrics.mouth_openness - 0.2).abs() < 1e-4);
        assert!(!metrics.is_yawning());
        assert!(!metrics.is_looking_away());

        let metrics = FaceMetrics::measure(&face(0.3, 0.8, 0.2)).unwrap();
        assert!(metrics.is_yawning());
        assert!(metrics.is_looking_away());
    }

    #[test]
    fn zero_width_gives_zero_ratio() {
        let points = vec![Landmark::new(0.5, 0.5); 478];
        let flat = LandmarkSet::new(points);
        assert_eq!(eye_openness(&flat), Some(0.0));
        assert_eq!(mouth_aspect_ratio(&flat), Some(0.0));
    }

    #[test]
    fn short_landmark_set_is_not_a_face() {
        let hand = LandmarkSet::new(vec![Landmark::new(0.5, 0.5); 21]);
        assert!(FaceMetrics::measure(&hand).is_none());
    }

    #[test]
    fn drowsy_fires_once_per_run_of_twelve() {
        let mut tracker = DrowsinessTracker::new();
        let fired: Vec<bool> = (0..30).map(|_| tracker.observe(0.10)).collect();
        let positions: Vec<usize> = fired
            .iter()
            .enumerate()
            .filter(|(_, f)| **f)
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(positions, vec![12, 24]);
        assert_eq!(tracker.closed_frames(), 6);
    }

    #[test]
    fn open_eyes_reset_the_count() {
        let mut tracker = DrowsinessTracker::new();
        for _ in 0..11 {
            assert!(!tracker.observe(0.10));
        }
        assert!(!tracker.observe(EYE_CLOSED_RATIO));
        assert_eq!(tracker.closed_frames(), 0);
        for _ in 0..11 {
            assert!(!tracker.observe(0.17));
        }
        assert!(tracker.observe(0.17));
    }

    #[test]
    fn arbitrary_sequences_fire_once_per_qualifying_run() {
        // Deterministic pseudo-random sequence of open/closed readings.
        let mut state = 0x2545_f491_u32;
        let readings: Vec<f32> = (0..2_000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                if state % 10 < 9 {
                    0.1
                } else {
                    0.3
                }
            })
            .collect();

        let mut tracker = DrowsinessTracker::new();
        let fired = readings.iter().filter(|r| tracker.observe(**r)).count();

        let mut expected = 0;
        let mut run = 0;
        for reading in &readings {
            if *reading < EYE_CLOSED_RATIO {
                run += 1;
            } else {
                expected += run / DROWSY_FRAMES as usize;
                run = 0;
            }
        }
        expected += run / DROWSY_FRAMES as usize;
        assert_eq!(fired, expected);
    }
}
