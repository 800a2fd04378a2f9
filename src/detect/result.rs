/// COCO class id of "cell phone".
pub const COCO_CELL_PHONE: u32 = 67;

/// Output of one detector call. Which fields are populated depends on the
/// capability that was requested.
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    /// Object boxes (pixel coordinates).
    pub objects: Vec<ObjectDetection>,
    /// One landmark set per detected face or hand.
    pub landmarks: Vec<LandmarkSet>,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.landmarks.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjectDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl ObjectDetection {
    pub fn is_phone(&self) -> bool {
        self.class_id == COCO_CELL_PHONE
    }
}

/// Landmark position normalized to 0..1 in both axes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Landmark) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LandmarkSet {
    pub points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn get(&self, index: usize) -> Option<Landmark> {
        self.points.get(index).copied()
    }
}
