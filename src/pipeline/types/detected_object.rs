use crate::session::{Detection, Zone};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0) * (self.y_max - self.y_min).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedObject {
    pub detection: Detection,
    pub bounding_box: Option<BoundingBox>,
}

impl DetectedObject {
    pub fn name(&self) -> &str {
        &self.detection.name
    }

    pub fn zone_hint(&self) -> Option<Zone> {
        self.detection.zone_hint
    }
}

/// Output of one detector run over a frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionResult {
    /// Sorted by confidence, highest first.
    pub objects: Vec<DetectedObject>,
    /// Nearest raw depth per object name.
    pub raw_depths: IndexMap<String, f64>,
}

impl DetectionResult {
    pub fn detections(&self) -> impl Iterator<Item = &Detection> {
        self.objects.iter().map(|object| &object.detection)
    }

    /// Record a depth for `name`, keeping the nearest value seen.
    pub fn merge_depth(&mut self, name: &str, depth: f64) {
        match self.raw_depths.get_mut(name) {
            Some(existing) if *existing >= depth => {}
            Some(existing) => *existing = depth,
            None => {
                self.raw_depths.insert(name.to_string(), depth);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRequest {
    pub payload: String,
    pub confidence_threshold: f32,
}
