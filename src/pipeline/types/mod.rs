mod detected_object;

pub use detected_object::{BoundingBox, DetectedObject, DetectionRequest, DetectionResult};
