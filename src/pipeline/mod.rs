pub mod services;
pub mod types;

pub use services::{DetectionService, DetectionStack, Detector, DetectorPool, JsonDetector};
pub use types::{BoundingBox, DetectedObject, DetectionRequest, DetectionResult};
