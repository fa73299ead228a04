pub mod detection_service;
pub mod detector;
pub mod json_detector;

pub use detection_service::{DetectionService, DetectionStack, DetectorPool};
pub use detector::Detector;
pub use json_detector::JsonDetector;
