use crate::error::DetectionError;
use crate::pipeline::services::detector::Detector;
use crate::pipeline::types::{BoundingBox, DetectedObject, DetectionResult};
use crate::session::{Detection, Zone, ZoneThresholds};
use serde::Deserialize;
use std::cmp::Ordering;

// Raw depth assumed for each bounding-box heuristic zone.
const VERY_NEAR_DEPTH: f64 = 0.85;
const NEAR_DEPTH: f64 = 0.5;
const FAR_DEPTH: f64 = 0.15;

// Fraction of the image covered by a box.
const VERY_NEAR_AREA_RATIO: f32 = 0.25;
const NEAR_AREA_RATIO: f32 = 0.06;

#[derive(Debug, Deserialize)]
struct FramePayload {
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    detections: Vec<RawDetection>,
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    name: String,
    confidence: f32,
    bounding_box: Option<BoundingBox>,
    depth: Option<f64>,
}

/// Detector for clients that run inference on-device and send their
/// detections as the frame payload.
///
/// Detections without a depth estimate fall back to a bounding-box size
/// heuristic.
#[derive(Debug, Clone, Default)]
pub struct JsonDetector {
    thresholds: ZoneThresholds,
}

impl JsonDetector {
    pub fn new(thresholds: ZoneThresholds) -> Self {
        Self { thresholds }
    }

    fn raw_depth(&self, detection: &RawDetection, image_area: Option<f32>) -> f64 {
        if let Some(depth) = detection.depth.filter(|depth| depth.is_finite()) {
            return depth.clamp(0.0, 1.0);
        }
        match (detection.bounding_box, image_area) {
            (Some(bbox), Some(image_area)) if image_area > 0.0 => {
                let ratio = bbox.area() / image_area;
                if ratio > VERY_NEAR_AREA_RATIO {
                    VERY_NEAR_DEPTH
                } else if ratio > NEAR_AREA_RATIO {
                    NEAR_DEPTH
                } else {
                    FAR_DEPTH
                }
            }
            _ => FAR_DEPTH,
        }
    }
}

impl Detector for JsonDetector {
    fn detect(
        &self,
        payload: &str,
        confidence_threshold: f32,
    ) -> Result<DetectionResult, DetectionError> {
        let frame: FramePayload = serde_json::from_str(payload)
            .map_err(|e| DetectionError::InvalidPayload(e.to_string()))?;
        let image_area = match (frame.width, frame.height) {
            (Some(width), Some(height)) => Some(width as f32 * height as f32),
            _ => None,
        };

        let mut result = DetectionResult::default();
        for raw in frame.detections {
            if raw.name.is_empty() || raw.confidence < confidence_threshold {
                continue;
            }
            let depth = self.raw_depth(&raw, image_area);
            let zone: Zone = self.thresholds.classify(depth);
            result.merge_depth(&raw.name, depth);
            result.objects.push(DetectedObject {
                detection: Detection::new(raw.name, raw.confidence).with_zone_hint(zone),
                bounding_box: raw.bounding_box,
            });
        }
        result.objects.sort_by(|a, b| {
            b.detection
                .confidence
                .partial_cmp(&a.detection.confidence)
                .unwrap_or(Ordering::Equal)
        });
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
