use crate::error::DetectionError;
use crate::pipeline::types::DetectionResult;

/// Object detection plus depth estimation over one frame payload.
///
/// Implementations are CPU-bound and shared read-only by every session;
/// callers run them on the blocking pool.
pub trait Detector: Send + Sync + 'static {
    fn detect(
        &self,
        payload: &str,
        confidence_threshold: f32,
    ) -> Result<DetectionResult, DetectionError>;

    fn name(&self) -> &'static str;
}
