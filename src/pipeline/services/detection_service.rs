use crate::error::DetectionError;
use crate::pipeline::services::detector::Detector;
use crate::pipeline::types::{DetectionRequest, DetectionResult};
use futures::future::BoxFuture;
use std::{
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::Semaphore;
use tower::{Service, ServiceBuilder, util::BoxService};
use tracing::debug;

pub type DetectionStack = BoxService<DetectionRequest, DetectionResult, DetectionError>;

/// Runs a shared detector on the blocking thread pool.
///
/// Each call holds one permit of `permits` until the detector returns, even
/// when the caller has already given up on the result.
#[derive(Clone)]
pub struct DetectionService {
    detector: Arc<dyn Detector>,
    permits: Arc<Semaphore>,
}

impl DetectionService {
    pub fn new(detector: Arc<dyn Detector>, permits: Arc<Semaphore>) -> Self {
        Self { detector, permits }
    }
}

impl Service<DetectionRequest> for DetectionService {
    type Response = DetectionResult;
    type Error = DetectionError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: DetectionRequest) -> Self::Future {
        let detector = Arc::clone(&self.detector);
        let permits = Arc::clone(&self.permits);
        Box::pin(async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|e| DetectionError::Service(e.to_string()))?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                detector.detect(&request.payload, request.confidence_threshold)
            })
            .await
            .map_err(|e| DetectionError::Worker(e.to_string()))?
        })
    }
}

/// Shares one detector between sessions and bounds concurrent inference.
#[derive(Clone)]
pub struct DetectorPool {
    detector: Arc<dyn Detector>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl DetectorPool {
    pub fn new(detector: Arc<dyn Detector>, max_concurrent: usize, timeout: Duration) -> Self {
        debug!(
            "Detector pool using {} with {} permits and {:?} timeout",
            detector.name(),
            max_concurrent,
            timeout
        );
        Self {
            detector,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            timeout,
        }
    }

    /// Build the service stack for one session.
    ///
    /// The timeout covers waiting for a permit and running the detector.
    pub fn session_service(&self) -> DetectionStack {
        let service = ServiceBuilder::new()
            .map_err(|error: tower::BoxError| DetectionError::from(error))
            .timeout(self.timeout)
            .service(DetectionService::new(
                Arc::clone(&self.detector),
                Arc::clone(&self.permits),
            ));
        BoxService::new(service)
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::services::json_detector::JsonDetector;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct SlowDetector(Duration);

    impl Detector for SlowDetector {
        fn detect(&self, _payload: &str, _threshold: f32) -> Result<DetectionResult, DetectionError> {
            std::thread::sleep(self.0);
            Ok(DetectionResult::default())
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[derive(Default)]
    struct CountingDetector {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Detector for CountingDetector {
        fn detect(&self, _payload: &str, _threshold: f32) -> Result<DetectionResult, DetectionError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(400));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(DetectionResult::default())
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn request(payload: &str) -> DetectionRequest {
        DetectionRequest {
            payload: payload.to_string(),
            confidence_threshold: 0.5,
        }
    }

    #[tokio::test]
    async fn test_session_service_runs_detector() {
        let pool = DetectorPool::new(Arc::new(JsonDetector::default()), 2, Duration::from_secs(1));
        let service = pool.session_service();
        let result = service
            .oneshot(request(
                r#"{"detections": [{"name": "cup", "confidence": 0.9, "depth": 0.5}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(result.objects.len(), 1);
        assert_eq!(result.raw_depths["cup"], 0.5);
        assert_eq!(pool.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_detector_errors_keep_their_type() {
        let pool = DetectorPool::new(Arc::new(JsonDetector::default()), 1, Duration::from_secs(1));
        let error = pool.session_service().oneshot(request("{")).await.unwrap_err();
        assert!(matches!(error, DetectionError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_slow_detector_times_out() {
        let pool = DetectorPool::new(
            Arc::new(SlowDetector(Duration::from_millis(300))),
            1,
            Duration::from_millis(20),
        );
        let error = pool.session_service().oneshot(request("")).await.unwrap_err();
        assert!(matches!(error, DetectionError::Timeout));
    }

    #[tokio::test]
    async fn test_timed_out_detector_keeps_its_permit() {
        let detector = Arc::new(CountingDetector::default());
        let pool = DetectorPool::new(detector.clone(), 1, Duration::from_millis(20));
        for _ in 0..4 {
            let error = pool.session_service().oneshot(request("")).await.unwrap_err();
            assert!(matches!(error, DetectionError::Timeout));
        }
        assert_eq!(pool.available_permits(), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(detector.peak.load(Ordering::SeqCst), 1);
        assert_eq!(detector.running.load(Ordering::SeqCst), 0);
        assert_eq!(pool.available_permits(), 1);
    }
}
