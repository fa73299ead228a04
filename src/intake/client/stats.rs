use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const PROCESSING_EWMA_ALPHA: f64 = 0.2;

/// Counters for one session, shared by its receiving and processing tasks.
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_received: AtomicU64,
    frames_replaced: AtomicU64,
    frames_rejected: AtomicU64,
    frames_processed: AtomicU64,
    frames_failed: AtomicU64,
    // f64 bits, only written by the processing task
    avg_processing_ms: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionStatsSnapshot {
    pub frames_received: u64,
    pub frames_replaced: u64,
    pub frames_rejected: u64,
    pub frames_processed: u64,
    pub frames_failed: u64,
    pub avg_processing_ms: f64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// A pending frame was overwritten before it could be processed.
    pub fn record_replaced(&self) {
        self.frames_replaced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.frames_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self, elapsed: Duration) {
        let processed = self.frames_processed.fetch_add(1, Ordering::Relaxed) + 1;
        let sample = elapsed.as_secs_f64() * 1_000.0;
        let average = if processed == 1 {
            sample
        } else {
            update_ewma(self.avg_processing_ms(), sample, PROCESSING_EWMA_ALPHA)
        };
        self.avg_processing_ms
            .store(average.to_bits(), Ordering::Relaxed);
    }

    pub fn avg_processing_ms(&self) -> f64 {
        f64::from_bits(self.avg_processing_ms.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_replaced: self.frames_replaced.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_failed: self.frames_failed.load(Ordering::Relaxed),
            avg_processing_ms: self.avg_processing_ms(),
        }
    }
}

fn update_ewma(current: f64, new_value: f64, alpha: f64) -> f64 {
    current * (1.0 - alpha) + new_value * alpha
}
