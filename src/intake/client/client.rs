use crate::{
    config::Settings,
    error::{AppError, FrameError},
    intake::{
        client::stats::{SessionStats, SessionStatsSnapshot},
        frame::{
            ClientMessage, DetectionMessage, ErrorCode, FrameReader, FrameWriter,
            LatestFrameSlot, ObjectReport, ServerMessage,
        },
    },
    pipeline::{DetectionRequest, DetectionResult, DetectionStack},
    session::{ChangeReport, SessionConfig, SessionState, Zone},
};
use chrono::Utc;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};
use tokio::sync::{
    broadcast::{self, Receiver, Sender},
    mpsc,
};
use tower::{Service, ServiceExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const OUTBOUND_CAPACITY: usize = 32;
// How long queued replies may take to reach a peer once the session ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
// Room for the JSON envelope around a frame payload.
const MESSAGE_OVERHEAD_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientSettings {
    pub session: SessionConfig,
    pub confidence_threshold: f32,
    pub max_frame_size: usize,
}

impl ClientSettings {
    /// Largest length prefix the reader accepts before skipping a message.
    pub fn max_message_size(&self) -> usize {
        self.max_frame_size.saturating_add(MESSAGE_OVERHEAD_BYTES)
    }
}

impl From<&Settings> for ClientSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            session: settings.session_config(),
            confidence_threshold: settings.realtime.confidence_threshold,
            max_frame_size: settings.realtime.max_frame_size,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

#[derive(Debug)]
struct PendingFrame {
    data: String,
    frame_id: Option<u64>,
    confidence_threshold: f32,
}

/// One connected camera: a receive loop, a processing task owning the
/// session state, and a writer task.
pub struct Client {
    id: Uuid,
    reader: Box<dyn FrameReader>,
    writer: Box<dyn FrameWriter>,
    detection: DetectionStack,
    settings: ClientSettings,
    shutdown_tx: Sender<()>,
    shutdown_rx: Receiver<()>,
    writer_shutdown_rx: Receiver<()>,
}

#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub id: Uuid,
    shutdown_tx: Sender<()>,
}

impl ClientHandle {
    pub fn send_shutdown(&self) -> Result<(), AppError> {
        match self.shutdown_tx.send(()) {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(
                    "Error sending shutdown to client handle {:?}: {:?}",
                    self.id,
                    e.to_string()
                );
                Err(AppError::ClientShutdown(self.id))
            }
        }
    }
}

impl Client {
    pub fn new(
        reader: Box<dyn FrameReader>,
        writer: Box<dyn FrameWriter>,
        detection: DetectionStack,
        settings: ClientSettings,
    ) -> (Self, ClientHandle) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let writer_shutdown_rx = shutdown_tx.subscribe();
        let id = Uuid::new_v4();
        (
            Self {
                id,
                reader,
                writer,
                detection,
                settings,
                shutdown_tx: shutdown_tx.clone(),
                shutdown_rx,
                writer_shutdown_rx,
            },
            ClientHandle { id, shutdown_tx },
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Run the session until the peer disconnects or a shutdown is requested.
    pub async fn run(self) -> Result<SessionStatsSnapshot, AppError> {
        let Client {
            id,
            reader,
            writer,
            detection,
            settings,
            shutdown_tx,
            mut shutdown_rx,
            writer_shutdown_rx,
        } = self;
        info!("Running client session {:?}", id);

        let stats = Arc::new(SessionStats::new());
        let slot = Arc::new(LatestFrameSlot::new());
        let reset_requested = Arc::new(AtomicBool::new(false));
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);

        let mut writer_task = tokio::spawn(write_loop(
            id,
            writer,
            outbound_rx,
            shutdown_tx.clone(),
            writer_shutdown_rx,
        ));
        let processor = FrameProcessor {
            id,
            session: SessionState::new(settings.session),
            detection,
            outbound: outbound_tx.clone(),
            stats: Arc::clone(&stats),
            reset_requested: Arc::clone(&reset_requested),
        };
        let process_task = tokio::spawn(processor.run(Arc::clone(&slot)));

        let mut receiver = FrameReceiver {
            id,
            reader,
            outbound: outbound_tx,
            slot: Arc::clone(&slot),
            confidence_threshold: settings.confidence_threshold,
            max_frame_size: settings.max_frame_size,
            reset_requested,
            stats: Arc::clone(&stats),
        };

        let result = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                debug!("Client session {:?} received shutdown", id);
                Ok(())
            }
            result = receiver.run() => result,
        };

        slot.close();
        drop(receiver);
        let written = match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer_task).await {
            Ok(written) => written,
            Err(_) => {
                warn!(
                    "Client {:?} is not reading, dropping queued replies",
                    id
                );
                let _ = shutdown_tx.send(());
                writer_task.await
            }
        };
        written.map_err(|e| AppError::Client(e.to_string()))?;
        let frame_count = process_task
            .await
            .map_err(|e| AppError::Client(e.to_string()))?;

        let snapshot = stats.snapshot();
        info!(
            "Client session {:?} finished after {} frames ({} replaced, {} rejected, {} failed, avg {:.1} ms)",
            id,
            frame_count,
            snapshot.frames_replaced,
            snapshot.frames_rejected,
            snapshot.frames_failed,
            snapshot.avg_processing_ms
        );
        result.map(|_| snapshot)
    }
}

struct FrameReceiver {
    id: Uuid,
    reader: Box<dyn FrameReader>,
    outbound: mpsc::Sender<ServerMessage>,
    slot: Arc<LatestFrameSlot<PendingFrame>>,
    confidence_threshold: f32,
    max_frame_size: usize,
    reset_requested: Arc<AtomicBool>,
    stats: Arc<SessionStats>,
}

impl FrameReceiver {
    async fn run(&mut self) -> Result<(), AppError> {
        self.reply(ServerMessage::connected()).await?;
        loop {
            let message = match self.reader.read().await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    debug!("Client {:?} has disconnected", self.id);
                    return Ok(());
                }
                Err(FrameError::Oversized(length, limit)) => {
                    self.stats.record_received();
                    self.stats.record_rejected();
                    self.reply(ServerMessage::error(
                        ErrorCode::InvalidFrame,
                        format!("Message of {length} bytes exceeds the limit of {limit} bytes"),
                    ))
                    .await?;
                    continue;
                }
                Err(FrameError::Decode(e)) => {
                    self.reply(ServerMessage::error(
                        ErrorCode::InvalidMessage,
                        format!("Invalid message: {e}"),
                    ))
                    .await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            self.handle(message).await?;
        }
    }

    async fn handle(&mut self, message: ClientMessage) -> Result<(), AppError> {
        match message {
            ClientMessage::Frame { data, frame_id } => {
                self.stats.record_received();
                if data.is_empty() || data.len() > self.max_frame_size {
                    self.stats.record_rejected();
                    return self
                        .reply(ServerMessage::error(
                            ErrorCode::InvalidFrame,
                            "Invalid or oversized frame",
                        ))
                        .await;
                }
                let frame = PendingFrame {
                    data,
                    frame_id,
                    confidence_threshold: self.confidence_threshold,
                };
                if let Some(replaced) = self.slot.publish(frame) {
                    self.stats.record_replaced();
                    debug!(
                        "Client {:?} dropped pending frame {:?}",
                        self.id, replaced.frame_id
                    );
                }
                Ok(())
            }
            ClientMessage::Config {
                confidence_threshold,
            } => match confidence_threshold {
                Some(threshold) if (0.0..=1.0).contains(&threshold) => {
                    debug!(
                        "Client {:?} confidence threshold set to {}",
                        self.id, threshold
                    );
                    self.confidence_threshold = threshold;
                    Ok(())
                }
                Some(threshold) => {
                    self.reply(ServerMessage::error(
                        ErrorCode::InvalidConfig,
                        format!("Confidence threshold {threshold} is not in [0, 1]"),
                    ))
                    .await
                }
                None => Ok(()),
            },
            ClientMessage::Ping => self.reply(ServerMessage::Pong).await,
            ClientMessage::Reset => {
                debug!("Client {:?} requested a session reset", self.id);
                self.reset_requested.store(true, Ordering::Release);
                Ok(())
            }
        }
    }

    async fn reply(&mut self, message: ServerMessage) -> Result<(), AppError> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| AppError::Client(format!("Outbound channel closed for {}", self.id)))
    }
}

struct FrameProcessor {
    id: Uuid,
    session: SessionState,
    detection: DetectionStack,
    outbound: mpsc::Sender<ServerMessage>,
    stats: Arc<SessionStats>,
    reset_requested: Arc<AtomicBool>,
}

impl FrameProcessor {
    async fn run(mut self, slot: Arc<LatestFrameSlot<PendingFrame>>) -> u64 {
        while let Some(frame) = slot.next().await {
            if self.reset_requested.swap(false, Ordering::AcqRel) {
                info!("Resetting session state for client {:?}", self.id);
                self.session.reset();
            }
            let message = self.process(frame).await;
            if self.outbound.send(message).await.is_err() {
                debug!("Client {:?} outbound closed, stopping processing", self.id);
                break;
            }
        }
        self.session.frame_count()
    }

    async fn process(&mut self, frame: PendingFrame) -> ServerMessage {
        let started = Instant::now();
        let request = DetectionRequest {
            payload: frame.data,
            confidence_threshold: frame.confidence_threshold,
        };
        let outcome = match ServiceExt::<DetectionRequest>::ready(&mut self.detection).await {
            Ok(service) => service.call(request).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(result) => {
                let changes = self
                    .session
                    .compute_changes(result.detections(), &result.raw_depths);
                let elapsed = started.elapsed();
                self.stats.record_processed(elapsed);
                if changes.has_significant_change {
                    debug!(
                        "Client {:?} frame {}: appeared {:?}, disappeared {:?}, zone changes {}",
                        self.id,
                        changes.frame_count,
                        changes.appeared,
                        changes.disappeared,
                        changes.zone_changes.len()
                    );
                }
                ServerMessage::Detection(detection_message(
                    frame.frame_id,
                    result,
                    changes,
                    elapsed,
                ))
            }
            Err(e) => {
                self.stats.record_failed();
                warn!("Client {:?} failed to process frame: {}", self.id, e);
                ServerMessage::error(
                    ErrorCode::ProcessingError,
                    format!("Error processing frame: {e}"),
                )
            }
        }
    }
}

fn detection_message(
    frame_id: Option<u64>,
    result: DetectionResult,
    changes: ChangeReport,
    elapsed: Duration,
) -> DetectionMessage {
    let objects: Vec<ObjectReport> = result
        .objects
        .into_iter()
        .map(|object| {
            let zone = changes
                .smoothed_zones
                .get(object.name())
                .copied()
                .or(object.zone_hint())
                .unwrap_or(Zone::Far);
            ObjectReport {
                name: object.detection.name,
                confidence: object.detection.confidence,
                bounding_box: object.bounding_box,
                distance_zone: zone,
                distance_estimate: zone.label().to_string(),
            }
        })
        .collect();
    DetectionMessage {
        frame_id,
        object_count: objects.len(),
        objects,
        processing_time_ms: elapsed.as_millis() as u64,
        timestamp: Utc::now().timestamp_millis(),
        changes,
    }
}

/// Drain the outbound channel into the peer until every sender is gone or a
/// shutdown arrives. A peer that stops reading blocks only this task.
async fn write_loop(
    id: Uuid,
    mut writer: Box<dyn FrameWriter>,
    mut outbound_rx: mpsc::Receiver<ServerMessage>,
    shutdown_tx: Sender<()>,
    mut shutdown_rx: Receiver<()>,
) {
    let drain = async {
        while let Some(message) = outbound_rx.recv().await {
            if let Err(e) = writer.write(&message).await {
                warn!("Client {:?} write failed: {}", id, e);
                let _ = shutdown_tx.send(());
                return;
            }
        }
        if let Err(e) = writer.shutdown().await {
            debug!("Client {:?} writer shutdown failed: {}", id, e);
        }
    };
    tokio::select! {
        biased;
        _ = shutdown_rx.recv() => debug!("Client {:?} writer stopped by shutdown", id),
        _ = drain => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::DetectionError,
        intake::frame::{FramedAsyncBufferedReader, FramedAsyncBufferedWriter},
        pipeline::{Detector, DetectorPool, JsonDetector},
    };
    use serde_json::{Value, json};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    struct SlowDetector;

    impl Detector for SlowDetector {
        fn detect(&self, payload: &str, threshold: f32) -> Result<DetectionResult, DetectionError> {
            std::thread::sleep(Duration::from_millis(200));
            JsonDetector::default().detect(payload, threshold)
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    struct Peer {
        read: ReadHalf<DuplexStream>,
        write: WriteHalf<DuplexStream>,
    }

    impl Peer {
        async fn send(&mut self, message: Value) {
            let payload = serde_json::to_vec(&message).unwrap();
            self.write
                .write_all(&(payload.len() as u32).to_le_bytes())
                .await
                .unwrap();
            self.write.write_all(&payload).await.unwrap();
        }

        async fn recv(&mut self) -> ServerMessage {
            let read = async {
                let mut length = [0u8; 4];
                self.read.read_exact(&mut length).await.unwrap();
                let mut payload = vec![0u8; u32::from_le_bytes(length) as usize];
                self.read.read_exact(&mut payload).await.unwrap();
                serde_json::from_slice(&payload).unwrap()
            };
            tokio::time::timeout(Duration::from_secs(5), read)
                .await
                .expect("timed out waiting for server message")
        }

        async fn close(&mut self) {
            self.write.shutdown().await.unwrap();
        }
    }

    fn frame(frame_id: u64, detections: Value) -> Value {
        let data = json!({ "detections": detections }).to_string();
        json!({"type": "frame", "data": data, "frame_id": frame_id})
    }

    type SessionTask = tokio::task::JoinHandle<Result<SessionStatsSnapshot, AppError>>;

    fn start(detector: Arc<dyn Detector>) -> (Peer, ClientHandle, SessionTask) {
        start_with(detector, 64 * 1024, ClientSettings::default())
    }

    fn start_with(
        detector: Arc<dyn Detector>,
        buffer_size: usize,
        settings: ClientSettings,
    ) -> (Peer, ClientHandle, SessionTask) {
        let (peer_io, server_io) = tokio::io::duplex(buffer_size);
        let (server_read, server_write) = tokio::io::split(server_io);
        let (peer_read, peer_write) = tokio::io::split(peer_io);
        let pool = DetectorPool::new(detector, 1, Duration::from_secs(5));
        let (client, handle) = Client::new(
            Box::new(FramedAsyncBufferedReader::new(
                server_read,
                settings.max_message_size(),
            )),
            Box::new(FramedAsyncBufferedWriter::new(server_write)),
            pool.session_service(),
            settings,
        );
        let task = tokio::spawn(client.run());
        (
            Peer {
                read: peer_read,
                write: peer_write,
            },
            handle,
            task,
        )
    }

    fn expect_detection(message: ServerMessage) -> DetectionMessage {
        match message {
            ServerMessage::Detection(detection) => detection,
            other => panic!("expected detection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let (mut peer, _handle, task) = start(Arc::new(JsonDetector::default()));
        assert_eq!(peer.recv().await, ServerMessage::connected());

        peer.send(json!({"type": "ping"})).await;
        assert_eq!(peer.recv().await, ServerMessage::Pong);

        let chair = json!([{"name": "chair", "confidence": 0.9, "depth": 0.8}]);
        peer.send(frame(1, chair.clone())).await;
        let first = expect_detection(peer.recv().await);
        assert_eq!(first.frame_id, Some(1));
        assert_eq!(first.object_count, 1);
        assert_eq!(first.objects[0].distance_zone, Zone::VeryNear);
        assert_eq!(first.objects[0].distance_estimate, "very near");
        assert!(first.changes.appeared.is_empty());

        peer.send(frame(2, chair)).await;
        let second = expect_detection(peer.recv().await);
        assert_eq!(second.changes.frame_count, 2);
        assert_eq!(second.changes.appeared, vec!["chair".to_string()]);
        assert!(second.changes.has_significant_change);

        peer.close().await;
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.frames_processed, 2);
    }

    #[tokio::test]
    async fn test_invalid_input_keeps_connection() {
        let (mut peer, _handle, task) = start(Arc::new(JsonDetector::default()));
        peer.recv().await;

        peer.send(json!({"type": "config", "confidence_threshold": 2.0}))
            .await;
        assert!(matches!(
            peer.recv().await,
            ServerMessage::Error {
                code: ErrorCode::InvalidConfig,
                ..
            }
        ));

        peer.send(json!({"type": "frame", "data": ""})).await;
        assert!(matches!(
            peer.recv().await,
            ServerMessage::Error {
                code: ErrorCode::InvalidFrame,
                ..
            }
        ));

        peer.send(json!({"type": "teleport"})).await;
        assert!(matches!(
            peer.recv().await,
            ServerMessage::Error {
                code: ErrorCode::InvalidMessage,
                ..
            }
        ));

        peer.send(json!({"type": "frame", "data": "not json", "frame_id": 5}))
            .await;
        assert!(matches!(
            peer.recv().await,
            ServerMessage::Error {
                code: ErrorCode::ProcessingError,
                ..
            }
        ));

        peer.send(json!({"type": "ping"})).await;
        assert_eq!(peer.recv().await, ServerMessage::Pong);

        peer.close().await;
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.frames_rejected, 1);
        assert_eq!(stats.frames_failed, 1);
    }

    #[tokio::test]
    async fn test_confidence_threshold_applies_to_later_frames() {
        let (mut peer, _handle, task) = start(Arc::new(JsonDetector::default()));
        peer.recv().await;

        let cup = json!([{"name": "cup", "confidence": 0.3, "depth": 0.5}]);
        peer.send(frame(1, cup.clone())).await;
        assert_eq!(expect_detection(peer.recv().await).object_count, 0);

        peer.send(json!({"type": "config", "confidence_threshold": 0.2}))
            .await;
        peer.send(frame(2, cup)).await;
        assert_eq!(expect_detection(peer.recv().await).object_count, 1);

        peer.close().await;
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_reset_restarts_frame_count() {
        let (mut peer, _handle, task) = start(Arc::new(JsonDetector::default()));
        peer.recv().await;

        let dog = json!([{"name": "dog", "confidence": 0.9, "depth": 0.2}]);
        peer.send(frame(1, dog.clone())).await;
        peer.recv().await;
        peer.send(frame(2, dog.clone())).await;
        peer.recv().await;

        peer.send(json!({"type": "reset"})).await;
        peer.send(frame(3, dog)).await;
        let after_reset = expect_detection(peer.recv().await);
        assert_eq!(after_reset.changes.frame_count, 1);
        assert!(after_reset.changes.appeared.is_empty());

        peer.close().await;
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_busy_session_keeps_only_latest_frame() {
        let (mut peer, _handle, task) = start(Arc::new(SlowDetector));
        peer.recv().await;

        let person = json!([{"name": "person", "confidence": 0.9, "depth": 0.5}]);
        for frame_id in 1..=3 {
            peer.send(frame(frame_id, person.clone())).await;
        }

        let mut seen = Vec::new();
        loop {
            let detection = expect_detection(peer.recv().await);
            seen.push(detection.frame_id);
            if detection.frame_id == Some(3) {
                break;
            }
        }
        assert!(!seen.contains(&Some(2)) || !seen.contains(&Some(1)));
        assert!(seen.len() <= 2);

        peer.close().await;
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.frames_received, 3);
        assert!(stats.frames_replaced >= 1);
        assert_eq!(stats.frames_processed as usize, seen.len());
    }

    #[tokio::test]
    async fn test_handle_shutdown_stops_session() {
        let (mut peer, handle, task) = start(Arc::new(JsonDetector::default()));
        peer.recv().await;
        handle.send_shutdown().unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_oversized_messages_count_as_received() {
        let settings = ClientSettings {
            max_frame_size: 64,
            ..ClientSettings::default()
        };
        let (mut peer, _handle, task) =
            start_with(Arc::new(JsonDetector::default()), 64 * 1024, settings);
        peer.recv().await;

        let skipped = "a".repeat(settings.max_message_size() + 1);
        peer.send(json!({"type": "frame", "data": skipped})).await;
        peer.send(json!({"type": "frame", "data": "a".repeat(100)}))
            .await;
        for _ in 0..2 {
            assert!(matches!(
                peer.recv().await,
                ServerMessage::Error {
                    code: ErrorCode::InvalidFrame,
                    ..
                }
            ));
        }

        peer.close().await;
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.frames_rejected, 2);
        assert_eq!(stats.frames_processed, 0);
    }

    // A 64-byte pipe that is never read stalls the writer on the first reply.
    async fn stall_writer(peer: &mut Peer) {
        for _ in 0..30 {
            peer.send(json!({"type": "ping"})).await;
        }
    }

    #[tokio::test]
    async fn test_shutdown_ends_session_when_peer_stops_reading() {
        let (mut peer, handle, task) =
            start_with(Arc::new(JsonDetector::default()), 64, ClientSettings::default());
        stall_writer(&mut peer).await;

        handle.send_shutdown().unwrap();
        let result = tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .expect("session kept running after shutdown")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_ends_session_when_peer_stops_reading() {
        let (mut peer, _handle, task) =
            start_with(Arc::new(JsonDetector::default()), 64, ClientSettings::default());
        stall_writer(&mut peer).await;

        peer.close().await;
        let result = tokio::time::timeout(WRITER_DRAIN_TIMEOUT * 3, task)
            .await
            .expect("session kept running after disconnect")
            .unwrap();
        assert!(result.is_ok());
    }
}
