use crate::pipeline::types::BoundingBox;
use crate::session::{ChangeReport, Zone};
use serde::{Deserialize, Serialize};

/// Messages sent by the camera client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Frame {
        data: String,
        #[serde(default)]
        frame_id: Option<u64>,
    },
    Config {
        #[serde(default)]
        confidence_threshold: Option<f32>,
    },
    Ping,
    Reset,
}

/// Messages sent back to the camera client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Status { state: String, message: String },
    Detection(DetectionMessage),
    Error { message: String, code: ErrorCode },
    Pong,
}

impl ServerMessage {
    pub fn connected() -> Self {
        ServerMessage::Status {
            state: "connected".to_string(),
            message: "Connection established. Ready to receive frames.".to_string(),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            code,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidFrame,
    InvalidMessage,
    InvalidConfig,
    ProcessingError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionMessage {
    pub frame_id: Option<u64>,
    pub objects: Vec<ObjectReport>,
    pub object_count: usize,
    pub processing_time_ms: u64,
    pub timestamp: i64,
    pub changes: ChangeReport,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectReport {
    pub name: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    pub distance_zone: Zone,
    pub distance_estimate: String,
}
