use thiserror::Error;
use uuid::Uuid;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to bind to {1}: {0}")]
    Bind(std::io::Error, String),
    #[error("Failed to accept connection: {0}")]
    Accept(std::io::Error),
    #[error("Client Error: {0}")]
    Client(String),
    #[error("Failed to send shutdown to client handle: {0}")]
    ClientShutdown(Uuid),
    #[error("Client supervisor is unavailable: {0}")]
    Supervisor(String),
    #[error("Frame Error: {0}")]
    Frame(#[from] FrameError),
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),
}

// Transport Error Type
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Failed to read message: {0}")]
    Read(std::io::Error),
    #[error("Failed to write message: {0}")]
    Write(std::io::Error),
    #[error("Message of {0} bytes exceeds the limit of {1} bytes")]
    Oversized(usize, usize),
    #[error("Failed to decode message: {0}")]
    Decode(serde_json::Error),
    #[error("Failed to encode message: {0}")]
    Encode(serde_json::Error),
}

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Invalid frame payload: {0}")]
    InvalidPayload(String),
    #[error("Detection timed out")]
    Timeout,
    #[error("Detection worker failed: {0}")]
    Worker(String),
    #[error("Detection service error: {0}")]
    Service(String),
}

impl From<tower::BoxError> for DetectionError {
    fn from(error: tower::BoxError) -> Self {
        if error.is::<tower::timeout::error::Elapsed>() {
            return DetectionError::Timeout;
        }
        match error.downcast::<DetectionError>() {
            Ok(detection_error) => *detection_error,
            Err(other) => DetectionError::Service(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid setting {0}: {1}")]
    Invalid(&'static str, String),
}
