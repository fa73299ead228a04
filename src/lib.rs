pub mod config;
pub mod error;
pub mod intake;
pub mod network;
pub mod pipeline;
pub mod session;

pub use config::Settings;
pub use error::{AppError, ConfigError, DetectionError, FrameError};
pub use intake::client::{Client, ClientManager, ClientManagerHandle, ClientSettings};
pub use network::Server;
pub use session::{ChangeReport, SessionState, Zone};
