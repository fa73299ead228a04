pub mod client;
pub mod manager;
pub mod stats;
pub mod supervisor;

pub use client::{Client, ClientHandle, ClientSettings};
pub use manager::{ClientManager, ClientManagerHandle};
pub use stats::{SessionStats, SessionStatsSnapshot};
pub use supervisor::{ClientSummary, ClientSupervisor};
