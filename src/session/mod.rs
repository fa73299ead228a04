pub mod depth_smoother;
pub mod presence;
pub mod session_state;
pub mod zone;

pub use depth_smoother::{DepthSmoother, DepthSmootherConfig, DepthTrack, ZoneStreak};
pub use presence::{ObjectPresenceTracker, PresenceChanges, PresenceConfig, PresenceState};
pub use session_state::{ChangeReport, Detection, SessionConfig, SessionState, ZoneChange};
pub use zone::{Zone, ZoneThresholds};
