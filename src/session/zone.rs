use serde::{Deserialize, Serialize};
use std::fmt;

/// Discretized proximity of an object, ordered by danger.
///
/// Variant order matters: `Far < Near < VeryNear`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Far,
    Near,
    VeryNear,
}

impl Zone {
    /// Human readable label used for narration.
    pub fn label(self) -> &'static str {
        match self {
            Zone::Far => "far",
            Zone::Near => "near",
            Zone::VeryNear => "very near",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Zone::Far => "far",
            Zone::Near => "near",
            Zone::VeryNear => "very_near",
        };
        f.write_str(name)
    }
}

/// Boundaries used to classify a depth value in `[0, 1]` (higher is nearer).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneThresholds {
    pub near: f64,
    pub very_near: f64,
}

impl ZoneThresholds {
    pub fn new(near: f64, very_near: f64) -> Self {
        Self { near, very_near }
    }

    pub fn classify(&self, depth: f64) -> Zone {
        if depth > self.very_near {
            Zone::VeryNear
        } else if depth > self.near {
            Zone::Near
        } else {
            Zone::Far
        }
    }
}

impl Default for ZoneThresholds {
    fn default() -> Self {
        Self {
            near: 0.35,
            very_near: 0.7,
        }
    }
}
