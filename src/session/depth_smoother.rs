use crate::session::zone::{Zone, ZoneThresholds};
use indexmap::{IndexMap, IndexSet};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthSmootherConfig {
    /// Weight of the newest sample, in `(0, 1]`. Higher reacts faster.
    pub alpha: f64,
    pub thresholds: ZoneThresholds,
    /// Consecutive frames a new zone must hold before it is confirmed.
    pub persistence_frames: u32,
}

impl Default for DepthSmootherConfig {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            thresholds: ZoneThresholds::default(),
            persistence_frames: 3,
        }
    }
}

/// Run of identical raw classifications, not yet confirmed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneStreak {
    pub zone: Zone,
    pub run: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepthTrack {
    pub smoothed: f64,
    pub streak: ZoneStreak,
    pub confirmed: Zone,
}

impl DepthTrack {
    fn first_sighting(depth: f64, zone: Zone) -> Self {
        Self {
            smoothed: depth,
            streak: ZoneStreak { zone, run: 1 },
            confirmed: zone,
        }
    }
}

/// Exponential smoothing of per-object depth plus zone persistence.
///
/// Smoothing alone still lets a value hovering on a threshold flip the label
/// every other frame, so a zone change is only confirmed once the raw
/// classification has held for `persistence_frames` frames.
#[derive(Debug, Clone)]
pub struct DepthSmoother {
    config: DepthSmootherConfig,
    tracks: IndexMap<String, DepthTrack>,
}

impl DepthSmoother {
    pub fn new(config: DepthSmootherConfig) -> Self {
        Self {
            config,
            tracks: IndexMap::new(),
        }
    }

    /// Feed one raw depth for `key` and return its confirmed zone.
    pub fn update(&mut self, key: &str, raw_depth: f64) -> Zone {
        let raw_depth = sanitize_depth(raw_depth);
        let alpha = self.config.alpha;
        let thresholds = self.config.thresholds;
        let persistence = self.config.persistence_frames;

        match self.tracks.get_mut(key) {
            Some(track) => {
                track.smoothed = alpha * raw_depth + (1.0 - alpha) * track.smoothed;
                let zone = thresholds.classify(track.smoothed);
                track.streak = if zone == track.streak.zone {
                    ZoneStreak {
                        zone,
                        run: track.streak.run.saturating_add(1),
                    }
                } else {
                    ZoneStreak { zone, run: 1 }
                };
                if track.streak.run >= persistence {
                    track.confirmed = zone;
                }
                track.confirmed
            }
            None => {
                let zone = thresholds.classify(raw_depth);
                self.tracks
                    .insert(key.to_string(), DepthTrack::first_sighting(raw_depth, zone));
                zone
            }
        }
    }

    /// Drop every track whose key is not in `active_keys`.
    pub fn cleanup(&mut self, active_keys: &IndexSet<String>) {
        self.tracks.retain(|key, _| active_keys.contains(key));
    }

    pub fn smoothed_value(&self, key: &str) -> Option<f64> {
        self.tracks.get(key).map(|track| track.smoothed)
    }

    #[cfg(test)]
    pub fn track(&self, key: &str) -> Option<&DepthTrack> {
        self.tracks.get(key)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl Default for DepthSmoother {
    fn default() -> Self {
        Self::new(DepthSmootherConfig::default())
    }
}

// Out-of-contract input: clamp into [0, 1], NaN and infinities count as 0.
fn sanitize_depth(depth: f64) -> f64 {
    if depth.is_finite() {
        depth.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
