use crate::session::{
    depth_smoother::{DepthSmoother, DepthSmootherConfig},
    presence::{ObjectPresenceTracker, PresenceConfig},
    zone::Zone,
};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// One named detection as delivered by the detector collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub name: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_hint: Option<Zone>,
}

impl Detection {
    pub fn new(name: impl Into<String>, confidence: f32) -> Self {
        Self {
            name: name.into(),
            confidence,
            zone_hint: None,
        }
    }

    pub fn with_zone_hint(mut self, zone: Zone) -> Self {
        self.zone_hint = Some(zone);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionConfig {
    pub depth: DepthSmootherConfig,
    pub presence: PresenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ZoneChange {
    pub name: String,
    pub from_zone: Zone,
    pub to_zone: Zone,
}

/// Everything that changed for a session in one frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeReport {
    pub frame_count: u64,
    pub appeared: Vec<String>,
    pub disappeared: Vec<String>,
    pub zone_changes: Vec<ZoneChange>,
    pub smoothed_zones: IndexMap<String, Zone>,
    pub smoothed_depths: IndexMap<String, f64>,
    pub has_significant_change: bool,
    pub current_objects: Vec<String>,
}

/// Per-connection state engine turning raw detections into debounced events.
#[derive(Debug, Clone)]
pub struct SessionState {
    config: SessionConfig,
    presence: ObjectPresenceTracker,
    depth: DepthSmoother,
    frame_count: u64,
    previous_zones: IndexMap<String, Zone>,
}

impl SessionState {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            presence: ObjectPresenceTracker::new(config.presence),
            depth: DepthSmoother::new(config.depth),
            frame_count: 0,
            previous_zones: IndexMap::new(),
        }
    }

    /// Consume one frame worth of detections and depths.
    ///
    /// `raw_depths` is expected to hold one (nearest) value per name.
    /// Depth cleanup and the zone snapshot run on every frame, so a frame
    /// with no depths at all drops every depth track and previous zone.
    pub fn compute_changes<'a, I>(
        &mut self,
        detections: I,
        raw_depths: &IndexMap<String, f64>,
    ) -> ChangeReport
    where
        I: IntoIterator<Item = &'a Detection>,
    {
        self.frame_count += 1;

        let current: IndexSet<String> = detections
            .into_iter()
            .map(|detection| detection.name.clone())
            .collect();

        let presence = self.presence.observe(&current);

        let mut smoothed_zones = IndexMap::with_capacity(raw_depths.len());
        for (name, raw_depth) in raw_depths {
            let zone = self.depth.update(name, *raw_depth);
            smoothed_zones.insert(name.clone(), zone);
        }
        let smoothed_depths = smoothed_zones
            .keys()
            .filter_map(|name| {
                self.depth
                    .smoothed_value(name)
                    .map(|value| (name.clone(), value))
            })
            .collect();
        self.depth.cleanup(&current);

        let zone_changes: Vec<ZoneChange> = smoothed_zones
            .iter()
            .filter_map(|(name, zone)| match self.previous_zones.get(name) {
                Some(previous) if previous != zone => Some(ZoneChange {
                    name: name.clone(),
                    from_zone: *previous,
                    to_zone: *zone,
                }),
                _ => None,
            })
            .collect();
        self.previous_zones = smoothed_zones.clone();

        let has_significant_change = !presence.appeared.is_empty()
            || !presence.disappeared.is_empty()
            || zone_changes
                .iter()
                .any(|change| change.to_zone == Zone::VeryNear);

        ChangeReport {
            frame_count: self.frame_count,
            appeared: presence.appeared,
            disappeared: presence.disappeared,
            zone_changes,
            smoothed_zones,
            smoothed_depths,
            has_significant_change,
            current_objects: current.into_iter().collect(),
        }
    }

    /// Forget all history, keeping the configuration.
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn confirmed_objects(&self) -> Vec<String> {
        self.presence.confirmed().map(str::to_string).collect()
    }

    pub fn tracked_depths(&self) -> usize {
        self.depth.len()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
