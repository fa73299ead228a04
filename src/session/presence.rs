//! Debounced presence tracking for detected object classes.
//!
//! Lifecycle of a key:
//! absent → Appearing → Confirmed → Disappearing → absent
//!
//! "Absent" is represented by the key not being tracked at all.

use indexmap::{IndexMap, IndexSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceConfig {
    /// Consecutive observed frames before an object counts as appeared (default: 2)
    pub appear_frames: u32,
    /// Consecutive missing frames before a confirmed object counts as gone (default: 3)
    pub disappear_frames: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            appear_frames: 2,
            disappear_frames: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    /// Observed but not confirmed yet.
    Appearing {
        /// Consecutive frames observed so far.
        seen: u32,
    },
    /// Confirmed present and observed in the latest frame.
    Confirmed,
    /// Confirmed earlier, currently missing.
    Disappearing {
        /// Consecutive frames missing so far.
        missed: u32,
    },
}

/// Events produced by one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceChanges {
    pub appeared: Vec<String>,
    pub disappeared: Vec<String>,
}

/// Transition outcome for a single key.
enum Step {
    Keep(PresenceState),
    Appeared,
    Disappeared,
    Forget,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectPresenceTracker {
    config: PresenceConfig,
    states: IndexMap<String, PresenceState>,
}

impl ObjectPresenceTracker {
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            config,
            states: IndexMap::new(),
        }
    }

    /// Advance every tracked key by one frame.
    ///
    /// Keys in `current` that are not tracked yet start as `Appearing`.
    /// Events are reported in the order keys were first observed.
    pub fn observe(&mut self, current: &IndexSet<String>) -> PresenceChanges {
        for key in current {
            if !self.states.contains_key(key) {
                self.states
                    .insert(key.clone(), PresenceState::Appearing { seen: 0 });
            }
        }

        let config = self.config;
        let mut changes = PresenceChanges::default();
        self.states.retain(|key, state| {
            match transition(*state, current.contains(key), &config) {
                Step::Keep(next) => {
                    *state = next;
                    true
                }
                Step::Appeared => {
                    changes.appeared.push(key.clone());
                    *state = PresenceState::Confirmed;
                    true
                }
                Step::Disappeared => {
                    changes.disappeared.push(key.clone());
                    false
                }
                Step::Forget => false,
            }
        });
        changes
    }

    pub fn state(&self, key: &str) -> Option<PresenceState> {
        self.states.get(key).copied()
    }

    /// Keys currently confirmed, including those pending disappearance.
    pub fn confirmed(&self) -> impl Iterator<Item = &str> {
        self.states.iter().filter_map(|(key, state)| match state {
            PresenceState::Confirmed | PresenceState::Disappearing { .. } => Some(key.as_str()),
            PresenceState::Appearing { .. } => None,
        })
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

fn transition(state: PresenceState, observed: bool, config: &PresenceConfig) -> Step {
    match (state, observed) {
        (PresenceState::Appearing { seen }, true) => {
            let seen = seen.saturating_add(1);
            if seen >= config.appear_frames {
                Step::Appeared
            } else {
                Step::Keep(PresenceState::Appearing { seen })
            }
        }
        // A single miss resets candidacy entirely.
        (PresenceState::Appearing { .. }, false) => Step::Forget,
        (PresenceState::Confirmed, true) => Step::Keep(PresenceState::Confirmed),
        (PresenceState::Confirmed, false) => missing(0, config),
        (PresenceState::Disappearing { .. }, true) => Step::Keep(PresenceState::Confirmed),
        (PresenceState::Disappearing { missed }, false) => missing(missed, config),
    }
}

fn missing(missed: u32, config: &PresenceConfig) -> Step {
    let missed = missed.saturating_add(1);
    if missed >= config.disappear_frames {
        Step::Disappeared
    } else {
        Step::Keep(PresenceState::Disappearing { missed })
    }
}
