use crate::error::ConfigError;
use crate::session::{DepthSmootherConfig, PresenceConfig, SessionConfig, ZoneThresholds};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "navia";
const ENV_PREFIX: &str = "NAVIA";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub server: ServerSettings,
    pub realtime: RealtimeSettings,
    pub depth: DepthSettings,
    pub presence: PresenceSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RealtimeSettings {
    pub confidence_threshold: f32,
    /// Largest accepted frame payload, in bytes.
    pub max_frame_size: usize,
    pub max_concurrent_inferences: usize,
    pub inference_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DepthSettings {
    pub smoothing_alpha: f64,
    pub zone_near: f64,
    pub zone_very_near: f64,
    pub zone_persistence: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PresenceSettings {
    pub appear_frames: u32,
    pub disappear_frames: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            server: ServerSettings::default(),
            realtime: RealtimeSettings::default(),
            depth: DepthSettings::default(),
            presence: PresenceSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            max_frame_size: 2 * 1024 * 1024,
            max_concurrent_inferences: 2,
            inference_timeout_ms: 5_000,
        }
    }
}

impl Default for DepthSettings {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.3,
            zone_near: 0.35,
            zone_very_near: 0.7,
            zone_persistence: 3,
        }
    }
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            appear_frames: 2,
            disappear_frames: 3,
        }
    }
}

impl Settings {
    /// Load settings from an optional file and `NAVIA_*` environment variables.
    ///
    /// Without an explicit path, `navia.{toml,yaml,json}` in the working
    /// directory is used when present.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
        Self::from_config(builder.build()?)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?;
        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let depth = &self.depth;
        if !(depth.smoothing_alpha > 0.0 && depth.smoothing_alpha <= 1.0) {
            return Err(invalid(
                "depth.smoothing_alpha",
                format!("{} is not in (0, 1]", depth.smoothing_alpha),
            ));
        }
        for (name, value) in [
            ("depth.zone_near", depth.zone_near),
            ("depth.zone_very_near", depth.zone_very_near),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(name, format!("{value} is not in [0, 1]")));
            }
        }
        if depth.zone_near >= depth.zone_very_near {
            return Err(invalid(
                "depth.zone_near",
                format!(
                    "{} must be below depth.zone_very_near ({})",
                    depth.zone_near, depth.zone_very_near
                ),
            ));
        }
        for (name, value) in [
            ("depth.zone_persistence", depth.zone_persistence),
            ("presence.appear_frames", self.presence.appear_frames),
            ("presence.disappear_frames", self.presence.disappear_frames),
        ] {
            if value == 0 {
                return Err(invalid(name, "must be at least 1".to_string()));
            }
        }
        let realtime = &self.realtime;
        if !(0.0..=1.0).contains(&realtime.confidence_threshold) {
            return Err(invalid(
                "realtime.confidence_threshold",
                format!("{} is not in [0, 1]", realtime.confidence_threshold),
            ));
        }
        if realtime.max_frame_size == 0 {
            return Err(invalid("realtime.max_frame_size", "must be positive".to_string()));
        }
        if realtime.max_concurrent_inferences == 0 {
            return Err(invalid(
                "realtime.max_concurrent_inferences",
                "must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            depth: DepthSmootherConfig {
                alpha: self.depth.smoothing_alpha,
                thresholds: self.zone_thresholds(),
                persistence_frames: self.depth.zone_persistence,
            },
            presence: PresenceConfig {
                appear_frames: self.presence.appear_frames,
                disappear_frames: self.presence.disappear_frames,
            },
        }
    }

    pub fn zone_thresholds(&self) -> ZoneThresholds {
        ZoneThresholds::new(self.depth.zone_near, self.depth.zone_very_near)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.realtime.inference_timeout_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn invalid(name: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid(name, reason)
}
