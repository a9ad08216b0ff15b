/// Engine configuration: timings and the exit sentinel.
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for one dialogue session. Every field has a default, so a
/// config file only needs to list what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Node loaded by `DialogueEngine::start`.
    pub start_node: String,
    /// Reserved option target that leaves the dialogue.
    pub exit_node: String,
    /// Scene handed to the scene-transition collaborator on exit.
    pub exit_scene: String,
    /// Seconds between typewriter steps.
    pub typing_speed: f32,
    /// Characters revealed per typewriter step.
    pub chars_per_tick: usize,
    pub panel_fade_delay: f32,
    pub panel_fade_duration: f32,
    /// Seconds for each half (out, in) of a music crossfade.
    pub music_fade_duration: f32,
    pub music_volume: f32,
    /// Appended to the last line of a terminal node.
    pub end_marker: String,
    /// Track started by `DialogueEngine::start`, before the first node.
    pub default_music: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            start_node: "start".to_string(),
            exit_node: "END".to_string(),
            exit_scene: "MainMenu".to_string(),
            typing_speed: 0.03,
            chars_per_tick: 1,
            panel_fade_delay: 0.5,
            panel_fade_duration: 1.0,
            music_fade_duration: 1.0,
            music_volume: 1.0,
            end_marker: "\n\n[End]".to_string(),
            default_music: None,
        }
    }
}

impl EngineConfig {
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let timings = [
            ("typing_speed", self.typing_speed),
            ("panel_fade_delay", self.panel_fade_delay),
            ("panel_fade_duration", self.panel_fade_duration),
            ("music_fade_duration", self.music_fade_duration),
        ];
        for (name, value) in timings {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a non-negative number of seconds, got {}",
                    name, value
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.music_volume) {
            return Err(ConfigError::Invalid(format!(
                "music_volume must be within 0..=1, got {}",
                self.music_volume
            )));
        }
        if self.exit_node.is_empty() || self.start_node.is_empty() {
            return Err(ConfigError::Invalid(
                "start_node and exit_node must not be empty".to_string(),
            ));
        }
        if self.start_node == self.exit_node {
            return Err(ConfigError::Invalid(
                "start_node must differ from exit_node".to_string(),
            ));
        }
        Ok(())
    }

    pub fn typing_interval(&self) -> Duration {
        seconds(self.typing_speed)
    }

    pub fn panel_delay(&self) -> Duration {
        seconds(self.panel_fade_delay)
    }

    pub fn panel_duration(&self) -> Duration {
        seconds(self.panel_fade_duration)
    }

    pub fn music_fade(&self) -> Duration {
        seconds(self.music_fade_duration)
    }
}

// Rounded to whole microseconds so 0.03 means exactly 30ms.
fn seconds(value: f32) -> Duration {
    if !value.is_finite() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_micros((f64::from(value) * 1_000_000.0).round() as u64)
}
