use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{FrameKitError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub clock: ClockConfig,
    pub player: PlayerConfig,
}

impl AppConfig {
    /// Parses a configuration document. Missing fields fall back to defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.clock.validate()?;
        self.player.validate()
    }
}

/// Settings for the shared frame clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Refresh rate that maps to a delta scale of 1.0.
    pub desired_fps: f64,
    /// Initial time scale multiplier.
    pub time_scale: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            desired_fps: 60.0,
            time_scale: 1.0,
        }
    }
}

impl ClockConfig {
    /// Duration of one ideal frame in milliseconds.
    pub fn ideal_frame_ms(&self) -> f64 {
        1000.0 / self.desired_fps
    }

    fn validate(&self) -> Result<()> {
        if !(self.desired_fps > 0.0) {
            return Err(FrameKitError::InvalidConfig(format!(
                "clock.desired_fps must be positive, got {}",
                self.desired_fps
            )));
        }
        Ok(())
    }
}

/// Whether asset load failures stay silent or surface to the owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadFailurePolicy {
    /// Log the failure and keep waiting; the sprite never appears.
    #[default]
    Silent,
    /// Move the player to its failed state and notify the observer.
    Report,
}

/// Settings for sprite sheet playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub base_fps: f64,
    /// Number of base frames each sprite frame is held for.
    pub frame_stretch: f64,
    pub loop_pause_min_ms: f64,
    pub loop_pause_jitter_ms: f64,
    pub load_timeout_ms: Option<f64>,
    pub failure_policy: LoadFailurePolicy,
    pub rng_seed: Option<u64>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            base_fps: 60.0,
            frame_stretch: 8.0,
            loop_pause_min_ms: 1000.0,
            loop_pause_jitter_ms: 2000.0,
            load_timeout_ms: None,
            failure_policy: LoadFailurePolicy::Silent,
            rng_seed: None,
        }
    }
}

impl PlayerConfig {
    /// Time each sprite frame stays on screen. With the defaults this is
    /// 8/60 s, i.e. roughly 7.5 sprite frames per second.
    pub fn frame_duration_ms(&self) -> f64 {
        (self.frame_stretch / self.base_fps) * 1000.0
    }

    fn validate(&self) -> Result<()> {
        if !(self.base_fps > 0.0) || !(self.frame_stretch > 0.0) {
            return Err(FrameKitError::InvalidConfig(format!(
                "player.base_fps and player.frame_stretch must be positive, got {} and {}",
                self.base_fps, self.frame_stretch
            )));
        }
        if self.loop_pause_min_ms < 0.0 || self.loop_pause_jitter_ms < 0.0 {
            return Err(FrameKitError::InvalidConfig(
                "loop pause values cannot be negative".to_string(),
            ));
        }
        if matches!(self.load_timeout_ms, Some(timeout) if !(timeout > 0.0)) {
            return Err(FrameKitError::InvalidConfig(
                "player.load_timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}
