use std::time::Duration;

use blink_core::config::{
    DEFAULT_BRIGHTNESS_LIMIT, DEFAULT_CLOSED_THRESHOLD, DEFAULT_MATCH_THRESHOLD,
    DEFAULT_SPECTACLE_THRESHOLD, DEFAULT_SPECTACLE_WEIGHTS,
};
use blink_core::{BlinkConfig, ConfigError, MatchConfig, SpectacleConfig};

/// Runtime configuration, loaded from `BLINK_*` environment variables.
///
/// Values are taken as given; [`Config::batch_config`] and friends validate
/// them into the core configuration types.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// EAR below which the eyes count as closed.
    pub ear_closed_threshold: f32,
    /// EAR above which the eyes count as reopened. `None` keeps the
    /// per-mode default (0.39 interactive, 0.37 batch).
    pub ear_open_threshold: Option<f32>,
    /// Interactive spectacle grace period in seconds; 0 disables it.
    pub grace_period_secs: u64,
    /// Mean gray level above which a frame is flagged too bright.
    pub brightness_limit: f32,
    /// Fused spectacle confidence above which spectacles are reported.
    pub spectacle_threshold: f32,
    /// Euclidean distance below which two embeddings are the same person.
    pub match_threshold: f32,
    /// Whether a spectacle-free frame ends the grace period early.
    pub end_grace_when_clear: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ear_closed_threshold: DEFAULT_CLOSED_THRESHOLD,
            ear_open_threshold: None,
            grace_period_secs: 5,
            brightness_limit: DEFAULT_BRIGHTNESS_LIMIT,
            spectacle_threshold: DEFAULT_SPECTACLE_THRESHOLD,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            end_grace_when_clear: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup; unset or unparsable values
    /// fall back to the defaults.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            ear_closed_threshold: parsed(&lookup, "BLINK_EAR_CLOSED_THRESHOLD")
                .unwrap_or(defaults.ear_closed_threshold),
            ear_open_threshold: parsed(&lookup, "BLINK_EAR_OPEN_THRESHOLD"),
            grace_period_secs: parsed(&lookup, "BLINK_GRACE_PERIOD_SECS")
                .unwrap_or(defaults.grace_period_secs),
            brightness_limit: parsed(&lookup, "BLINK_BRIGHTNESS_LIMIT")
                .unwrap_or(defaults.brightness_limit),
            spectacle_threshold: parsed(&lookup, "BLINK_SPECTACLE_THRESHOLD")
                .unwrap_or(defaults.spectacle_threshold),
            match_threshold: parsed(&lookup, "BLINK_MATCH_THRESHOLD")
                .unwrap_or(defaults.match_threshold),
            end_grace_when_clear: lookup("BLINK_END_GRACE_WHEN_CLEAR")
                .map(|v| v != "0")
                .unwrap_or(defaults.end_grace_when_clear),
        }
    }

    pub fn batch_config(&self) -> Result<BlinkConfig, ConfigError> {
        self.blink_config(BlinkConfig::batch())
    }

    pub fn interactive_config(&self) -> Result<BlinkConfig, ConfigError> {
        let mut config = self.blink_config(BlinkConfig::interactive())?;
        config.grace_period = match self.grace_period_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        config.end_grace_when_clear = self.end_grace_when_clear;
        Ok(config)
    }

    fn blink_config(&self, base: BlinkConfig) -> Result<BlinkConfig, ConfigError> {
        let open = self.ear_open_threshold.unwrap_or(base.open_threshold);
        let config = BlinkConfig {
            brightness_limit: self.brightness_limit,
            ..base
        };
        config.with_thresholds(self.ear_closed_threshold, open)
    }

    pub fn spectacle_config(&self) -> Result<SpectacleConfig, ConfigError> {
        SpectacleConfig::new(DEFAULT_SPECTACLE_WEIGHTS, self.spectacle_threshold)
    }

    pub fn match_config(&self) -> Result<MatchConfig, ConfigError> {
        MatchConfig::new(self.match_threshold)
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable configuration value");
            None
        }
    }
}
