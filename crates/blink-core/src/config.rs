//! Tunable thresholds and weights.
//!
//! Every constructor validates its input and fails with [`ConfigError`]
//! instead of clamping.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// EAR below which the eyes count as closed.
pub const DEFAULT_CLOSED_THRESHOLD: f32 = 0.25;
/// EAR above which the eyes count as fully reopened (interactive capture).
pub const DEFAULT_OPEN_THRESHOLD_INTERACTIVE: f32 = 0.39;
/// EAR above which the eyes count as fully reopened (batch classification).
pub const DEFAULT_OPEN_THRESHOLD_BATCH: f32 = 0.37;
/// Time given to the subject to take spectacles off before capture begins.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);
/// Mean grayscale level above which a frame is flagged as over-exposed.
pub const DEFAULT_BRIGHTNESS_LIMIT: f32 = 200.0;

/// Fusion weights: frame structure, lens pattern, symmetry, bridge.
pub const DEFAULT_SPECTACLE_WEIGHTS: [f32; 4] = [0.35, 0.30, 0.20, 0.15];
/// Fused confidence above which spectacles are reported.
pub const DEFAULT_SPECTACLE_THRESHOLD: f32 = 0.40;

/// Euclidean distance below which two embeddings are the same person.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

const WEIGHT_SUM_TOLERANCE: f32 = 1e-3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("closed threshold {closed} must be below open threshold {open}")]
    InvertedThresholds { closed: f32, open: f32 },
    #[error("spectacle weights must sum to 1.0, got {0}")]
    WeightSum(f32),
}

fn check_range(name: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    // NaN fails both comparisons and is rejected here too.
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}

/// Whether the blink state machine serves a live camera or a recorded batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// One capture cycle, then the session is complete.
    Interactive,
    /// Cycles repeat for as long as frames keep coming.
    Batch,
}

/// Blink state machine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlinkConfig {
    pub mode: CaptureMode,
    pub closed_threshold: f32,
    pub open_threshold: f32,
    /// `None` disables the spectacle grace period.
    pub grace_period: Option<Duration>,
    /// End the grace period early on the first frame scored free of spectacles.
    pub end_grace_when_clear: bool,
    pub brightness_limit: f32,
}

impl BlinkConfig {
    /// Live camera defaults: 0.25 / 0.39 with a five second grace period.
    pub fn interactive() -> Self {
        Self {
            mode: CaptureMode::Interactive,
            closed_threshold: DEFAULT_CLOSED_THRESHOLD,
            open_threshold: DEFAULT_OPEN_THRESHOLD_INTERACTIVE,
            grace_period: Some(DEFAULT_GRACE_PERIOD),
            end_grace_when_clear: true,
            brightness_limit: DEFAULT_BRIGHTNESS_LIMIT,
        }
    }

    /// Recorded batch defaults: 0.25 / 0.37, no grace period.
    pub fn batch() -> Self {
        Self {
            mode: CaptureMode::Batch,
            closed_threshold: DEFAULT_CLOSED_THRESHOLD,
            open_threshold: DEFAULT_OPEN_THRESHOLD_BATCH,
            grace_period: None,
            end_grace_when_clear: false,
            brightness_limit: DEFAULT_BRIGHTNESS_LIMIT,
        }
    }

    pub fn with_thresholds(mut self, closed: f32, open: f32) -> Result<Self, ConfigError> {
        self.closed_threshold = closed;
        self.open_threshold = open;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("closed_threshold", self.closed_threshold, 0.0, 1.0)?;
        check_range("open_threshold", self.open_threshold, 0.0, 1.0)?;
        if self.closed_threshold >= self.open_threshold {
            return Err(ConfigError::InvertedThresholds {
                closed: self.closed_threshold,
                open: self.open_threshold,
            });
        }
        check_range("brightness_limit", self.brightness_limit, 0.0, 255.0)
    }
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Spectacle scorer fusion weights and decision threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpectacleConfig {
    pub weights: [f32; 4],
    pub threshold: f32,
}

impl SpectacleConfig {
    pub fn new(weights: [f32; 4], threshold: f32) -> Result<Self, ConfigError> {
        let config = Self { weights, threshold };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for weight in self.weights {
            check_range("spectacle weight", weight, 0.0, 1.0)?;
        }
        let sum: f32 = self.weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::WeightSum(sum));
        }
        check_range("spectacle threshold", self.threshold, 0.0, 1.0)
    }
}

impl Default for SpectacleConfig {
    fn default() -> Self {
        Self {
            weights: DEFAULT_SPECTACLE_WEIGHTS,
            threshold: DEFAULT_SPECTACLE_THRESHOLD,
        }
    }
}

/// Face match decision threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchConfig {
    pub threshold: f32,
}

impl MatchConfig {
    pub fn new(threshold: f32) -> Result<Self, ConfigError> {
        let config = Self { threshold };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("match threshold", self.threshold, 0.0, 2.0)
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(BlinkConfig::interactive().validate().is_ok());
        assert!(BlinkConfig::batch().validate().is_ok());
        assert!(SpectacleConfig::default().validate().is_ok());
        assert!(MatchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let err = BlinkConfig::batch().with_thresholds(0.4, 0.3).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvertedThresholds {
                closed: 0.4,
                open: 0.3
            }
        );
    }

    #[test]
    fn test_equal_thresholds_rejected() {
        assert!(BlinkConfig::batch().with_thresholds(0.3, 0.3).is_err());
    }

    #[test]
    fn test_nan_threshold_rejected() {
        assert!(matches!(
            BlinkConfig::batch().with_thresholds(f32::NAN, 0.3),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(MatchConfig::new(f32::NAN).is_err());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let err = SpectacleConfig::new([0.5, 0.5, 0.5, 0.5], 0.4).unwrap_err();
        assert!(matches!(err, ConfigError::WeightSum(_)));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let err = SpectacleConfig::new([1.2, -0.2, 0.0, 0.0], 0.4).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }

    #[test]
    fn test_threshold_not_clamped() {
        assert!(SpectacleConfig::new(DEFAULT_SPECTACLE_WEIGHTS, 1.5).is_err());
        assert!(MatchConfig::new(-0.1).is_err());
    }
}
