//! Reconstruction parameters.
//!
//! [`ReconstructionConfig`] is a plain value object. It can be built in code
//! (defaults, presets, `with_*` methods) or loaded from YAML/JSON through
//! `common::deserialize`; missing fields take their defaults.

use serde::{Deserialize, Serialize};

use crate::dct::validate_block_size;
use crate::error::{ConfigError, Result};
use crate::likelihood::validate_dark_count_rate;

/// How the initial proposal step size is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingInit {
    /// Half the largest working-matrix value, at least 1.
    #[default]
    HalfMaxPixel,
    /// Explicit starting value.
    Fixed(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    // ========== Merit ==========
    /// DCT block edge length N; a power of two.
    pub block_size: usize,
    /// Expected background photons per pixel, added to the modeled intensity.
    pub dark_count_rate: f64,
    /// Weight λ of the sparsity penalty, in [0, 1].
    pub regularization_factor: f64,

    // ========== Search schedule ==========
    pub initial_scaling: ScalingInit,
    /// K in `cutoff = initial_scaling / K`; must exceed 1.
    pub cutoff_divisor: f64,
    /// Factor r in (0, 1) applied to the step size when acceptance is low.
    pub decay_factor: f64,
    /// Acceptance ratio per window below which the step size decays.
    pub modification_threshold: f64,
    /// Iterations per acceptance-ratio window.
    pub iterations_per_check: usize,
    /// Offset subtracted from U ~ Uniform(0, 1) in proposals. Values below 0.5
    /// favour increases.
    pub proposal_bias: f64,

    // ========== Observation ==========
    /// Send the working matrix to the observer every this many windows (0 = never).
    pub preview_interval: usize,
    /// Random seed for reproducibility (None for random).
    pub seed: Option<u64>,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            block_size: 8,
            dark_count_rate: 0.1,
            regularization_factor: 0.5,
            initial_scaling: ScalingInit::HalfMaxPixel,
            cutoff_divisor: 100.0,
            decay_factor: 0.9,
            modification_threshold: 0.05,
            iterations_per_check: 1000,
            proposal_bias: 0.4,
            preview_interval: 0,
            seed: None,
        }
    }
}

impl ReconstructionConfig {
    // ========== Presets ==========

    /// Preset: short windows and fast decay, for previews and small images.
    pub fn fast() -> Self {
        Self {
            cutoff_divisor: 20.0,
            decay_factor: 0.5,
            iterations_per_check: 200,
            ..Default::default()
        }
    }

    /// Preset: long windows and slow decay.
    pub fn thorough() -> Self {
        Self {
            cutoff_divisor: 1000.0,
            decay_factor: 0.95,
            iterations_per_check: 5000,
            ..Default::default()
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_dark_count_rate(mut self, dark_count_rate: f64) -> Self {
        self.dark_count_rate = dark_count_rate;
        self
    }

    pub fn with_regularization_factor(mut self, regularization_factor: f64) -> Self {
        self.regularization_factor = regularization_factor;
        self
    }

    pub fn with_initial_scaling(mut self, initial_scaling: ScalingInit) -> Self {
        self.initial_scaling = initial_scaling;
        self
    }

    pub fn with_preview_interval(mut self, preview_interval: usize) -> Self {
        self.preview_interval = preview_interval;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    // ========== Validation ==========

    pub fn validate(&self) -> Result<()> {
        validate_block_size(self.block_size)?;
        validate_dark_count_rate(self.dark_count_rate)?;

        check(
            "regularization_factor",
            (0.0..=1.0).contains(&self.regularization_factor),
            || format!("must be within [0, 1], got {}", self.regularization_factor),
        )?;
        check(
            "cutoff_divisor",
            self.cutoff_divisor.is_finite() && self.cutoff_divisor > 1.0,
            || format!("must be finite and greater than 1, got {}", self.cutoff_divisor),
        )?;
        check(
            "decay_factor",
            self.decay_factor > 0.0 && self.decay_factor < 1.0,
            || format!("must be within (0, 1), got {}", self.decay_factor),
        )?;
        check(
            "modification_threshold",
            (0.0..=1.0).contains(&self.modification_threshold),
            || format!("must be within [0, 1], got {}", self.modification_threshold),
        )?;
        check(
            "iterations_per_check",
            self.iterations_per_check > 0,
            || "must be at least 1".to_string(),
        )?;
        check(
            "proposal_bias",
            self.proposal_bias > 0.0 && self.proposal_bias < 1.0,
            || format!("must be within (0, 1), got {}", self.proposal_bias),
        )?;
        if let ScalingInit::Fixed(value) = self.initial_scaling {
            check(
                "initial_scaling",
                value.is_finite() && value > 0.0,
                || format!("fixed value must be finite and positive, got {}", value),
            )?;
        }

        Ok(())
    }
}

fn check(name: &'static str, valid: bool, reason: impl FnOnce() -> String) -> Result<()> {
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: reason(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use common::FileFormat;

    fn invalid_parameter(config: &ReconstructionConfig) -> Option<&'static str> {
        match config.validate() {
            Err(Error::Config(ConfigError::InvalidParameter { name, .. })) => Some(name),
            _ => None,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ReconstructionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.block_size, 8);
        assert_eq!(config.initial_scaling, ScalingInit::HalfMaxPixel);
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(ReconstructionConfig::fast().validate().is_ok());
        assert!(ReconstructionConfig::thorough().validate().is_ok());
        assert_eq!(ReconstructionConfig::fast().iterations_per_check, 200);
    }

    #[test]
    fn test_builder() {
        let config = ReconstructionConfig::default()
            .with_block_size(16)
            .with_dark_count_rate(0.3)
            .with_regularization_factor(0.2)
            .with_initial_scaling(ScalingInit::Fixed(4.0))
            .with_preview_interval(2)
            .with_seed(7);

        assert_eq!(config.block_size, 16);
        assert!((config.dark_count_rate - 0.3).abs() < f64::EPSILON);
        assert!((config.regularization_factor - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.initial_scaling, ScalingInit::Fixed(4.0));
        assert_eq!(config.preview_interval, 2);
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn test_validation_errors() {
        assert_eq!(
            ReconstructionConfig::default()
                .with_block_size(10)
                .validate()
                .unwrap_err(),
            Error::Config(ConfigError::InvalidBlockSize(10))
        );
        assert!(matches!(
            ReconstructionConfig::default()
                .with_dark_count_rate(0.0)
                .validate(),
            Err(Error::Config(ConfigError::InvalidDarkCountRate(_)))
        ));

        let base = ReconstructionConfig::default();
        let cases = [
            (
                ReconstructionConfig {
                    regularization_factor: 1.5,
                    ..base.clone()
                },
                "regularization_factor",
            ),
            (
                ReconstructionConfig {
                    cutoff_divisor: 1.0,
                    ..base.clone()
                },
                "cutoff_divisor",
            ),
            (
                ReconstructionConfig {
                    decay_factor: 1.0,
                    ..base.clone()
                },
                "decay_factor",
            ),
            (
                ReconstructionConfig {
                    modification_threshold: -0.1,
                    ..base.clone()
                },
                "modification_threshold",
            ),
            (
                ReconstructionConfig {
                    iterations_per_check: 0,
                    ..base.clone()
                },
                "iterations_per_check",
            ),
            (
                ReconstructionConfig {
                    proposal_bias: 0.0,
                    ..base.clone()
                },
                "proposal_bias",
            ),
            (
                base.clone().with_initial_scaling(ScalingInit::Fixed(-2.0)),
                "initial_scaling",
            ),
        ];

        for (config, name) in cases {
            assert_eq!(invalid_parameter(&config), Some(name));
        }
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "block_size: 16\nregularization_factor: 0.25\nseed: 42\n";
        let config: ReconstructionConfig = common::deserialize(yaml, FileFormat::Yaml).unwrap();

        assert_eq!(config.block_size, 16);
        assert!((config.regularization_factor - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.iterations_per_check, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_fixed_scaling() {
        let json = r#"{ "initial_scaling": { "fixed": 12.5 }, "decay_factor": 0.8 }"#;
        let config: ReconstructionConfig = common::deserialize(json, FileFormat::Json).unwrap();

        assert_eq!(config.initial_scaling, ScalingInit::Fixed(12.5));
        assert!((config.decay_factor - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_config_roundtrips_through_yaml() {
        let config = ReconstructionConfig::fast().with_seed(3);
        let text = common::serialize(&config, FileFormat::Yaml).unwrap();
        let back: ReconstructionConfig = common::deserialize(&text, FileFormat::Yaml).unwrap();
        assert_eq!(back, config);
    }
}
