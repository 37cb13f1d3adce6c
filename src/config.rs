//! Augmentation configuration via TOML files.
//!
//! Parameters live in an `[augment]` table; every key is optional and falls
//! back to the values below.
//!
//! ```toml
//! [augment]
//! variant = "error_mix"
//! beta = 1.0
//! num_classes = 10
//! exp_weight = 0.5
//! noise_std = 0.2
//! local_mean_candidates = 10
//! seed = 42
//! ```

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MixError, MixResult};
use crate::mixing::policy::MixVariant;

/// Immutable parameters of an augmentation policy.
///
/// # Examples
///
/// ```
/// use saliency_mix_core::MixConfig;
///
/// let config = MixConfig::from_str("[augment]\nvariant = \"error_mix\"\nexp_weight = 0.5")
///     .unwrap();
/// assert_eq!(config.variant, "error_mix");
/// assert_eq!(config.num_classes, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixConfig {
    /// Name of the augmentation variant (snake_case or the legacy CamelCase)
    pub variant: String,
    /// Shape of the symmetric Beta distribution λ is drawn from
    pub beta: f64,
    pub num_classes: usize,
    /// Decay weight of the error matrix moving average, in [0, 1]
    pub exp_weight: f64,
    /// Standard deviation of the noise added by noise variants
    pub noise_std: f32,
    /// Candidate anchors tried by local-mean variants
    pub local_mean_candidates: usize,
    /// Seed for callers that want a reproducible RNG stream
    pub seed: u64,
}

impl MixConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path)?;
        Self::from_str(&contents)
    }

    pub fn from_str(toml_str: &str) -> Result<Self, ConfigError> {
        let raw: RawMixFile =
            toml::from_str(toml_str).map_err(|err| ConfigError::Parse(err.to_string()))?;
        let augment = raw.augment;

        let config = Self {
            variant: augment.variant,
            beta: augment.beta,
            num_classes: augment.num_classes,
            exp_weight: augment.exp_weight,
            noise_std: augment.noise_std,
            local_mean_candidates: augment.local_mean_candidates,
            seed: augment.seed,
        };
        config
            .validate()
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        Ok(config)
    }

    /// Checks every parameter, including that the variant name is known.
    pub fn validate(&self) -> MixResult<()> {
        MixVariant::from_str(&self.variant)?;

        if !self.beta.is_finite() || self.beta <= 0.0 {
            return Err(MixError::invalid_config("beta", self.beta, "must be finite and > 0"));
        }
        if self.num_classes == 0 {
            return Err(MixError::invalid_config(
                "num_classes",
                self.num_classes,
                "must be at least 1",
            ));
        }
        if !self.exp_weight.is_finite() || !(0.0..=1.0).contains(&self.exp_weight) {
            return Err(MixError::invalid_config(
                "exp_weight",
                self.exp_weight,
                "must lie in [0, 1]",
            ));
        }
        if !self.noise_std.is_finite() || self.noise_std < 0.0 {
            return Err(MixError::invalid_config(
                "noise_std",
                self.noise_std,
                "must be finite and >= 0",
            ));
        }
        if self.local_mean_candidates == 0 {
            return Err(MixError::invalid_config(
                "local_mean_candidates",
                self.local_mean_candidates,
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Same configuration with another variant name.
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            variant: default_variant(),
            beta: default_beta(),
            num_classes: default_num_classes(),
            exp_weight: default_exp_weight(),
            noise_std: default_noise_std(),
            local_mean_candidates: default_local_mean_candidates(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawMixFile {
    #[serde(default)]
    augment: RawAugment,
}

#[derive(Debug, Deserialize)]
struct RawAugment {
    #[serde(default = "default_variant")]
    variant: String,
    #[serde(default = "default_beta")]
    beta: f64,
    #[serde(default = "default_num_classes")]
    num_classes: usize,
    #[serde(default = "default_exp_weight")]
    exp_weight: f64,
    #[serde(default = "default_noise_std")]
    noise_std: f32,
    #[serde(default = "default_local_mean_candidates")]
    local_mean_candidates: usize,
    #[serde(default = "default_seed")]
    seed: u64,
}

impl Default for RawAugment {
    fn default() -> Self {
        Self {
            variant: default_variant(),
            beta: default_beta(),
            num_classes: default_num_classes(),
            exp_weight: default_exp_weight(),
            noise_std: default_noise_std(),
            local_mean_candidates: default_local_mean_candidates(),
            seed: default_seed(),
        }
    }
}

fn default_variant() -> String {
    "saliency_mix_fixed".to_string()
}

fn default_beta() -> f64 {
    1.0
}

fn default_num_classes() -> usize {
    10
}

fn default_exp_weight() -> f64 {
    1.0
}

fn default_noise_std() -> f32 {
    0.2
}

fn default_local_mean_candidates() -> usize {
    10
}

fn default_seed() -> u64 {
    42
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "IO error: {}", err),
            ConfigError::Parse(err) => write!(f, "Parse error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}
