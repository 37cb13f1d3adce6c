//! Named augmentation variants and the policy that dispatches to them.

use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error_matrix::ErrorMatrix;
use super::mixer::{BatchMode, Mixer, PartnerPolicy, PasteRegion, PixelBlend, SaliencySource};
use super::region::{CoordinateSampling, RegionStrategy};
use super::report::MixReport;
use crate::config::MixConfig;
use crate::error::{MixError, MixResult};
use crate::tensor::{ContrastSaliency, ImageBatch, LabelBatch, SaliencyDetector, SaliencyMap};

/// The catalogue of mixing procedures.
///
/// Variants without `Fixed` in their name share one box and one permutation
/// across the batch and exist to reproduce earlier runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MixVariant {
    SaliencyMix,
    SaliencyMixFixed,
    /// Per-item mixing with partners drawn from the error matrix
    ErrorMix,
    LocalMeanSaliencyMix,
    LocalMeanSaliencyMixFixed,
    /// Best-of-K local mean with paired anchor coordinates
    LocalMeanSaliencyMixJoint,
    NoiseSaliencyMix,
    NoiseSaliencyMixFixed,
    /// Saliency-weighted copy anchor, inverse-saliency paste anchor
    RandSalMix,
}

impl MixVariant {
    pub fn all() -> &'static [MixVariant] {
        &[
            MixVariant::SaliencyMix,
            MixVariant::SaliencyMixFixed,
            MixVariant::ErrorMix,
            MixVariant::LocalMeanSaliencyMix,
            MixVariant::LocalMeanSaliencyMixFixed,
            MixVariant::LocalMeanSaliencyMixJoint,
            MixVariant::NoiseSaliencyMix,
            MixVariant::NoiseSaliencyMixFixed,
            MixVariant::RandSalMix,
        ]
    }

    pub fn names() -> Vec<&'static str> {
        Self::all().iter().map(|variant| variant.as_str()).collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MixVariant::SaliencyMix => "saliency_mix",
            MixVariant::SaliencyMixFixed => "saliency_mix_fixed",
            MixVariant::ErrorMix => "error_mix",
            MixVariant::LocalMeanSaliencyMix => "local_mean_saliency_mix",
            MixVariant::LocalMeanSaliencyMixFixed => "local_mean_saliency_mix_fixed",
            MixVariant::LocalMeanSaliencyMixJoint => "local_mean_saliency_mix_joint",
            MixVariant::NoiseSaliencyMix => "noise_saliency_mix",
            MixVariant::NoiseSaliencyMixFixed => "noise_saliency_mix_fixed",
            MixVariant::RandSalMix => "rand_sal_mix",
        }
    }

    /// Whether the variant needs an [`ErrorMatrix`].
    pub fn is_adaptive(&self) -> bool {
        matches!(self, MixVariant::ErrorMix)
    }

    /// Whether the variant uses the shared-box batch mode.
    pub fn is_legacy(&self) -> bool {
        matches!(
            self,
            MixVariant::SaliencyMix | MixVariant::LocalMeanSaliencyMix | MixVariant::NoiseSaliencyMix
        )
    }

    /// Builds the mixer this variant stands for.
    pub fn mixer(&self, config: &MixConfig) -> MixResult<Mixer> {
        let batch_mode = if self.is_legacy() {
            BatchMode::SharedBox
        } else {
            BatchMode::PerItem
        };
        let partner = if self.is_adaptive() {
            PartnerPolicy::ErrorWeighted
        } else {
            PartnerPolicy::Uniform
        };
        let candidates = config.local_mean_candidates;
        let region = match self {
            MixVariant::LocalMeanSaliencyMix | MixVariant::LocalMeanSaliencyMixFixed => {
                RegionStrategy::local_mean(candidates, CoordinateSampling::Marginal)
            }
            MixVariant::LocalMeanSaliencyMixJoint => {
                RegionStrategy::local_mean(candidates, CoordinateSampling::Joint)
            }
            MixVariant::RandSalMix => RegionStrategy::weighted(),
            _ => RegionStrategy::peak_pixel(),
        };
        let paste_region = match self {
            MixVariant::RandSalMix => PasteRegion::Selected,
            _ => PasteRegion::SameAsCopy,
        };
        let blend = match self {
            MixVariant::NoiseSaliencyMix | MixVariant::NoiseSaliencyMixFixed => PixelBlend::Noise {
                std_dev: config.noise_std,
            },
            _ => PixelBlend::Replace,
        };

        Mixer::new(batch_mode, partner, region, paste_region, blend, config.beta)
    }
}

impl fmt::Display for MixVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MixVariant {
    type Err = MixError;

    /// Accepts the snake_case names and the CamelCase class names used by
    /// older training scripts (`SaliencyMixFixed`, `randsalMix`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let variant = match s.trim() {
            "saliency_mix" | "SaliencyMix" => MixVariant::SaliencyMix,
            "saliency_mix_fixed" | "SaliencyMixFixed" => MixVariant::SaliencyMixFixed,
            "error_mix" | "ErrorMix" => MixVariant::ErrorMix,
            "local_mean_saliency_mix" | "LocalMeanSaliencyMix" => MixVariant::LocalMeanSaliencyMix,
            "local_mean_saliency_mix_fixed" | "LocalMeanSaliencyMixFixed" => {
                MixVariant::LocalMeanSaliencyMixFixed
            }
            "local_mean_saliency_mix_joint" | "LocalMeanSaliencyMixJoint" => {
                MixVariant::LocalMeanSaliencyMixJoint
            }
            "noise_saliency_mix" | "NoiseSaliencyMix" => MixVariant::NoiseSaliencyMix,
            "noise_saliency_mix_fixed" | "NoiseSaliencyMixFixed" => {
                MixVariant::NoiseSaliencyMixFixed
            }
            "rand_sal_mix" | "randsalMix" | "RandSalMix" => MixVariant::RandSalMix,
            other => return Err(MixError::unknown_strategy(other, Self::names())),
        };
        Ok(variant)
    }
}

/// Configured entry point consumed by a training loop once per batch.
pub struct AugmentationPolicy {
    variant: MixVariant,
    mixer: Mixer,
    config: MixConfig,
    detector: Box<dyn SaliencyDetector>,
}

impl fmt::Debug for AugmentationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AugmentationPolicy")
            .field("variant", &self.variant)
            .field("mixer", &self.mixer)
            .field("config", &self.config)
            .field("detector", &self.detector.name())
            .finish()
    }
}

impl AugmentationPolicy {
    /// Validates `config` and builds the named variant.
    ///
    /// Unknown names fail with [`MixError::UnknownStrategy`]; there is no
    /// fallback variant. Saliency maps not supplied by the caller come from a
    /// [`ContrastSaliency`] detector until [`Self::with_detector`] swaps it.
    pub fn new(config: MixConfig) -> MixResult<Self> {
        if let Err(err) = config.validate() {
            warn!(variant = %config.variant, error = %err, "rejected augmentation config");
            return Err(err);
        }
        let variant = MixVariant::from_str(&config.variant)?;
        let mixer = variant.mixer(&config)?;

        Ok(Self {
            variant,
            mixer,
            config,
            detector: Box::new(ContrastSaliency::default()),
        })
    }

    pub fn with_detector(mut self, detector: Box<dyn SaliencyDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn variant(&self) -> MixVariant {
        self.variant
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn config(&self) -> &MixConfig {
        &self.config
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    /// Fresh error matrix for adaptive variants, `None` otherwise.
    pub fn new_error_matrix(&self) -> MixResult<Option<ErrorMatrix>> {
        if !self.variant.is_adaptive() {
            return Ok(None);
        }
        ErrorMatrix::new(self.config.num_classes, self.config.exp_weight).map(Some)
    }

    /// Mixes one batch in place.
    ///
    /// `saliency` may be omitted, in which case maps are computed by the
    /// policy's detector. `errors` is required by adaptive variants.
    pub fn mix(
        &self,
        images: &mut ImageBatch,
        labels: &mut LabelBatch,
        saliency: Option<&[SaliencyMap]>,
        errors: Option<&ErrorMatrix>,
        rng: &mut StdRng,
    ) -> MixResult<MixReport> {
        if labels.num_classes() != self.config.num_classes {
            warn!(
                expected = self.config.num_classes,
                got = labels.num_classes(),
                "label width does not match configured class count"
            );
            return Err(MixError::shape_mismatch(
                "labels vs num_classes",
                &[labels.len(), self.config.num_classes],
                &[labels.len(), labels.num_classes()],
            ));
        }
        if self.variant.is_adaptive() && errors.is_none() {
            return Err(MixError::missing_error_matrix(self.variant.as_str()));
        }

        let source = match saliency {
            Some(maps) => SaliencySource::Precomputed(maps),
            None => SaliencySource::Detector(self.detector.as_ref()),
        };
        let report = self.mixer.mix(images, labels, source, errors, rng)?;

        info!(
            variant = self.variant.as_str(),
            items = images.len(),
            mixed = report.mixed_count(),
            skipped = report.skipped_count(),
            mean_lambda = report.mean_lambda().unwrap_or(1.0),
            "augmented batch"
        );
        Ok(report)
    }

    /// [`Self::mix`] with a fresh RNG seeded from `seed`.
    pub fn mix_seeded(
        &self,
        images: &mut ImageBatch,
        labels: &mut LabelBatch,
        saliency: Option<&[SaliencyMap]>,
        errors: Option<&ErrorMatrix>,
        seed: u64,
    ) -> MixResult<MixReport> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.mix(images, labels, saliency, errors, &mut rng)
    }

    /// Feeds model outputs for a batch back into the error matrix.
    pub fn report_outcome(
        &self,
        errors: &mut ErrorMatrix,
        outputs: ArrayView2<'_, f32>,
        labels: &LabelBatch,
    ) -> MixResult<()> {
        errors.update(outputs, labels.values.view())
    }
}
