//! # Saliency Mix Core
//!
//! Saliency-guided image mixing for classifier training. Each image in a
//! batch receives a rectangular patch copied from a partner image, placed
//! where a saliency map says it matters, and the labels are blended in
//! proportion to the area that actually changed hands.
//!
//! ## Quick Start
//!
//! ```rust
//! use saliency_mix_core::{AugmentationPolicy, ImageBatch, LabelBatch, MixConfig};
//!
//! let config = MixConfig {
//!     variant: "saliency_mix_fixed".to_string(),
//!     num_classes: 4,
//!     ..MixConfig::default()
//! };
//! let policy = AugmentationPolicy::new(config).unwrap();
//!
//! let mut images = ImageBatch::from_seed(42, 4, 3, 32, 32);
//! let mut labels = LabelBatch::one_hot(&[0, 1, 2, 3], 4).unwrap();
//!
//! // Saliency maps are computed by the policy's detector when not supplied.
//! let report = policy
//!     .mix_seeded(&mut images, &mut labels, None, None, 7)
//!     .unwrap();
//! for record in &report.records {
//!     let row_sum: f32 = labels.row(record.paste_index).sum();
//!     assert!((row_sum - 1.0).abs() < 1e-5);
//! }
//! ```
//!
//! ## Core Modules
//!
//! - [`mixing`] - Geometry, region selectors, error matrix, mixer and policy
//! - [`tensor`] - Image/label batches, saliency maps and detectors
//! - [`config`] - Augmentation configuration via TOML
//! - [`checkpoint`] - Versioned binary persistence of adaptive state
//! - [`logging`] - JSON line-delimited run logs

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod logging;
pub mod mixing;
pub mod tensor;

pub use checkpoint::{CheckpointError, Checkpointable};
pub use config::{ConfigError, MixConfig};
pub use error::{MixError, MixResult};
pub use logging::{log_error_matrix, log_mix_report, DEFAULT_AUGMENT_LOG};
pub use mixing::{
    compute_bounding_box, corrected_lambda, cut_dimensions, AugmentationPolicy, BatchMode,
    BoundingBox, CoordinateSampling, ErrorMatrix, LocalMeanSelector, MixRecord, MixReport,
    MixVariant, Mixer, PartnerPolicy, PasteRegion, PeakPixelSelector, PixelBlend, RegionRole,
    RegionSelector, RegionStrategy, SaliencySource, SkipReason, SkippedItem, WeightedSelector,
};
pub use tensor::{ContrastSaliency, ImageBatch, LabelBatch, SaliencyDetector, SaliencyMap};
