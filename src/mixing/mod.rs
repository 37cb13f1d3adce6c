pub mod error_matrix;
pub mod geometry;
pub mod mixer;
pub mod policy;
pub mod region;
pub mod report;

pub use error_matrix::{ErrorMatrix, PARTNER_EPSILON};
pub use geometry::{compute_bounding_box, corrected_lambda, cut_dimensions, BoundingBox};
pub use mixer::{BatchMode, Mixer, PartnerPolicy, PasteRegion, PixelBlend, SaliencySource};
pub use policy::{AugmentationPolicy, MixVariant};
pub use region::{
    CoordinateSampling, LocalMeanSelector, PeakPixelSelector, RegionRole, RegionSelector,
    RegionStrategy, WeightedSelector, PASTE_INTENSITY_CEILING,
};
pub use report::{MixRecord, MixReport, SkipReason, SkippedItem};
