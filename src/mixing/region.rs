//! Region selection strategies.
//!
//! Each strategy turns a saliency map and a mix ratio into a [`BoundingBox`].
//! Returning `None` signals a degenerate region: no valid anchor distribution
//! exists, and the mixer leaves the item unmixed.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::geometry::{compute_bounding_box, cut_dimensions, BoundingBox};
use crate::tensor::SaliencyMap;

/// Byte-scale ceiling used to invert saliency for paste-side sampling.
pub const PASTE_INTENSITY_CEILING: f32 = 255.0;

/// Default number of candidate anchors tried by [`LocalMeanSelector`].
pub const DEFAULT_LOCAL_MEAN_CANDIDATES: usize = 10;

/// Which side of the mix a region is chosen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionRole {
    /// Region taken from the partner image; prefers salient pixels
    Copy,
    /// Destination inside the receiving image; prefers non-salient pixels
    Paste,
}

/// Trait for strategies that pick a cut box on a saliency map.
pub trait RegionSelector {
    /// Pick a box for mix ratio `lam`, or `None` if the map admits no region.
    fn select(
        &self,
        map: &SaliencyMap,
        lam: f64,
        role: RegionRole,
        rng: &mut StdRng,
    ) -> Option<BoundingBox>;

    /// Strategy name for logging/debugging
    fn name(&self) -> &str;
}

/// Centres the box on the single most salient pixel.
///
/// Deterministic: ignores the role and never touches the RNG.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakPixelSelector;

impl RegionSelector for PeakPixelSelector {
    fn select(
        &self,
        map: &SaliencyMap,
        lam: f64,
        _role: RegionRole,
        _rng: &mut StdRng,
    ) -> Option<BoundingBox> {
        let (height, width) = map.dims();
        let (anchor_row, anchor_col) = map.peak()?;
        let (cut_h, cut_w) = cut_dimensions(lam, height, width);
        Some(compute_bounding_box(
            anchor_row, anchor_col, cut_h, cut_w, height, width,
        ))
    }

    fn name(&self) -> &str {
        "peak_pixel"
    }
}

/// How candidate anchors are drawn from the nonzero interior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateSampling {
    /// Row and column indices are drawn independently from the row list and the
    /// column list of nonzero positions. The pair need not itself be nonzero.
    /// Kept for reproducing earlier experiments.
    Marginal,
    /// One nonzero position is drawn per candidate; the anchor is always a
    /// surviving pixel.
    Joint,
}

/// Best-of-K: samples anchors from the border-zeroed map and keeps the box
/// with the highest mean saliency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalMeanSelector {
    /// Number of candidate anchors (K)
    pub candidates: usize,
    pub sampling: CoordinateSampling,
}

impl Default for LocalMeanSelector {
    fn default() -> Self {
        Self {
            candidates: DEFAULT_LOCAL_MEAN_CANDIDATES,
            sampling: CoordinateSampling::Marginal,
        }
    }
}

impl RegionSelector for LocalMeanSelector {
    fn select(
        &self,
        map: &SaliencyMap,
        lam: f64,
        _role: RegionRole,
        rng: &mut StdRng,
    ) -> Option<BoundingBox> {
        let (height, width) = map.dims();
        let (cut_h, cut_w) = cut_dimensions(lam, height, width);
        let (rows, cols) = map.interior(cut_h, cut_w).nonzero_coordinates();
        if rows.is_empty() {
            return None;
        }

        let mut best: Option<(f32, BoundingBox)> = None;
        for _ in 0..self.candidates.max(1) {
            let (anchor_row, anchor_col) = match self.sampling {
                CoordinateSampling::Marginal => {
                    let row_pick = rng.gen_range(0..rows.len());
                    let col_pick = rng.gen_range(0..cols.len());
                    (rows[row_pick], cols[col_pick])
                }
                CoordinateSampling::Joint => {
                    let pick = rng.gen_range(0..rows.len());
                    (rows[pick], cols[pick])
                }
            };

            let bbox =
                compute_bounding_box(anchor_row, anchor_col, cut_h, cut_w, height, width);
            // scored on the full map, not the zeroed interior
            let mean = map.mean_within(&bbox);
            if best.map_or(true, |(current, _)| mean > current) {
                best = Some((mean, bbox));
            }
        }

        best.map(|(_, bbox)| bbox)
    }

    fn name(&self) -> &str {
        match self.sampling {
            CoordinateSampling::Marginal => "local_mean_marginal",
            CoordinateSampling::Joint => "local_mean_joint",
        }
    }
}

/// Samples the anchor from a distribution over the border-zeroed map.
///
/// Copy role: weight ∝ saliency. Paste role: weight ∝ `255 - saliency`, both
/// restricted to nonzero interior positions. A zero-size cut, an exhausted
/// interior, or zero total weight yields `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedSelector;

impl WeightedSelector {
    /// Unnormalised sampling weights over pixel positions in row-major order.
    pub fn weights(&self, map: &SaliencyMap, lam: f64, role: RegionRole) -> Vec<f64> {
        let (height, width) = map.dims();
        let (cut_h, cut_w) = cut_dimensions(lam, height, width);
        if cut_h == 0 || cut_w == 0 {
            return vec![0.0; height * width];
        }

        map.interior(cut_h, cut_w)
            .values
            .iter()
            .map(|&value| {
                if !(value > 0.0) || !value.is_finite() {
                    return 0.0;
                }
                let weight = match role {
                    RegionRole::Copy => value,
                    RegionRole::Paste => (PASTE_INTENSITY_CEILING - value).max(0.0),
                };
                weight as f64
            })
            .collect()
    }
}

impl RegionSelector for WeightedSelector {
    fn select(
        &self,
        map: &SaliencyMap,
        lam: f64,
        role: RegionRole,
        rng: &mut StdRng,
    ) -> Option<BoundingBox> {
        let (height, width) = map.dims();
        let weights = self.weights(map, lam, role);
        // WeightedIndex rejects empty, all-zero and non-finite weight sets
        let distribution = WeightedIndex::new(&weights).ok()?;
        let pick = distribution.sample(rng);

        let (cut_h, cut_w) = cut_dimensions(lam, height, width);
        Some(compute_bounding_box(
            pick / width,
            pick % width,
            cut_h,
            cut_w,
            height,
            width,
        ))
    }

    fn name(&self) -> &str {
        "weighted"
    }
}

/// Closed set of region strategies, dispatched statically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionStrategy {
    PeakPixel(PeakPixelSelector),
    LocalMean(LocalMeanSelector),
    Weighted(WeightedSelector),
}

impl RegionStrategy {
    pub fn peak_pixel() -> Self {
        RegionStrategy::PeakPixel(PeakPixelSelector)
    }

    pub fn local_mean(candidates: usize, sampling: CoordinateSampling) -> Self {
        RegionStrategy::LocalMean(LocalMeanSelector {
            candidates,
            sampling,
        })
    }

    pub fn weighted() -> Self {
        RegionStrategy::Weighted(WeightedSelector)
    }
}

impl RegionSelector for RegionStrategy {
    fn select(
        &self,
        map: &SaliencyMap,
        lam: f64,
        role: RegionRole,
        rng: &mut StdRng,
    ) -> Option<BoundingBox> {
        match self {
            RegionStrategy::PeakPixel(selector) => selector.select(map, lam, role, rng),
            RegionStrategy::LocalMean(selector) => selector.select(map, lam, role, rng),
            RegionStrategy::Weighted(selector) => selector.select(map, lam, role, rng),
        }
    }

    fn name(&self) -> &str {
        match self {
            RegionStrategy::PeakPixel(selector) => selector.name(),
            RegionStrategy::LocalMean(selector) => selector.name(),
            RegionStrategy::Weighted(selector) => selector.name(),
        }
    }
}
