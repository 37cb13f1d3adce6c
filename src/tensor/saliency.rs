//! Saliency maps and the detector seam.
//!
//! A [`SaliencyMap`] is a non-negative `[H, W]` intensity array, usually on a
//! byte scale of [0, 255]. Region selectors consume maps read-only; the
//! border-zeroed copies they need are produced by [`SaliencyMap::interior`].
//!
//! Producing a map from pixels is delegated to a [`SaliencyDetector`].
//! [`ContrastSaliency`] is a small centre-surround detector that is good
//! enough for synthetic data and tests; production callers plug in their own.

use ndarray::{Array2, ArrayView3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::batch::{first_argmax, ImageBatch};
use crate::mixing::geometry::BoundingBox;

/// Per-pixel visual importance for one image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaliencyMap {
    /// Intensities as `[height, width]`
    pub values: Array2<f32>,
}

impl SaliencyMap {
    pub fn new(values: Array2<f32>) -> Self {
        Self { values }
    }

    pub fn zeros(height: usize, width: usize) -> Self {
        Self {
            values: Array2::zeros((height, width)),
        }
    }

    /// Returns `(height, width)`.
    pub fn dims(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    /// Position of the most salient pixel, first occurrence in row-major order.
    ///
    /// Returns `None` for an empty map.
    pub fn peak(&self) -> Option<(usize, usize)> {
        let width = self.width();
        if width == 0 {
            return None;
        }
        first_argmax(self.values.iter().copied()).map(|flat| (flat / width, flat % width))
    }

    /// Copy of the map with a border of half the cut size zeroed.
    ///
    /// The first `floor(cut_h / 2)` and the last `ceil(cut_h / 2)` rows are
    /// cleared, and likewise for columns, leaving anchors in rows
    /// `[cut_h / 2, H - ceil(cut_h / 2) - 1]`. A cut as large as the map
    /// clears everything.
    pub fn interior(&self, cut_h: usize, cut_w: usize) -> SaliencyMap {
        let (height, width) = self.dims();
        let (row_lo, row_hi) = anchor_window(height, cut_h);
        let (col_lo, col_hi) = anchor_window(width, cut_w);

        let values = Array2::from_shape_fn((height, width), |(row, col)| {
            let inside = row >= row_lo && row <= row_hi && col >= col_lo && col <= col_hi;
            if inside {
                self.values[[row, col]]
            } else {
                0.0
            }
        });
        SaliencyMap { values }
    }

    /// Mean intensity inside `bbox`. An empty box has mean `0.0`.
    pub fn mean_within(&self, bbox: &BoundingBox) -> f32 {
        let (height, width) = self.dims();
        if bbox.is_empty() || !bbox.fits_within(height, width) {
            return 0.0;
        }
        let view = self
            .values
            .slice(ndarray::s![bbox.row1..bbox.row2, bbox.col1..bbox.col2]);
        view.sum() / bbox.area() as f32
    }

    /// Row and column indices of every nonzero position, in row-major order.
    ///
    /// The two vectors are parallel: entry `k` of each describes the same pixel.
    pub fn nonzero_coordinates(&self) -> (Vec<usize>, Vec<usize>) {
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        for ((row, col), &value) in self.values.indexed_iter() {
            if value != 0.0 {
                rows.push(row);
                cols.push(col);
            }
        }
        (rows, cols)
    }
}

/// Inclusive anchor range along one axis. Empty when `lo > hi`.
fn anchor_window(extent: usize, cut: usize) -> (usize, usize) {
    if extent == 0 || cut >= extent {
        return (1, 0);
    }
    (cut / 2, extent - (cut + 1) / 2 - 1)
}

/// Source of saliency maps for images the caller did not precompute.
pub trait SaliencyDetector: Send + Sync {
    /// Compute the map for one `[C, H, W]` image. The result must be `[H, W]`.
    fn detect(&self, image: ArrayView3<'_, f32>) -> SaliencyMap;

    /// Compute maps for every image of a batch, in batch order.
    fn detect_batch(&self, images: &ImageBatch) -> Vec<SaliencyMap> {
        (0..images.len())
            .into_par_iter()
            .map(|idx| self.detect(images.image(idx)))
            .collect()
    }

    /// Detector name for logging/debugging
    fn name(&self) -> &str {
        "UnknownDetector"
    }
}

/// Centre-surround contrast detector.
///
/// Saliency is the absolute difference between a pixel's channel-mean
/// intensity and the mean of its `(2r + 1)^2` neighbourhood, rescaled so the
/// strongest response maps to 255 and floored to whole byte levels. A flat
/// image produces an all-zero map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContrastSaliency {
    /// Neighbourhood radius in pixels
    pub radius: usize,
}

impl Default for ContrastSaliency {
    fn default() -> Self {
        Self { radius: 2 }
    }
}

impl ContrastSaliency {
    pub fn new(radius: usize) -> Self {
        Self {
            radius: radius.max(1),
        }
    }
}

impl SaliencyDetector for ContrastSaliency {
    fn detect(&self, image: ArrayView3<'_, f32>) -> SaliencyMap {
        let (_, height, width) = image.dim();
        if height == 0 || width == 0 {
            return SaliencyMap::zeros(height, width);
        }

        let gray = image
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array2::zeros((height, width)));

        // Summed-area table with a zero border row and column.
        let mut integral = Array2::<f64>::zeros((height + 1, width + 1));
        for row in 0..height {
            let mut running = 0.0f64;
            for col in 0..width {
                running += gray[[row, col]] as f64;
                integral[[row + 1, col + 1]] = integral[[row, col + 1]] + running;
            }
        }

        let radius = self.radius;
        let mut contrast = Array2::<f32>::zeros((height, width));
        for row in 0..height {
            let top = row.saturating_sub(radius);
            let bottom = (row + radius + 1).min(height);
            for col in 0..width {
                let left = col.saturating_sub(radius);
                let right = (col + radius + 1).min(width);
                let sum = integral[[bottom, right]] - integral[[top, right]]
                    - integral[[bottom, left]]
                    + integral[[top, left]];
                let count = ((bottom - top) * (right - left)) as f64;
                let surround = sum / count;
                contrast[[row, col]] = (gray[[row, col]] as f64 - surround).abs() as f32;
            }
        }

        let max = contrast
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(0.0f32, f32::max);
        if max > 0.0 {
            contrast.mapv_inplace(|v| {
                if v.is_finite() {
                    (v / max * 255.0).floor()
                } else {
                    0.0
                }
            });
        } else {
            contrast.fill(0.0);
        }

        SaliencyMap { values: contrast }
    }

    fn name(&self) -> &str {
        "ContrastSaliency"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn map_from(rows: &[&[f32]]) -> SaliencyMap {
        let height = rows.len();
        let width = rows[0].len();
        let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        SaliencyMap::new(Array2::from_shape_vec((height, width), flat).unwrap())
    }

    #[test]
    fn test_peak_uses_first_row_major_maximum() {
        let map = map_from(&[&[0.0, 1.0, 0.0], &[5.0, 0.0, 5.0], &[0.0, 5.0, 0.0]]);
        assert_eq!(map.peak(), Some((1, 0)));
        assert_eq!(SaliencyMap::zeros(0, 0).peak(), None);
    }

    #[test]
    fn test_interior_zeroes_border_of_half_cut() {
        let map = SaliencyMap::new(Array2::from_elem((6, 6), 1.0));
        // cut 3: one leading and two trailing rows/cols cleared, [1, 3] survive
        let interior = map.interior(3, 3);
        assert_eq!(interior.values[[0, 3]], 0.0);
        assert_eq!(interior.values[[1, 1]], 1.0);
        assert_eq!(interior.values[[3, 3]], 1.0);
        assert_eq!(interior.values[[4, 4]], 0.0);
        assert_eq!(interior.values[[5, 2]], 0.0);
        assert_eq!(interior.values.sum(), 9.0);
    }

    #[test]
    fn test_interior_even_cut_clears_symmetric_bands() {
        let map = SaliencyMap::new(Array2::from_elem((8, 8), 1.0));
        let (rows, cols) = map.interior(4, 4).nonzero_coordinates();
        assert_eq!(rows.iter().min(), Some(&2));
        assert_eq!(rows.iter().max(), Some(&5));
        assert_eq!(cols.iter().min(), Some(&2));
        assert_eq!(cols.iter().max(), Some(&5));
    }

    #[test]
    fn test_interior_with_full_cut_is_empty() {
        let even = SaliencyMap::new(Array2::from_elem((4, 4), 2.0));
        assert!(even.interior(4, 4).nonzero_coordinates().0.is_empty());
        let odd = SaliencyMap::new(Array2::from_elem((5, 5), 2.0));
        assert!(odd.interior(5, 5).nonzero_coordinates().0.is_empty());
        assert!(odd.interior(6, 6).nonzero_coordinates().0.is_empty());
        // a zero cut clears nothing
        assert_eq!(odd.interior(0, 0).values.sum(), 50.0);
    }

    #[test]
    fn test_mean_within_box() {
        let map = map_from(&[&[1.0, 2.0], &[3.0, 4.0]]);
        assert!((map.mean_within(&BoundingBox::new(0, 0, 2, 2)) - 2.5).abs() < 1e-6);
        assert!((map.mean_within(&BoundingBox::new(1, 0, 2, 2)) - 3.5).abs() < 1e-6);
        assert_eq!(map.mean_within(&BoundingBox::new(1, 1, 1, 2)), 0.0);
    }

    #[test]
    fn test_nonzero_coordinates_are_paired() {
        let map = map_from(&[&[0.0, 1.0], &[2.0, 0.0]]);
        let (rows, cols) = map.nonzero_coordinates();
        assert_eq!(rows, vec![0, 1]);
        assert_eq!(cols, vec![1, 0]);
    }

    #[test]
    fn test_contrast_saliency_highlights_outlier() {
        let mut image = Array3::<f32>::zeros((3, 9, 9));
        for channel in 0..3 {
            image[[channel, 4, 6]] = 1.0;
        }
        let map = ContrastSaliency::new(2).detect(image.view());
        assert_eq!(map.dims(), (9, 9));
        assert_eq!(map.peak(), Some((4, 6)));
        assert_eq!(map.values[[4, 6]], 255.0);
        assert!(map.values.iter().all(|v| *v >= 0.0 && *v <= 255.0));
    }

    #[test]
    fn test_contrast_saliency_flat_image_is_zero() {
        let image = Array3::<f32>::from_elem((3, 5, 5), 0.5);
        let map = ContrastSaliency::default().detect(image.view());
        assert!(map.values.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_detect_batch_preserves_order() {
        let batch = ImageBatch::from_seed(3, 4, 3, 8, 8);
        let detector = ContrastSaliency::default();
        let maps = detector.detect_batch(&batch);
        assert_eq!(maps.len(), 4);
        for (idx, map) in maps.iter().enumerate() {
            assert_eq!(*map, detector.detect(batch.image(idx)));
        }
    }
}
