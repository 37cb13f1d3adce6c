use ndarray::{Array2, Array4, ArrayView1, ArrayView3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{MixError, MixResult};
use crate::mixing::geometry::BoundingBox;

/// A batch of images stored as a 4-dimensional array `[N, C, H, W]`.
///
/// The mixer overwrites rectangular regions of individual images in place.
/// Every sub-view handed out by [`ImageBatch::region`] is bounds-checked
/// against the batch extents.
///
/// # Examples
///
/// ```
/// use saliency_mix_core::ImageBatch;
///
/// let batch = ImageBatch::from_seed(7, 4, 3, 32, 32);
/// assert_eq!(batch.dims(), (4, 3, 32, 32));
/// assert_eq!(batch.spatial_area(), 1024);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageBatch {
    /// Pixel intensities as `[items, channels, height, width]`
    pub pixels: Array4<f32>,
}

impl ImageBatch {
    /// Creates a batch filled with zeros.
    pub fn zeros(len: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            pixels: Array4::zeros((len, channels, height, width)),
        }
    }

    /// Wraps an existing `[N, C, H, W]` array.
    pub fn from_array(pixels: Array4<f32>) -> Self {
        Self { pixels }
    }

    /// Creates a deterministic pseudo-random batch with intensities in [0, 1].
    ///
    /// The same seed always yields the same pixels, which keeps benchmark and
    /// test fixtures reproducible without threading an RNG through them.
    pub fn from_seed(seed: u64, len: usize, channels: usize, height: usize, width: usize) -> Self {
        let mut batch = Self::zeros(len, channels, height, width);
        let state = if seed == 0 { 1 } else { seed };

        if let Some(slice) = batch.pixels.as_slice_mut() {
            slice.par_iter_mut().enumerate().for_each(|(idx, value)| {
                let next = lcg(idx as u64 + state);
                *value = normalized(next);
            });
        }

        batch
    }

    /// Returns `(items, channels, height, width)`.
    pub fn dims(&self) -> (usize, usize, usize, usize) {
        self.pixels.dim()
    }

    pub fn len(&self) -> usize {
        self.pixels.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channels(&self) -> usize {
        self.pixels.dim().1
    }

    pub fn height(&self) -> usize {
        self.pixels.dim().2
    }

    pub fn width(&self) -> usize {
        self.pixels.dim().3
    }

    /// Number of pixels per channel of a single image (`H * W`).
    pub fn spatial_area(&self) -> usize {
        self.height() * self.width()
    }

    /// View of a single image as `[C, H, W]`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn image(&self, index: usize) -> ArrayView3<'_, f32> {
        self.pixels.index_axis(ndarray::Axis(0), index)
    }

    /// Bounds-checked view of one image restricted to `bbox`, across all channels.
    pub fn region(&self, index: usize, bbox: &BoundingBox) -> MixResult<ArrayView3<'_, f32>> {
        let (len, channels, height, width) = self.dims();
        if index >= len || !bbox.fits_within(height, width) {
            return Err(MixError::shape_mismatch(
                format!("region of image {}", index),
                &[len, channels, height, width],
                &[index, channels, bbox.row2, bbox.col2],
            ));
        }
        Ok(self.pixels.slice(ndarray::s![
            index,
            ..,
            bbox.row1..bbox.row2,
            bbox.col1..bbox.col2
        ]))
    }
}

/// Soft or one-hot labels stored as `[N, num_classes]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelBatch {
    /// One row per item; each row is a probability distribution over classes
    pub values: Array2<f32>,
}

impl LabelBatch {
    /// Wraps an existing `[N, num_classes]` array.
    pub fn from_array(values: Array2<f32>) -> Self {
        Self { values }
    }

    /// Builds one-hot rows from class indices.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidInput`] if any class index is `>= num_classes`.
    pub fn one_hot(classes: &[usize], num_classes: usize) -> MixResult<Self> {
        let mut values = Array2::zeros((classes.len(), num_classes));
        for (row, &class) in classes.iter().enumerate() {
            if class >= num_classes {
                return Err(MixError::invalid_input(
                    format!("label {}", row),
                    format!("class {} out of range for {} classes", class, num_classes),
                ));
            }
            values[[row, class]] = 1.0;
        }
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_classes(&self) -> usize {
        self.values.ncols()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f32> {
        self.values.row(index)
    }

    /// Class holding the largest mass in row `index` (first one on ties).
    pub fn dominant_class(&self, index: usize) -> usize {
        first_argmax(self.values.row(index).iter().copied()).unwrap_or(0)
    }

    /// Dominant class of every row, in batch order.
    pub fn dominant_classes(&self) -> Vec<usize> {
        (0..self.len()).map(|idx| self.dominant_class(idx)).collect()
    }
}

/// Index of the first maximum in iteration order. NaN never wins a comparison.
pub(crate) fn first_argmax<I>(values: I) -> Option<usize>
where
    I: IntoIterator<Item = f32>,
{
    let mut best: Option<(usize, f32)> = None;
    for (idx, value) in values.into_iter().enumerate() {
        let replace = match best {
            None => true,
            Some((_, current)) => current.is_nan() || value > current,
        };
        if replace {
            best = Some((idx, value));
        }
    }
    best.map(|(idx, _)| idx)
}

fn lcg(seed: u64) -> u64 {
    seed.wrapping_mul(1664525).wrapping_add(1013904223)
}

fn normalized(value: u64) -> f32 {
    let fraction = (value & 0xFFFF_FFFF) as f32 / (u32::MAX as f32);
    fraction.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_seed_is_deterministic() {
        let a = ImageBatch::from_seed(42, 2, 3, 8, 8);
        let b = ImageBatch::from_seed(42, 2, 3, 8, 8);
        let c = ImageBatch::from_seed(43, 2, 3, 8, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.pixels.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_region_is_bounds_checked() {
        let batch = ImageBatch::zeros(2, 3, 8, 8);
        let inside = BoundingBox::new(2, 2, 6, 5);
        let view = batch.region(1, &inside).unwrap();
        assert_eq!(view.dim(), (3, 4, 3));

        let outside = BoundingBox::new(2, 2, 9, 5);
        assert!(batch.region(1, &outside).is_err());
        assert!(batch.region(2, &inside).is_err());
    }

    #[test]
    fn test_one_hot_rows() {
        let labels = LabelBatch::one_hot(&[2, 0, 3], 4).unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.num_classes(), 4);
        assert_eq!(labels.values[[0, 2]], 1.0);
        assert_eq!(labels.values[[1, 0]], 1.0);
        assert_eq!(labels.dominant_classes(), vec![2, 0, 3]);
        assert!((labels.row(2).sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_one_hot_rejects_out_of_range_class() {
        let err = LabelBatch::one_hot(&[0, 4], 4).unwrap_err();
        assert!(err.to_string().contains("class 4"));
    }

    #[test]
    fn test_first_argmax_prefers_first_tie() {
        assert_eq!(first_argmax(vec![0.1, 0.7, 0.7, 0.2]), Some(1));
        assert_eq!(first_argmax(vec![f32::NAN, 0.3, 0.1]), Some(1));
        assert_eq!(first_argmax(Vec::<f32>::new()), None);
    }
}
