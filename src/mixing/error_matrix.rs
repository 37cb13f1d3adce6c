//! Adaptive class-confusion estimate used to bias partner selection.
//!
//! Row `i` holds an exponentially decayed estimate of the elementwise
//! discrepancy between model outputs and labels for items whose dominant
//! label class is `i`. Partners whose classes are currently well separated
//! from the target class get proportionally more weight.

use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{check_square_entries, CheckpointError, Checkpointable};
use crate::error::{MixError, MixResult};
use crate::tensor::batch::first_argmax;

/// Added to every partner weight so that no candidate is impossible.
pub const PARTNER_EPSILON: f64 = 1e-12;

const ERROR_MATRIX_CHECKPOINT_VERSION: u32 = 1;

/// `C x C` exponential moving average of output/label discrepancy.
///
/// Owned by the caller for the lifetime of a training run and threaded
/// explicitly into [`crate::AugmentationPolicy::mix`] and
/// [`crate::AugmentationPolicy::report_outcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMatrix {
    matrix: Array2<f64>,
    exp_weight: f64,
}

impl ErrorMatrix {
    /// Creates a matrix with every row uniform at `1 / num_classes`.
    ///
    /// # Errors
    ///
    /// Fails when `num_classes` is zero or `exp_weight` lies outside [0, 1].
    pub fn new(num_classes: usize, exp_weight: f64) -> MixResult<Self> {
        if num_classes == 0 {
            return Err(MixError::invalid_config(
                "num_classes",
                num_classes,
                "must be at least 1",
            ));
        }
        if !exp_weight.is_finite() || !(0.0..=1.0).contains(&exp_weight) {
            return Err(MixError::invalid_config(
                "exp_weight",
                exp_weight,
                "must lie in [0, 1]",
            ));
        }

        Ok(Self {
            matrix: Array2::from_elem((num_classes, num_classes), 1.0 / num_classes as f64),
            exp_weight,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn exp_weight(&self) -> f64 {
        self.exp_weight
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn row(&self, class: usize) -> ArrayView1<'_, f64> {
        self.matrix.row(class)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.matrix.get([row, col]).copied()
    }

    /// Folds one batch of model outputs into the estimate.
    ///
    /// Each output row is shifted by its minimum and divided by its sum; a row
    /// with no spread becomes uniform. For item `k` with dominant label class
    /// `i`: `row_i <- w * |out_k - label_k| + (1 - w) * row_i`, applied in
    /// batch order.
    ///
    /// # Errors
    ///
    /// Rejects mismatched shapes, a class count different from the matrix, and
    /// non-finite values. Nothing is written on error.
    pub fn update(&mut self, outputs: ArrayView2<'_, f32>, labels: ArrayView2<'_, f32>) -> MixResult<()> {
        let num_classes = self.num_classes();
        let (items, out_classes) = outputs.dim();
        if outputs.dim() != labels.dim() {
            return Err(MixError::shape_mismatch(
                "error matrix update (outputs vs labels)",
                &[labels.nrows(), labels.ncols()],
                &[items, out_classes],
            ));
        }
        if out_classes != num_classes {
            return Err(MixError::shape_mismatch(
                "error matrix update (class count)",
                &[items, num_classes],
                &[items, out_classes],
            ));
        }
        if outputs.iter().chain(labels.iter()).any(|v| !v.is_finite()) {
            return Err(MixError::invalid_input(
                "error matrix update",
                "outputs and labels must be finite",
            ));
        }

        let weight = self.exp_weight;
        for (output, label) in outputs.outer_iter().zip(labels.outer_iter()) {
            let normalized = normalize_scores(output);
            let class = first_argmax(label.iter().copied()).unwrap_or(0);
            let mut row = self.matrix.row_mut(class);
            for ((entry, &out), &target) in row.iter_mut().zip(normalized.iter()).zip(label.iter()) {
                let discrepancy = (out - target as f64).abs();
                *entry = weight * discrepancy + (1.0 - weight) * *entry;
            }
        }

        Ok(())
    }

    /// Distribution over batch items for picking a partner of `exclude`.
    ///
    /// `item_classes[j]` is the dominant class of item `j`. Weight of item `j`
    /// is `max(0, 1 - E[target_class, class_j]) + eps`; `exclude` gets zero.
    /// Returns `None` when no other item exists.
    pub fn partner_probabilities(
        &self,
        target_class: usize,
        item_classes: &[usize],
        exclude: usize,
    ) -> Option<Vec<f64>> {
        let candidates = item_classes
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != exclude)
            .count();
        if candidates == 0 {
            return None;
        }

        let mut weights: Vec<f64> = item_classes
            .iter()
            .enumerate()
            .map(|(idx, &class)| {
                if idx == exclude {
                    return 0.0;
                }
                let confusion = self.get(target_class, class).unwrap_or(1.0);
                (1.0 - confusion).max(0.0) + PARTNER_EPSILON
            })
            .collect();

        let total: f64 = weights.iter().sum();
        if !(total > 0.0) || !total.is_finite() {
            return None;
        }
        weights.iter_mut().for_each(|w| *w /= total);
        Some(weights)
    }

    /// Draws a partner index according to [`Self::partner_probabilities`].
    pub fn sample_partner(
        &self,
        target_class: usize,
        item_classes: &[usize],
        exclude: usize,
        rng: &mut StdRng,
    ) -> Option<usize> {
        let probabilities = self.partner_probabilities(target_class, item_classes, exclude)?;
        let distribution = WeightedIndex::new(&probabilities).ok()?;
        Some(distribution.sample(rng))
    }
}

fn normalize_scores(scores: ArrayView1<'_, f32>) -> Vec<f64> {
    let len = scores.len();
    let min = scores
        .iter()
        .map(|&v| v as f64)
        .fold(f64::INFINITY, f64::min);
    let shifted: Vec<f64> = scores.iter().map(|&v| v as f64 - min).collect();
    let sum: f64 = shifted.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        shifted.into_iter().map(|v| v / sum).collect()
    } else {
        vec![1.0 / len.max(1) as f64; len]
    }
}

#[derive(Serialize, Deserialize)]
struct ErrorMatrixCheckpoint {
    version: u32,
    num_classes: usize,
    exp_weight: f64,
    entries: Vec<f64>,
}

impl Checkpointable for ErrorMatrix {
    const CHECKPOINT_VERSION: u32 = ERROR_MATRIX_CHECKPOINT_VERSION;

    fn save_checkpoint<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), CheckpointError> {
        let snapshot = ErrorMatrixCheckpoint {
            version: Self::CHECKPOINT_VERSION,
            num_classes: self.num_classes(),
            exp_weight: self.exp_weight,
            entries: self.matrix.iter().copied().collect(),
        };

        Self::write_snapshot(&snapshot, path)
    }

    fn load_checkpoint<P: AsRef<std::path::Path>>(path: P) -> Result<Self, CheckpointError> {
        let snapshot: ErrorMatrixCheckpoint = Self::read_snapshot(path)?;
        Self::check_version(snapshot.version)?;

        let mut restored = ErrorMatrix::new(snapshot.num_classes, snapshot.exp_weight)?;
        check_square_entries(snapshot.num_classes, &snapshot.entries)?;
        restored.matrix = Array2::from_shape_vec(
            (snapshot.num_classes, snapshot.num_classes),
            snapshot.entries,
        )
        .map_err(|_| CheckpointError::EntryCount {
            num_classes: snapshot.num_classes,
            found: snapshot.num_classes * snapshot.num_classes,
        })?;
        Ok(restored)
    }
}
