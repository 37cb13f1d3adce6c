//! Batch orchestration.
//!
//! For every paste item the mixer picks a partner, samples λ ~ Beta(β, β),
//! asks a [`RegionStrategy`] for a box, copies (or noise-blends) the patch and
//! blends the labels with the corrected ratio. All reads come from a snapshot
//! of the incoming batch, so the result does not depend on item order.

use ndarray::{s, Array2, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Beta, Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error_matrix::ErrorMatrix;
use super::geometry::{corrected_lambda, BoundingBox};
use super::region::{RegionRole, RegionSelector, RegionStrategy};
use super::report::{MixRecord, MixReport, SkipReason};
use crate::error::{MixError, MixResult};
use crate::tensor::batch::first_argmax;
use crate::tensor::{ImageBatch, LabelBatch, SaliencyDetector, SaliencyMap};

/// How partners and boxes are assigned across a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchMode {
    /// One λ, one shuffled permutation and one box taken from the saliency map
    /// of the image at `perm[0]`, reused for every item. Reproduces earlier
    /// experiments; a permutation may map an item to itself.
    SharedBox,
    /// Independent partner, λ and box per item.
    PerItem,
}

/// How the copy partner of a paste item is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartnerPolicy {
    /// Uniform over every other item
    Uniform,
    /// Weighted by [`ErrorMatrix::partner_probabilities`]
    ErrorWeighted,
}

/// Where the patch lands in the paste image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasteRegion {
    /// Same coordinates as the copy box
    SameAsCopy,
    /// Second selector call with the paste role on the paste image's own map
    Selected,
}

/// How copied pixels are written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PixelBlend {
    Replace,
    /// Copied patch plus zero-mean Gaussian noise
    Noise { std_dev: f32 },
}

/// Where saliency maps for a batch come from.
pub enum SaliencySource<'a> {
    /// One map per image, in batch order
    Precomputed(&'a [SaliencyMap]),
    /// Maps computed on demand from the batch pixels
    Detector(&'a dyn SaliencyDetector),
}

/// A fully configured mixing procedure.
#[derive(Debug, Clone)]
pub struct Mixer {
    batch_mode: BatchMode,
    partner: PartnerPolicy,
    region: RegionStrategy,
    paste_region: PasteRegion,
    blend: PixelBlend,
    beta: f64,
    lambda_distribution: Beta<f64>,
    noise: Option<Normal<f32>>,
}

impl Mixer {
    /// # Errors
    ///
    /// Fails for a non-positive or non-finite `beta`, a negative or non-finite
    /// noise deviation, and for shared-box mode combined with error-weighted
    /// partners or a selected paste region (both are per-item concepts).
    pub fn new(
        batch_mode: BatchMode,
        partner: PartnerPolicy,
        region: RegionStrategy,
        paste_region: PasteRegion,
        blend: PixelBlend,
        beta: f64,
    ) -> MixResult<Self> {
        if !beta.is_finite() || beta <= 0.0 {
            return Err(MixError::invalid_config("beta", beta, "must be finite and > 0"));
        }
        let lambda_distribution = Beta::new(beta, beta)
            .map_err(|err| MixError::invalid_config("beta", beta, err.to_string()))?;

        let noise = match blend {
            PixelBlend::Replace => None,
            PixelBlend::Noise { std_dev } => {
                if !std_dev.is_finite() || std_dev < 0.0 {
                    return Err(MixError::invalid_config(
                        "noise_std",
                        std_dev,
                        "must be finite and >= 0",
                    ));
                }
                let normal = Normal::new(0.0f32, std_dev)
                    .map_err(|err| MixError::invalid_config("noise_std", std_dev, err.to_string()))?;
                Some(normal)
            }
        };

        if batch_mode == BatchMode::SharedBox {
            if partner == PartnerPolicy::ErrorWeighted {
                return Err(MixError::invalid_config(
                    "partner",
                    "ErrorWeighted",
                    "shared-box mode always pairs items through one permutation",
                ));
            }
            if paste_region == PasteRegion::Selected {
                return Err(MixError::invalid_config(
                    "paste_region",
                    "Selected",
                    "shared-box mode reuses the copy box for every item",
                ));
            }
        }

        Ok(Self {
            batch_mode,
            partner,
            region,
            paste_region,
            blend,
            beta,
            lambda_distribution,
            noise,
        })
    }

    pub fn batch_mode(&self) -> BatchMode {
        self.batch_mode
    }

    pub fn partner_policy(&self) -> PartnerPolicy {
        self.partner
    }

    pub fn region(&self) -> &RegionStrategy {
        &self.region
    }

    pub fn paste_region(&self) -> PasteRegion {
        self.paste_region
    }

    pub fn blend(&self) -> PixelBlend {
        self.blend
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Mixes `images` and `labels` in place.
    ///
    /// Every shape is validated before the first write; on error the batch is
    /// left untouched. Items whose region is degenerate, or that have no
    /// partner, keep their image and label and are listed in the report.
    pub fn mix(
        &self,
        images: &mut ImageBatch,
        labels: &mut LabelBatch,
        saliency: SaliencySource<'_>,
        errors: Option<&ErrorMatrix>,
        rng: &mut StdRng,
    ) -> MixResult<MixReport> {
        let (len, _, height, width) = images.dims();
        if labels.len() != len {
            return Err(MixError::shape_mismatch(
                "labels vs images",
                &[len, labels.num_classes()],
                &[labels.len(), labels.num_classes()],
            ));
        }

        let errors = match (self.partner, errors) {
            (PartnerPolicy::ErrorWeighted, None) => {
                return Err(MixError::missing_error_matrix("ErrorWeighted"));
            }
            (PartnerPolicy::ErrorWeighted, Some(matrix)) => {
                if matrix.num_classes() != labels.num_classes() {
                    return Err(MixError::shape_mismatch(
                        "error matrix vs labels",
                        &[labels.num_classes(), labels.num_classes()],
                        &[matrix.num_classes(), matrix.num_classes()],
                    ));
                }
                Some(matrix)
            }
            (PartnerPolicy::Uniform, _) => None,
        };

        let detected;
        let maps: &[SaliencyMap] = match saliency {
            SaliencySource::Precomputed(maps) => maps,
            SaliencySource::Detector(detector) => {
                detected = detector.detect_batch(images);
                &detected
            }
        };
        validate_maps(maps, len, height, width)?;

        if len == 0 {
            return Ok(MixReport::default());
        }

        let source_images = images.clone();
        let source_labels = labels.values.clone();

        let report = match self.batch_mode {
            BatchMode::SharedBox => self.mix_shared(
                images,
                labels,
                &source_images,
                &source_labels,
                maps,
                rng,
            )?,
            BatchMode::PerItem => self.mix_per_item(
                images,
                labels,
                &source_images,
                &source_labels,
                maps,
                errors,
                rng,
            )?,
        };

        debug!(
            mode = ?self.batch_mode,
            region = self.region.name(),
            mixed = report.mixed_count(),
            skipped = report.skipped_count(),
            "mixed batch"
        );
        Ok(report)
    }

    fn mix_shared(
        &self,
        images: &mut ImageBatch,
        labels: &mut LabelBatch,
        source_images: &ImageBatch,
        source_labels: &Array2<f32>,
        maps: &[SaliencyMap],
        rng: &mut StdRng,
    ) -> MixResult<MixReport> {
        let len = source_images.len();
        let mut report = MixReport::default();
        if len < 2 {
            for index in 0..len {
                debug!(index, "no partner available; item left unmixed");
                report.skip(index, SkipReason::NoPartner);
            }
            return Ok(report);
        }

        let sampled_lambda = self.lambda_distribution.sample(rng);
        let mut permutation: Vec<usize> = (0..len).collect();
        permutation.shuffle(rng);

        let bbox = match self
            .region
            .select(&maps[permutation[0]], sampled_lambda, RegionRole::Copy, rng)
        {
            Some(bbox) => bbox,
            None => {
                for index in 0..len {
                    debug!(index, "degenerate saliency region; item left unmixed");
                    report.skip(index, SkipReason::DegenerateRegion);
                }
                return Ok(report);
            }
        };

        let lambda = corrected_lambda(&bbox, source_images.height(), source_images.width());
        for (paste_index, &copy_index) in permutation.iter().enumerate() {
            self.paste(images, source_images, paste_index, copy_index, &bbox, &bbox, rng)?;
            blend_labels(labels, source_labels, paste_index, copy_index, lambda);
            report.records.push(MixRecord {
                paste_index,
                copy_index,
                lambda,
                sampled_lambda,
                copy_box: bbox,
                paste_box: bbox,
            });
        }

        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn mix_per_item(
        &self,
        images: &mut ImageBatch,
        labels: &mut LabelBatch,
        source_images: &ImageBatch,
        source_labels: &Array2<f32>,
        maps: &[SaliencyMap],
        errors: Option<&ErrorMatrix>,
        rng: &mut StdRng,
    ) -> MixResult<MixReport> {
        let len = source_images.len();
        let (height, width) = (source_images.height(), source_images.width());
        let classes: Vec<usize> = source_labels
            .outer_iter()
            .map(|row| first_argmax(row.iter().copied()).unwrap_or(0))
            .collect();
        let mut report = MixReport::default();

        for paste_index in 0..len {
            let copy_index = match self.pick_partner(paste_index, &classes, errors, rng) {
                Some(index) => index,
                None => {
                    debug!(index = paste_index, "no partner available; item left unmixed");
                    report.skip(paste_index, SkipReason::NoPartner);
                    continue;
                }
            };

            let sampled_lambda = self.lambda_distribution.sample(rng);
            let copy_box = match self.region.select(
                &maps[copy_index],
                sampled_lambda,
                RegionRole::Copy,
                rng,
            ) {
                Some(bbox) => bbox,
                None => {
                    debug!(index = paste_index, copy_index, "degenerate copy region; item left unmixed");
                    report.skip(paste_index, SkipReason::DegenerateRegion);
                    continue;
                }
            };

            let (copy_box, paste_box) = match self.paste_region {
                PasteRegion::SameAsCopy => (copy_box, copy_box),
                PasteRegion::Selected => {
                    let paste_box = match self.region.select(
                        &maps[paste_index],
                        sampled_lambda,
                        RegionRole::Paste,
                        rng,
                    ) {
                        Some(bbox) => bbox,
                        None => {
                            debug!(index = paste_index, "degenerate paste region; item left unmixed");
                            report.skip(paste_index, SkipReason::DegenerateRegion);
                            continue;
                        }
                    };
                    let common_height = copy_box.height().min(paste_box.height());
                    let common_width = copy_box.width().min(paste_box.width());
                    (
                        copy_box.truncated(common_height, common_width),
                        paste_box.truncated(common_height, common_width),
                    )
                }
            };

            self.paste(images, source_images, paste_index, copy_index, &copy_box, &paste_box, rng)?;
            let lambda = corrected_lambda(&copy_box, height, width);
            blend_labels(labels, source_labels, paste_index, copy_index, lambda);
            report.records.push(MixRecord {
                paste_index,
                copy_index,
                lambda,
                sampled_lambda,
                copy_box,
                paste_box,
            });
        }

        Ok(report)
    }

    fn pick_partner(
        &self,
        paste_index: usize,
        classes: &[usize],
        errors: Option<&ErrorMatrix>,
        rng: &mut StdRng,
    ) -> Option<usize> {
        let len = classes.len();
        if len < 2 {
            return None;
        }
        match (self.partner, errors) {
            (PartnerPolicy::ErrorWeighted, Some(matrix)) => {
                matrix.sample_partner(classes[paste_index], classes, paste_index, rng)
            }
            _ => {
                let draw = rng.gen_range(0..len - 1);
                Some(if draw >= paste_index { draw + 1 } else { draw })
            }
        }
    }

    /// Writes the `copy_box` patch of source item `copy_index` into
    /// `paste_box` of item `paste_index`. The boxes must have equal extents.
    #[allow(clippy::too_many_arguments)]
    fn paste(
        &self,
        images: &mut ImageBatch,
        source_images: &ImageBatch,
        paste_index: usize,
        copy_index: usize,
        copy_box: &BoundingBox,
        paste_box: &BoundingBox,
        rng: &mut StdRng,
    ) -> MixResult<()> {
        if copy_box.is_empty() {
            return Ok(());
        }
        let (_, channels, height, width) = images.dims();
        if (copy_box.height(), copy_box.width()) != (paste_box.height(), paste_box.width())
            || !paste_box.fits_within(height, width)
        {
            return Err(MixError::shape_mismatch(
                format!("paste region of image {}", paste_index),
                &[channels, copy_box.height(), copy_box.width()],
                &[channels, paste_box.height(), paste_box.width()],
            ));
        }

        let patch = source_images.region(copy_index, copy_box)?;
        let mut target = images.pixels.slice_mut(s![
            paste_index,
            ..,
            paste_box.row1..paste_box.row2,
            paste_box.col1..paste_box.col2
        ]);

        match self.noise {
            None => target.assign(&patch),
            Some(normal) => {
                Zip::from(&mut target)
                    .and(&patch)
                    .for_each(|out, &value| *out = value + normal.sample(rng));
            }
        }
        Ok(())
    }
}

fn blend_labels(
    labels: &mut LabelBatch,
    source_labels: &Array2<f32>,
    paste_index: usize,
    copy_index: usize,
    lambda: f64,
) {
    let lam = lambda as f32;
    let mut row = labels.values.row_mut(paste_index);
    Zip::from(&mut row)
        .and(source_labels.row(paste_index))
        .and(source_labels.row(copy_index))
        .for_each(|out, &own, &partner| *out = lam * own + (1.0 - lam) * partner);
}

fn validate_maps(maps: &[SaliencyMap], len: usize, height: usize, width: usize) -> MixResult<()> {
    if maps.len() != len {
        return Err(MixError::shape_mismatch(
            "saliency maps vs images",
            &[len, height, width],
            &[maps.len(), height, width],
        ));
    }
    for (index, map) in maps.iter().enumerate() {
        if map.dims() != (height, width) {
            return Err(MixError::shape_mismatch(
                format!("saliency map {}", index),
                &[height, width],
                &[map.height(), map.width()],
            ));
        }
    }
    Ok(())
}
