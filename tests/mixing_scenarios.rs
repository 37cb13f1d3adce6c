use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use saliency_mix_core::{
    corrected_lambda, cut_dimensions, AugmentationPolicy, BoundingBox, ErrorMatrix, ImageBatch,
    LabelBatch, MixConfig, MixError, MixVariant, PeakPixelSelector, RegionRole, RegionSelector,
    SaliencyMap, SkipReason,
};

const SIZE: usize = 32;

fn policy(variant: &str, num_classes: usize) -> AugmentationPolicy {
    let config = MixConfig {
        variant: variant.to_string(),
        num_classes,
        ..MixConfig::default()
    };
    AugmentationPolicy::new(config).expect("valid config")
}

fn peaked_maps(len: usize, peak: (usize, usize)) -> Vec<SaliencyMap> {
    (0..len)
        .map(|_| {
            let mut values = Array2::from_elem((SIZE, SIZE), 3.0f32);
            values[[peak.0, peak.1]] = 250.0;
            SaliencyMap::new(values)
        })
        .collect()
}

fn inside(bbox: &BoundingBox, row: usize, col: usize) -> bool {
    row >= bbox.row1 && row < bbox.row2 && col >= bbox.col1 && col < bbox.col2
}

#[test]
fn peaked_maps_give_identical_full_size_boxes() {
    let maps = peaked_maps(3, (16, 15));
    let mut rng = StdRng::seed_from_u64(1);
    let lam = 0.6;
    let (cut_h, cut_w) = cut_dimensions(lam, SIZE, SIZE);

    let boxes: Vec<BoundingBox> = maps
        .iter()
        .map(|map| {
            PeakPixelSelector
                .select(map, lam, RegionRole::Copy, &mut rng)
                .expect("peak exists")
        })
        .collect();
    assert!(boxes.iter().all(|b| *b == boxes[0]));
    assert_eq!(boxes[0].area(), cut_h * cut_w);

    let policy = policy("saliency_mix_fixed", 3);
    let mut images = ImageBatch::from_seed(11, 3, 3, SIZE, SIZE);
    let mut labels = LabelBatch::one_hot(&[0, 1, 2], 3).unwrap();
    let report = policy
        .mix_seeded(&mut images, &mut labels, Some(&maps), None, 5)
        .unwrap();
    assert_eq!(report.mixed_count(), 3);
    for record in &report.records {
        let (cut_h, cut_w) = cut_dimensions(record.sampled_lambda, SIZE, SIZE);
        assert_eq!(record.copy_box.area(), cut_h * cut_w);
    }
}

#[test]
fn pixel_copy_and_label_blend_agree_on_lambda() {
    let policy = policy("saliency_mix_fixed", 4);
    let maps = peaked_maps(4, (10, 20));
    let original_images = ImageBatch::from_seed(3, 4, 3, SIZE, SIZE);
    let original_labels = LabelBatch::one_hot(&[0, 1, 2, 3], 4).unwrap();
    let mut images = original_images.clone();
    let mut labels = original_labels.clone();

    let report = policy
        .mix_seeded(&mut images, &mut labels, Some(&maps), None, 99)
        .unwrap();

    for record in &report.records {
        let lam = corrected_lambda(&record.copy_box, SIZE, SIZE);
        assert_eq!(lam, record.lambda);

        // only pixels inside the paste box changed
        let p = record.paste_index;
        for channel in 0..3 {
            for row in 0..SIZE {
                for col in 0..SIZE {
                    if !inside(&record.paste_box, row, col) {
                        assert_eq!(
                            images.pixels[[p, channel, row, col]],
                            original_images.pixels[[p, channel, row, col]]
                        );
                    }
                }
            }
        }

        let lam = lam as f32;
        for class in 0..4 {
            let expected = lam * original_labels.values[[p, class]]
                + (1.0 - lam) * original_labels.values[[record.copy_index, class]];
            assert!((labels.values[[p, class]] - expected).abs() < 1e-6);
        }
    }
}

#[test]
fn every_variant_keeps_labels_convex() {
    for variant in MixVariant::all() {
        let policy = policy(variant.as_str(), 5);
        let mut images = ImageBatch::from_seed(17, 6, 3, 24, 24);
        let mut labels = LabelBatch::one_hot(&[0, 1, 2, 3, 4, 0], 5).unwrap();
        let errors = policy.new_error_matrix().unwrap();

        let report = policy
            .mix_seeded(&mut images, &mut labels, None, errors.as_ref(), 23)
            .unwrap();

        assert_eq!(report.mixed_count() + report.skipped_count(), 6, "{}", variant);
        for row in labels.values.outer_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-5, "{}", variant);
            assert!(row.iter().all(|v| *v >= -1e-6 && *v <= 1.0 + 1e-6), "{}", variant);
        }
        for record in &report.records {
            assert!((0.0..=1.0).contains(&record.lambda), "{}", variant);
            assert!(record.copy_box.fits_within(24, 24));
            assert!(record.paste_box.fits_within(24, 24));
        }
    }
}

#[test]
fn unknown_variant_is_rejected() {
    let config = MixConfig {
        variant: "cutmix".to_string(),
        ..MixConfig::default()
    };
    match AugmentationPolicy::new(config) {
        Err(MixError::UnknownStrategy { name, available }) => {
            assert_eq!(name, "cutmix");
            assert!(available.contains(&"error_mix"));
        }
        other => panic!("expected UnknownStrategy, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn mismatched_maps_leave_batch_untouched() {
    let policy = policy("saliency_mix_fixed", 2);
    let original = ImageBatch::from_seed(2, 3, 3, SIZE, SIZE);
    let mut images = original.clone();
    let mut labels = LabelBatch::one_hot(&[0, 1, 0], 2).unwrap();
    let original_labels = labels.clone();

    // one map short
    let maps = peaked_maps(2, (5, 5));
    let err = policy
        .mix_seeded(&mut images, &mut labels, Some(&maps), None, 0)
        .unwrap_err();
    assert!(matches!(err, MixError::ShapeMismatch { .. }));

    // wrong map extent
    let small: Vec<SaliencyMap> = (0..3).map(|_| SaliencyMap::zeros(16, 16)).collect();
    assert!(policy
        .mix_seeded(&mut images, &mut labels, Some(&small), None, 0)
        .is_err());

    // label rows disagree with images
    let mut short_labels = LabelBatch::one_hot(&[0, 1], 2).unwrap();
    assert!(policy
        .mix_seeded(&mut images, &mut short_labels, None, None, 0)
        .is_err());

    assert_eq!(images, original);
    assert_eq!(labels, original_labels);
}

#[test]
fn seeded_runs_are_reproducible() {
    let policy = policy("local_mean_saliency_mix_joint", 4);
    let source = ImageBatch::from_seed(8, 5, 3, SIZE, SIZE);
    let run = |seed: u64| {
        let mut images = source.clone();
        let mut labels = LabelBatch::one_hot(&[0, 1, 2, 3, 0], 4).unwrap();
        let report = policy
            .mix_seeded(&mut images, &mut labels, None, None, seed)
            .unwrap();
        (images, labels, report)
    };

    let a = run(1234);
    let b = run(1234);
    let c = run(4321);
    assert_eq!(a, b);
    assert_ne!(a.2, c.2);
}

#[test]
fn legacy_variant_shares_one_box_and_permutation() {
    let policy = policy("saliency_mix", 4);
    let maps = peaked_maps(5, (12, 12));
    let mut images = ImageBatch::from_seed(4, 5, 3, SIZE, SIZE);
    let mut labels = LabelBatch::one_hot(&[0, 1, 2, 3, 0], 4).unwrap();

    let report = policy
        .mix_seeded(&mut images, &mut labels, Some(&maps), None, 61)
        .unwrap();
    assert_eq!(report.mixed_count(), 5);

    let shared = report.records[0].copy_box;
    assert!(report.records.iter().all(|r| r.copy_box == shared));

    let mut partners: Vec<usize> = report.records.iter().map(|r| r.copy_index).collect();
    partners.sort_unstable();
    assert_eq!(partners, vec![0, 1, 2, 3, 4]);
}

#[test]
fn degenerate_maps_skip_items_without_aborting() {
    let policy = policy("rand_sal_mix", 3);
    let maps: Vec<SaliencyMap> = (0..4).map(|_| SaliencyMap::zeros(SIZE, SIZE)).collect();
    let original = ImageBatch::from_seed(9, 4, 3, SIZE, SIZE);
    let mut images = original.clone();
    let mut labels = LabelBatch::one_hot(&[0, 1, 2, 0], 3).unwrap();
    let original_labels = labels.clone();

    let report = policy
        .mix_seeded(&mut images, &mut labels, Some(&maps), None, 2)
        .unwrap();

    assert_eq!(report.mixed_count(), 0);
    assert_eq!(report.skipped_count(), 4);
    assert!(report
        .skipped
        .iter()
        .all(|s| s.reason == SkipReason::DegenerateRegion));
    assert_eq!(images, original);
    assert_eq!(labels, original_labels);
}

#[test]
fn partially_degenerate_batch_mixes_the_rest() {
    let policy = policy("rand_sal_mix", 2);
    let mut maps: Vec<SaliencyMap> = (0..2)
        .map(|_| SaliencyMap::new(Array2::from_elem((SIZE, SIZE), 100.0)))
        .collect();
    // a saturated map has no paste weight
    maps.push(SaliencyMap::new(Array2::from_elem((SIZE, SIZE), 255.0)));
    let mut images = ImageBatch::from_seed(9, 3, 3, SIZE, SIZE);
    let mut labels = LabelBatch::one_hot(&[0, 1, 0], 2).unwrap();

    let report = policy
        .mix_seeded(&mut images, &mut labels, Some(&maps), None, 8)
        .unwrap();
    assert!(report.record_for(2).is_none());
    assert!(report.is_skipped(2));
    assert_eq!(report.mixed_count() + report.skipped_count(), 3);
}

#[test]
fn noise_variant_changes_the_patch() {
    let policy = policy("noise_saliency_mix_fixed", 2);
    let maps = peaked_maps(2, (16, 16));
    let original = ImageBatch::from_seed(5, 2, 3, SIZE, SIZE);
    let mut images = original.clone();
    let mut labels = LabelBatch::one_hot(&[0, 1], 2).unwrap();

    let report = policy
        .mix_seeded(&mut images, &mut labels, Some(&maps), None, 3)
        .unwrap();
    for record in report.records.iter().filter(|r| r.copy_box.area() >= 16) {
        let written = images.region(record.paste_index, &record.paste_box).unwrap();
        let copied = original.region(record.copy_index, &record.copy_box).unwrap();
        let diff: f32 = written
            .iter()
            .zip(copied.iter())
            .map(|(a, b)| (a - b).abs())
            .sum::<f32>()
            / written.len() as f32;
        // mean |N(0, 0.2)| is about 0.16
        assert!(diff > 0.05 && diff < 0.4, "mean abs noise {}", diff);
    }
}

#[test]
fn error_mix_saturates_on_swapped_two_class_output() {
    let policy = policy("error_mix", 2);
    // label [1, 0] scored as [0, 1]: discrepancy is [1, 1], both entries saturate
    let outputs = Array2::from_shape_vec((1, 2), vec![0.0f32, 1.0]).unwrap();
    let labels_for_update = LabelBatch::one_hot(&[0], 2).unwrap();
    let mut errors_full = ErrorMatrix::new(2, 1.0).unwrap();
    policy
        .report_outcome(&mut errors_full, outputs.view(), &labels_for_update)
        .unwrap();
    assert_eq!(errors_full.get(0, 0), Some(1.0));
    assert_eq!(errors_full.get(0, 1), Some(1.0));

    // both entries saturated: class-0 items pick partners uniformly
    let probs = errors_full.partner_probabilities(0, &[0, 0, 1], 0).unwrap();
    assert!((probs[1] - 0.5).abs() < 1e-9);

    // soft label [0.6, 0.4] against [0, 1]: row 0 = [0.6, 0.6]
    let soft = LabelBatch::from_array(Array2::from_shape_vec((1, 2), vec![0.6f32, 0.4]).unwrap());
    let mut errors = ErrorMatrix::new(2, 1.0).unwrap();
    policy.report_outcome(&mut errors, outputs.view(), &soft).unwrap();
    assert!((errors.get(0, 0).unwrap() - 0.6).abs() < 1e-6);
    assert!((errors.get(0, 1).unwrap() - 0.6).abs() < 1e-6);

    let maps = peaked_maps(4, (16, 16));
    let mut images = ImageBatch::from_seed(12, 4, 3, SIZE, SIZE);
    let mut labels = LabelBatch::one_hot(&[0, 1, 0, 1], 2).unwrap();
    let report = policy
        .mix_seeded(&mut images, &mut labels, Some(&maps), Some(&errors), 14)
        .unwrap();
    for record in &report.records {
        assert_ne!(record.paste_index, record.copy_index);
    }
}

#[test]
fn error_mix_prefers_well_separated_partners() {
    let policy = policy("error_mix", 3);
    let mut errors = ErrorMatrix::new(3, 1.0).unwrap();
    // class 0 scored as class 2: row 0 = [1, 0, 1], class 1 is the only clean partner
    let outputs = Array2::from_shape_vec((1, 3), vec![0.0f32, 0.0, 1.0]).unwrap();
    let update_labels = LabelBatch::one_hot(&[0], 3).unwrap();
    policy
        .report_outcome(&mut errors, outputs.view(), &update_labels)
        .unwrap();
    assert_eq!(errors.get(0, 0), Some(1.0));
    assert_eq!(errors.get(0, 1), Some(0.0));
    assert_eq!(errors.get(0, 2), Some(1.0));

    let classes = [0, 2, 0, 1, 2, 0];
    let maps = peaked_maps(classes.len(), (16, 16));
    let mut to_clean = 0usize;
    let mut total = 0usize;
    for seed in 0..40u64 {
        let mut images = ImageBatch::from_seed(seed + 1, classes.len(), 3, SIZE, SIZE);
        let mut labels = LabelBatch::one_hot(&classes, 3).unwrap();
        let report = policy
            .mix_seeded(&mut images, &mut labels, Some(&maps), Some(&errors), seed)
            .unwrap();
        for record in &report.records {
            assert_ne!(record.paste_index, record.copy_index);
            if classes[record.paste_index] == 0 {
                total += 1;
                if classes[record.copy_index] == 1 {
                    to_clean += 1;
                }
            }
        }
    }

    // uniform choice would pick the single class-1 item 1 time in 5
    assert_eq!(total, 3 * 40);
    assert!(
        to_clean * 10 >= total * 9,
        "class-1 partner chosen {} of {} times",
        to_clean,
        total
    );
}

#[test]
fn uniform_error_matrix_update_scenario() {
    let mut errors = ErrorMatrix::new(4, 0.5).unwrap();
    assert!(errors.as_array().iter().all(|v| (*v - 0.25).abs() < 1e-15));

    let labels = LabelBatch::one_hot(&[2, 0], 4).unwrap();
    let mut outputs = labels.values.clone();
    outputs[[1, 3]] = 5.0;
    errors.update(outputs.view(), labels.values.view()).unwrap();

    for col in 0..4 {
        assert!(errors.get(2, col).unwrap() < 0.25);
    }
    assert!(errors.as_array().iter().all(|v| v.is_finite() && *v >= 0.0));
}
