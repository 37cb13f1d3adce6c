//! Adaptive Mixing Demo - error-matrix guided augmentation
//!
//! Runs a short simulated training loop: each step mixes a synthetic batch,
//! feeds fake model scores back into the error matrix, logs both to
//! `logs/augment.jsonl` and checkpoints the matrix at the end.
//!
//! Run with: cargo run --example adaptive_training

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use saliency_mix_core::{
    log_error_matrix, log_mix_report, AugmentationPolicy, Checkpointable, ImageBatch, LabelBatch,
    MixConfig, DEFAULT_AUGMENT_LOG,
};

const STEPS: usize = 20;
const BATCH: usize = 16;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = MixConfig::load_from_file("config/augment.toml").unwrap_or_else(|err| {
        println!("⚠️  Using default config ({})", err);
        MixConfig::default().with_variant("error_mix")
    });
    let num_classes = config.num_classes;
    let seed = config.seed;

    let policy = AugmentationPolicy::new(config)?;
    let mut errors = policy.new_error_matrix()?;
    let mut rng = StdRng::seed_from_u64(seed);

    println!("🧪 Adaptive Mixing Demo");
    println!("=======================\n");
    println!("Variant:   {}", policy.variant());
    println!("Detector:  {}", policy.detector_name());
    println!("Classes:   {}\n", num_classes);

    for step in 0..STEPS {
        let mut images = ImageBatch::from_seed(seed + step as u64, BATCH, 3, 32, 32);
        let classes: Vec<usize> = (0..BATCH).map(|_| rng.gen_range(0..num_classes)).collect();
        let mut labels = LabelBatch::one_hot(&classes, num_classes)?;

        let report = policy.mix(&mut images, &mut labels, None, errors.as_ref(), &mut rng)?;
        log_mix_report(DEFAULT_AUGMENT_LOG, step, policy.variant().as_str(), &report)?;

        if let Some(matrix) = errors.as_mut() {
            // fake classifier: noisy scores around the blended labels
            let outputs = labels
                .values
                .mapv(|v| v + rng.gen_range(-0.2f32..0.2));
            policy.report_outcome(matrix, outputs.view(), &labels)?;
            log_error_matrix("logs/error_matrix.jsonl", step, matrix)?;
        }

        if (step + 1) % 5 == 0 {
            println!(
                "📊 Step {:>2}/{}: mixed {:>2}, skipped {}, mean λ {:.3}",
                step + 1,
                STEPS,
                report.mixed_count(),
                report.skipped_count(),
                report.mean_lambda().unwrap_or(1.0)
            );
        }
    }

    if let Some(matrix) = errors.as_ref() {
        matrix.save_checkpoint("checkpoints/error_matrix.bin")?;
        println!("\n💾 Error matrix saved to checkpoints/error_matrix.bin");
        for class in 0..matrix.num_classes().min(4) {
            let row: Vec<String> = matrix
                .row(class)
                .iter()
                .take(4)
                .map(|v| format!("{:.3}", v))
                .collect();
            println!("   row {}: [{} ...]", class, row.join(", "));
        }
    }

    println!("\n🎉 Demo complete! Logs in {}", DEFAULT_AUGMENT_LOG);
    Ok(())
}
