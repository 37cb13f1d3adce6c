//! JSON-lines run logs.
//!
//! One object per line, appended. Callers pick the file; the default sits
//! next to the training run under `logs/`.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::mixing::{ErrorMatrix, MixReport};

pub const DEFAULT_AUGMENT_LOG: &str = "logs/augment.jsonl";

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn append_json_line<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> io::Result<()> {
    ensure_parent(path.as_ref())?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    serde_json::to_writer(&mut file, value)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    file.write_all(b"\n")
}

fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[derive(Debug, Serialize)]
pub struct MixLogEntry<'a> {
    pub step: usize,
    pub variant: &'a str,
    pub mixed: usize,
    pub skipped: usize,
    pub mean_lambda: Option<f64>,
    pub report: &'a MixReport,
    pub timestamp_ms: u128,
}

pub fn log_mix_report<P: AsRef<Path>>(
    path: P,
    step: usize,
    variant: &str,
    report: &MixReport,
) -> io::Result<()> {
    let entry = MixLogEntry {
        step,
        variant,
        mixed: report.mixed_count(),
        skipped: report.skipped_count(),
        mean_lambda: report.mean_lambda(),
        report,
        timestamp_ms: timestamp_ms(),
    };
    append_json_line(path, &entry)
}

#[derive(Debug, Serialize)]
pub struct ErrorMatrixLogEntry {
    pub step: usize,
    pub num_classes: usize,
    pub exp_weight: f64,
    /// Row-major matrix entries
    pub rows: Vec<Vec<f64>>,
    /// Largest off-diagonal confusion, the pair most often mistaken
    pub max_confusion: f64,
    pub timestamp_ms: u128,
}

pub fn log_error_matrix<P: AsRef<Path>>(
    path: P,
    step: usize,
    matrix: &ErrorMatrix,
) -> io::Result<()> {
    let rows: Vec<Vec<f64>> = matrix
        .as_array()
        .outer_iter()
        .map(|row| row.to_vec())
        .collect();
    let max_confusion = matrix
        .as_array()
        .indexed_iter()
        .filter(|((row, col), _)| row != col)
        .map(|(_, value)| *value)
        .fold(0.0f64, f64::max);

    let entry = ErrorMatrixLogEntry {
        step,
        num_classes: matrix.num_classes(),
        exp_weight: matrix.exp_weight(),
        rows,
        max_confusion,
        timestamp_ms: timestamp_ms(),
    };
    append_json_line(path, &entry)
}
