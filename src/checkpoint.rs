//! Versioned binary snapshots of adaptive mixing state.
//!
//! The error matrix is the only state a training run accumulates between
//! batches. It is stored as a flat row-major entry list behind a format
//! version, encoded with fixed-width little-endian bincode so that the same
//! matrix always produces the same bytes and a resumed run continues
//! bit-exactly.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use bincode::Options;

use crate::error::MixError;

/// Failure to persist or restore mixing state.
#[derive(Debug)]
pub enum CheckpointError {
    Io(std::io::Error),
    Codec(bincode::Error),
    /// Snapshot written by a different format version.
    VersionMismatch { expected: u32, found: u32 },
    /// Stored entry count does not match `num_classes * num_classes`.
    EntryCount { num_classes: usize, found: usize },
    /// A stored entry is negative or not finite.
    InvalidEntry { row: usize, col: usize, value: f64 },
    /// Stored class count or EMA weight cannot build a matrix.
    InvalidParameters(MixError),
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::Io(err) => write!(f, "checkpoint I/O failed: {err}"),
            CheckpointError::Codec(err) => write!(f, "checkpoint encoding failed: {err}"),
            CheckpointError::VersionMismatch { expected, found } => write!(
                f,
                "checkpoint format version {found} is not supported (expected {expected})"
            ),
            CheckpointError::EntryCount { num_classes, found } => write!(
                f,
                "checkpoint holds {found} entries, a {num_classes}x{num_classes} matrix needs {}",
                num_classes.saturating_mul(*num_classes)
            ),
            CheckpointError::InvalidEntry { row, col, value } => write!(
                f,
                "checkpoint entry [{row}, {col}] = {value} is not a finite non-negative discrepancy"
            ),
            CheckpointError::InvalidParameters(err) => {
                write!(f, "checkpoint parameters rejected: {err}")
            }
        }
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CheckpointError::Io(err) => Some(err),
            CheckpointError::Codec(err) => Some(err),
            CheckpointError::InvalidParameters(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CheckpointError {
    fn from(err: std::io::Error) -> Self {
        CheckpointError::Io(err)
    }
}

impl From<bincode::Error> for CheckpointError {
    fn from(err: bincode::Error) -> Self {
        CheckpointError::Codec(err)
    }
}

impl From<MixError> for CheckpointError {
    fn from(err: MixError) -> Self {
        CheckpointError::InvalidParameters(err)
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_little_endian()
}

/// Checks a flat row-major `num_classes x num_classes` entry list read back
/// from disk: the count must match and every entry must be a finite,
/// non-negative discrepancy.
pub(crate) fn check_square_entries(
    num_classes: usize,
    entries: &[f64],
) -> Result<(), CheckpointError> {
    let expected = num_classes.checked_mul(num_classes);
    if expected != Some(entries.len()) {
        return Err(CheckpointError::EntryCount {
            num_classes,
            found: entries.len(),
        });
    }
    if let Some((index, &value)) = entries
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || **v < 0.0)
    {
        return Err(CheckpointError::InvalidEntry {
            row: index / num_classes,
            col: index % num_classes,
            value,
        });
    }
    Ok(())
}

/// State that can be written to disk and restored bit-exactly.
pub trait Checkpointable: Sized {
    /// Format version stamped into every snapshot of this type.
    const CHECKPOINT_VERSION: u32;

    fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError>;

    fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError>;

    /// Rejects snapshots stamped with another format version.
    fn check_version(found: u32) -> Result<(), CheckpointError> {
        if found == Self::CHECKPOINT_VERSION {
            Ok(())
        } else {
            Err(CheckpointError::VersionMismatch {
                expected: Self::CHECKPOINT_VERSION,
                found,
            })
        }
    }

    /// Encodes `snapshot` next to `path` and renames it into place, so an
    /// interrupted save never leaves a half-written checkpoint behind.
    fn write_snapshot<P, T>(snapshot: &T, path: P) -> Result<(), CheckpointError>
    where
        P: AsRef<Path>,
        T: serde::Serialize,
    {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let staging = path.with_extension("partial");
        {
            let mut writer = BufWriter::new(File::create(&staging)?);
            codec().serialize_into(&mut writer, snapshot)?;
            writer.flush()?;
        }
        fs::rename(&staging, path)?;
        Ok(())
    }

    fn read_snapshot<P, T>(path: P) -> Result<T, CheckpointError>
    where
        P: AsRef<Path>,
        T: serde::de::DeserializeOwned,
    {
        let mut reader = BufReader::new(File::open(path)?);
        Ok(codec().deserialize_from(&mut reader)?)
    }
}
