//! Per-batch account of what the mixer did.
//!
//! The training loop needs, per item, the two label sources and the
//! corrected ratio to compute `lam * loss(a) + (1 - lam) * loss(b)`. The
//! report carries exactly that, plus the boxes for logging.

use serde::{Deserialize, Serialize};

use super::geometry::BoundingBox;

/// One mixed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixRecord {
    /// Item whose image received the patch
    pub paste_index: usize,
    /// Item the patch and the second label came from
    pub copy_index: usize,
    /// Corrected ratio: weight of the paste item's own label
    pub lambda: f64,
    /// Ratio drawn from Beta(β, β) before clipping
    pub sampled_lambda: f64,
    pub copy_box: BoundingBox,
    pub paste_box: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The selector found no valid sampling distribution
    DegenerateRegion,
    /// The batch had no other item to mix with
    NoPartner,
}

/// An item left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub index: usize,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MixReport {
    pub records: Vec<MixRecord>,
    pub skipped: Vec<SkippedItem>,
}

impl MixReport {
    pub fn mixed_count(&self) -> usize {
        self.records.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Mean corrected ratio over mixed items, `None` if nothing was mixed.
    pub fn mean_lambda(&self) -> Option<f64> {
        if self.records.is_empty() {
            return None;
        }
        let total: f64 = self.records.iter().map(|r| r.lambda).sum();
        Some(total / self.records.len() as f64)
    }

    pub fn record_for(&self, paste_index: usize) -> Option<&MixRecord> {
        self.records.iter().find(|r| r.paste_index == paste_index)
    }

    pub fn is_skipped(&self, index: usize) -> bool {
        self.skipped.iter().any(|s| s.index == index)
    }

    pub(crate) fn skip(&mut self, index: usize, reason: SkipReason) {
        self.skipped.push(SkippedItem { index, reason });
    }
}
