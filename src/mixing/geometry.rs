//! Cut-box geometry.
//!
//! A mix ratio λ sizes a box covering roughly `1 - λ` of the image; after the
//! box is clipped to the image the ratio is recomputed from the surviving
//! area, and only that corrected value is used to blend labels.

use serde::{Deserialize, Serialize};

/// Half-open pixel rectangle `[row1, row2) x [col1, col2)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub row1: usize,
    pub col1: usize,
    pub row2: usize,
    pub col2: usize,
}

impl BoundingBox {
    pub fn new(row1: usize, col1: usize, row2: usize, col2: usize) -> Self {
        debug_assert!(row1 <= row2 && col1 <= col2, "inverted bounding box");
        Self {
            row1,
            col1,
            row2,
            col2,
        }
    }

    pub fn height(&self) -> usize {
        self.row2.saturating_sub(self.row1)
    }

    pub fn width(&self) -> usize {
        self.col2.saturating_sub(self.col1)
    }

    pub fn area(&self) -> usize {
        self.height() * self.width()
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    /// Whether the box is well-ordered and lies inside a `height x width` image.
    pub fn fits_within(&self, height: usize, width: usize) -> bool {
        self.row1 <= self.row2 && self.col1 <= self.col2 && self.row2 <= height && self.col2 <= width
    }

    /// Same top-left corner, extent shrunk to at most `height x width`.
    pub fn truncated(&self, height: usize, width: usize) -> Self {
        Self {
            row1: self.row1,
            col1: self.col1,
            row2: self.row1 + self.height().min(height),
            col2: self.col1 + self.width().min(width),
        }
    }
}

/// Cut extents for mix ratio `lam` on an `height x width` image.
///
/// `cut_ratio = sqrt(1 - lam)`; each extent is `floor(extent * cut_ratio)`.
/// `lam` is clamped to [0, 1] first.
pub fn cut_dimensions(lam: f64, height: usize, width: usize) -> (usize, usize) {
    let lam = if lam.is_nan() { 1.0 } else { lam.clamp(0.0, 1.0) };
    let cut_ratio = (1.0 - lam).sqrt();
    let cut_h = (height as f64 * cut_ratio).floor() as usize;
    let cut_w = (width as f64 * cut_ratio).floor() as usize;
    (cut_h.min(height), cut_w.min(width))
}

/// Box of `cut_h x cut_w` centred on the anchor, each edge clipped independently.
///
/// The box starts `cut / 2` before the anchor along each axis. Anchors near an
/// edge produce a smaller box, possibly of zero area; that is not an error.
pub fn compute_bounding_box(
    anchor_row: usize,
    anchor_col: usize,
    cut_h: usize,
    cut_w: usize,
    height: usize,
    width: usize,
) -> BoundingBox {
    let (row1, row2) = clip_span(anchor_row, cut_h, height);
    let (col1, col2) = clip_span(anchor_col, cut_w, width);
    BoundingBox {
        row1,
        col1,
        row2,
        col2,
    }
}

fn clip_span(anchor: usize, cut: usize, extent: usize) -> (usize, usize) {
    let start = anchor as i64 - (cut / 2) as i64;
    let end = start + cut as i64;
    let clip = |value: i64| value.clamp(0, extent as i64) as usize;
    (clip(start), clip(end))
}

/// Fraction of pixels left untouched by pasting `bbox`: `1 - area / (H * W)`.
pub fn corrected_lambda(bbox: &BoundingBox, height: usize, width: usize) -> f64 {
    let total = height * width;
    if total == 0 {
        return 1.0;
    }
    let area = bbox.area().min(total);
    1.0 - area as f64 / total as f64
}
