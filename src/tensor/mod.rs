pub mod batch;
pub mod saliency;

pub use batch::{ImageBatch, LabelBatch};
pub use saliency::{ContrastSaliency, SaliencyDetector, SaliencyMap};
