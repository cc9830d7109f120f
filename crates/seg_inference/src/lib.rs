#![recursion_limit = "256"]
//! Single-image segmentation inference.
//!
//! The input image goes through the same [`seg_dataset::Normalizer`] the training
//! pipeline uses, so both paths see bit-identical network input for the same file.
//! The network and the label-to-color step are traits ([`Segmenter`],
//! [`LabelColorizer`]); `AtrousHead` and `VocPalette` are the bundled implementations.

pub mod colorize;
pub mod error;
pub mod model;
pub mod segment;

pub type InferenceBackend = burn_ndarray::NdArray<f32>;

pub use colorize::{ClassMap, LabelColorizer, VocPalette, VOC_COLORS};
pub use error::{InferenceError, InferenceResult};
pub use model::{AtrousHead, AtrousHeadConfig, BurnCheckpointLoader, BurnSegmenter};
pub use segment::{
    run_inference, InferenceOptions, Segmenter, SegmenterLoader, DEFAULT_FILE_NAME,
    DEFAULT_SAVE_DIR,
};

pub mod prelude {
    pub use crate::colorize::{LabelColorizer, VocPalette};
    pub use crate::segment::{run_inference, InferenceOptions, Segmenter, SegmenterLoader};
    pub use crate::{AtrousHead, AtrousHeadConfig, BurnCheckpointLoader, InferenceBackend};
}
