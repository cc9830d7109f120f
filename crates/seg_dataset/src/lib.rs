//! Image/segmentation-mask streaming for training, plus the normalization shared with inference.
//!
//! This crate provides:
//! - Manifest loading (`image mask` pairs joined onto a data directory)
//! - Per-epoch ordering with optional reshuffling
//! - Random-scale augmentation that never invents mask labels
//! - Center crop-or-pad, BGR reorder, and mean subtraction
//! - A worker-pool pipeline that assembles batches and stops cooperatively
//! - Burn tensor conversion (`burn-runtime` feature)

pub mod aug;
pub mod batch;
pub mod cancel;
pub mod config;
pub mod decode;
pub mod manifest;
pub mod normalize;
pub mod pipeline;
pub mod sequencer;
pub mod types;

pub use aug::{random_scale, scale_pair, scaled_dims};
pub use batch::SegBatch;
pub use cancel::CancellationToken;
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use decode::{decode_image, decode_mask, decode_sample};
pub use manifest::Manifest;
pub use normalize::{crop_or_pad, ImagePad, Normalizer, DEFAULT_MEAN_BGR};
pub use pipeline::{BatchOutcome, Batches, PipelineState, SegPipeline};
pub use sequencer::{EpochSequencer, SharedSequencer, Ticket};
pub use types::*;

#[cfg(feature = "burn-runtime")]
pub use batch::BurnSegBatch;
