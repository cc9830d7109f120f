//! Core types, error definitions, and data structures for seg_dataset.

use image::{GrayImage, Rgb32FImage};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, SegDatasetError>;

#[derive(Debug, Error)]
pub enum SegDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "malformed manifest {path} line {line}: expected 2 whitespace-separated paths, found {tokens}"
    )]
    ManifestFormat {
        path: PathBuf,
        line: usize,
        tokens: usize,
    },
    #[error("manifest {path} lists no samples")]
    EmptyManifest { path: PathBuf },
    #[error("manifest line {line}: file not found: {path}")]
    MissingFile { line: usize, path: PathBuf },
    #[error("manifest line {line}: cannot decode {path}: {reason}")]
    Decode {
        line: usize,
        path: PathBuf,
        reason: String,
    },
    #[error("invalid pipeline config: {0}")]
    Config(String),
    #[error(
        "batch contains varying sample sizes ({expected:?} vs {found:?}); set a target_size to force consistency"
    )]
    ShapeMismatch {
        /// (height, width) of the first sample in the batch.
        expected: (u32, u32),
        found: (u32, u32),
    },
    #[error("failed to spawn pipeline worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("pipeline worker {0} panicked")]
    WorkerPanicked(usize),
}

/// One manifest entry: an image and its segmentation mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub image_path: PathBuf,
    pub mask_path: PathBuf,
    /// 1-based line in the manifest file this sample was read from.
    pub line: usize,
}

/// A decoded image/mask pair at source resolution.
#[derive(Debug, Clone)]
pub struct DecodedSample {
    /// RGB pixels on the 0..=255 scale.
    pub image: Rgb32FImage,
    /// Class indices, one per pixel.
    pub mask: GrayImage,
}

impl DecodedSample {
    /// (height, width) of the image.
    pub fn dims_hw(&self) -> (u32, u32) {
        (self.image.height(), self.image.width())
    }
}

/// Image after crop-or-pad, channel reorder, and mean subtraction.
///
/// Pixels are stored HWC in network channel order (BGR).
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl NormalizedImage {
    pub fn dims_hw(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        let base = ((y * self.width + x) * 3) as usize;
        [self.data[base], self.data[base + 1], self.data[base + 2]]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// A sample that went through decode, augmentation, and normalization.
#[derive(Debug, Clone)]
pub struct ProcessedSample {
    /// Position of the source sample in the manifest.
    pub index: usize,
    pub epoch: u32,
    pub image: NormalizedImage,
    pub mask: GrayImage,
}
