use seg_dataset::SegDatasetError;
use std::path::PathBuf;
use thiserror::Error;

pub type InferenceResult<T> = Result<T, InferenceError>;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("failed to load weights from {path}: {reason}")]
    WeightLoad { path: PathBuf, reason: String },
    #[error("input image not found: {0}")]
    MissingImage(PathBuf),
    #[error("cannot decode input image {path}: {reason}")]
    ImageDecode { path: PathBuf, reason: String },
    #[error("class index {class} outside [0, {num_classes})")]
    ClassOutOfRange { class: u32, num_classes: usize },
    #[error("segmenter returned a {found:?} map for a {expected:?} image")]
    OutputShape {
        /// (height, width)
        expected: (u32, u32),
        found: (u32, u32),
    },
    #[error("class map holds {found} values, expected {expected}")]
    ClassMapSize { expected: usize, found: usize },
    #[error("backend error: {0}")]
    Backend(String),
    #[error("failed to write {path}: {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Dataset(#[from] SegDatasetError),
}

impl InferenceError {
    /// Re-frame decoder errors for a file that did not come from a manifest.
    pub(crate) fn from_decode(err: SegDatasetError) -> Self {
        match err {
            SegDatasetError::MissingFile { path, .. } => InferenceError::MissingImage(path),
            SegDatasetError::Decode { path, reason, .. } => {
                InferenceError::ImageDecode { path, reason }
            }
            other => InferenceError::Dataset(other),
        }
    }
}
