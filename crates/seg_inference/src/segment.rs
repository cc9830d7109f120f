//! Single-image inference: decode, normalize, segment, colorize, save.

use crate::colorize::{ClassMap, LabelColorizer};
use crate::error::{InferenceError, InferenceResult};
use seg_dataset::{decode_image, NormalizedImage, Normalizer};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_SAVE_DIR: &str = "./output";
pub const DEFAULT_FILE_NAME: &str = "mask.png";

/// A network that turns one normalized image into per-pixel class indices.
pub trait Segmenter {
    fn num_classes(&self) -> usize;
    fn segment(&mut self, image: &NormalizedImage) -> InferenceResult<ClassMap>;
}

/// Builds a [`Segmenter`] from a weights file.
pub trait SegmenterLoader {
    type Segmenter: Segmenter;
    fn load(&self, weights: &Path) -> InferenceResult<Self::Segmenter>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceOptions {
    /// Created if absent.
    pub save_dir: PathBuf,
    pub file_name: String,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from(DEFAULT_SAVE_DIR),
            file_name: DEFAULT_FILE_NAME.to_string(),
        }
    }
}

impl InferenceOptions {
    pub fn output_path(&self) -> PathBuf {
        self.save_dir.join(&self.file_name)
    }
}

/// Segment `image_path` with weights from `weights_path` and write the colorized mask.
///
/// Weights are loaded before the image is touched; a load failure aborts with nothing
/// written. The image is normalized with no target size, as a batch of one.
/// Returns the path of the written file.
pub fn run_inference<L, C>(
    image_path: &Path,
    weights_path: &Path,
    options: &InferenceOptions,
    normalizer: &Normalizer,
    loader: &L,
    colorizer: &C,
) -> InferenceResult<PathBuf>
where
    L: SegmenterLoader,
    C: LabelColorizer + ?Sized,
{
    let mut segmenter = loader.load(weights_path)?;
    info!(weights = %weights_path.display(), "restored model parameters");

    let image = decode_image(image_path, 0).map_err(InferenceError::from_decode)?;
    let normalized = normalizer.normalize_image(&image, None);
    debug!(
        height = normalized.height,
        width = normalized.width,
        "normalized input"
    );

    let classes = segmenter.segment(&normalized)?;
    if classes.dims_hw() != normalized.dims_hw() {
        return Err(InferenceError::OutputShape {
            expected: normalized.dims_hw(),
            found: classes.dims_hw(),
        });
    }
    classes.check_range(colorizer.num_classes())?;
    let colored = colorizer.colorize(&classes)?;

    fs::create_dir_all(&options.save_dir).map_err(|e| InferenceError::Io {
        path: options.save_dir.clone(),
        source: e,
    })?;
    let out = options.output_path();
    colored.save(&out).map_err(|e| InferenceError::ImageWrite {
        path: out.clone(),
        source: e,
    })?;
    info!(path = %out.display(), "saved mask");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_is_mask_png_under_output() {
        let opts = InferenceOptions::default();
        assert_eq!(opts.output_path(), Path::new("./output").join("mask.png"));
    }
}
