//! Reference Burn network and its checkpoint loader.
//!
//! `AtrousHead` is a dilated 3x3 convolution followed by a 1x1 classifier. It takes
//! NHWC input exactly as produced by the normalization stage and predicts one class
//! per pixel at input resolution.

use crate::colorize::ClassMap;
use crate::error::{InferenceError, InferenceResult};
use crate::segment::{Segmenter, SegmenterLoader};
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use seg_dataset::NormalizedImage;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct AtrousHeadConfig {
    pub num_classes: usize,
    pub hidden: usize,
    pub dilation: usize,
}

impl Default for AtrousHeadConfig {
    fn default() -> Self {
        Self {
            num_classes: 21,
            hidden: 64,
            dilation: 12,
        }
    }
}

#[derive(Debug, Module)]
pub struct AtrousHead<B: Backend> {
    atrous: Conv2d<B>,
    classifier: Conv2d<B>,
    num_classes: usize,
}

impl<B: Backend> AtrousHead<B> {
    pub fn new(cfg: AtrousHeadConfig, device: &B::Device) -> Self {
        let d = cfg.dilation.max(1);
        let atrous = Conv2dConfig::new([3, cfg.hidden], [3, 3])
            .with_dilation([d, d])
            .with_padding(PaddingConfig2d::Explicit(d, d))
            .init(device);
        let classifier = Conv2dConfig::new([cfg.hidden, cfg.num_classes], [1, 1]).init(device);
        Self {
            atrous,
            classifier,
            num_classes: cfg.num_classes,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// [N, H, W, 3] -> logits [N, classes, H, W].
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = input.permute([0, 3, 1, 2]);
        let x = relu(self.atrous.forward(x));
        self.classifier.forward(x)
    }

    /// [N, H, W, 3] -> class indices [N, H, W].
    pub fn predict(&self, input: Tensor<B, 4>) -> Tensor<B, 3, Int> {
        self.forward(input).argmax(1).squeeze::<3>(1)
    }
}

/// [`Segmenter`] backed by an [`AtrousHead`] on backend `B`.
pub struct BurnSegmenter<B: Backend> {
    model: AtrousHead<B>,
    device: B::Device,
}

impl<B: Backend> BurnSegmenter<B> {
    pub fn new(model: AtrousHead<B>, device: B::Device) -> Self {
        Self { model, device }
    }
}

impl<B: Backend> Segmenter for BurnSegmenter<B> {
    fn num_classes(&self) -> usize {
        self.model.num_classes()
    }

    fn segment(&mut self, image: &NormalizedImage) -> InferenceResult<ClassMap> {
        let input = image.to_burn::<B>(&self.device);
        let data = self.model.predict(input).into_data().convert::<i64>();
        let indices = data
            .to_vec::<i64>()
            .map_err(|e| InferenceError::Backend(format!("{e:?}")))?;
        let classes = indices
            .into_iter()
            .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
            .collect();
        ClassMap::new(image.width, image.height, classes)
    }
}

/// Loads [`AtrousHead`] checkpoints written with `BinFileRecorder<FullPrecisionSettings>`.
#[derive(Debug, Clone)]
pub struct BurnCheckpointLoader<B: Backend> {
    config: AtrousHeadConfig,
    device: B::Device,
}

impl<B: Backend> BurnCheckpointLoader<B> {
    pub fn new(config: AtrousHeadConfig, device: B::Device) -> Self {
        Self { config, device }
    }
}

impl<B: Backend> SegmenterLoader for BurnCheckpointLoader<B> {
    type Segmenter = BurnSegmenter<B>;

    fn load(&self, weights: &Path) -> InferenceResult<Self::Segmenter> {
        // The recorder appends its own `.bin` extension.
        if !weights.exists() && !weights.with_extension("bin").exists() {
            return Err(InferenceError::WeightLoad {
                path: weights.to_path_buf(),
                reason: "file not found".to_string(),
            });
        }
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let model = AtrousHead::<B>::new(self.config.clone(), &self.device)
            .load_file(weights, &recorder, &self.device)
            .map_err(|err| InferenceError::WeightLoad {
                path: weights.to_path_buf(),
                reason: format!("{err}"),
            })?;
        Ok(BurnSegmenter::new(model, self.device.clone()))
    }
}
