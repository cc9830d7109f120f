//! Stacking processed samples into batches.

use crate::types::{DatasetResult, NormalizedImage, ProcessedSample, SegDatasetError};

/// A stacked group of processed samples.
///
/// `images` is laid out N x H x W x 3 (network channel order), `masks` N x H x W x 1.
/// Row `i` of both buffers, `sources[i]` and `epochs[i]` all describe the same sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SegBatch {
    pub images: Vec<f32>,
    pub masks: Vec<u8>,
    /// Manifest index of each row.
    pub sources: Vec<usize>,
    pub epochs: Vec<u32>,
    pub height: u32,
    pub width: u32,
}

impl SegBatch {
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn image_shape(&self) -> [usize; 4] {
        [self.len(), self.height as usize, self.width as usize, 3]
    }

    pub fn mask_shape(&self) -> [usize; 4] {
        [self.len(), self.height as usize, self.width as usize, 1]
    }

    /// HWC slice of row `i`.
    pub fn image(&self, i: usize) -> &[f32] {
        let stride = self.height as usize * self.width as usize * 3;
        &self.images[i * stride..(i + 1) * stride]
    }

    /// HW slice of row `i`.
    pub fn mask(&self, i: usize) -> &[u8] {
        let stride = self.height as usize * self.width as usize;
        &self.masks[i * stride..(i + 1) * stride]
    }

    pub fn mask_at(&self, i: usize, x: u32, y: u32) -> u8 {
        self.mask(i)[(y * self.width + x) as usize]
    }

    pub fn pixel_at(&self, i: usize, x: u32, y: u32) -> [f32; 3] {
        let img = self.image(i);
        let base = ((y * self.width + x) * 3) as usize;
        [img[base], img[base + 1], img[base + 2]]
    }
}

/// Accumulates samples for one batch. Every sample must share the first one's size.
#[derive(Debug)]
pub(crate) struct BatchAssembler {
    batch_size: usize,
    size_hw: Option<(u32, u32)>,
    images: Vec<f32>,
    masks: Vec<u8>,
    sources: Vec<usize>,
    epochs: Vec<u32>,
}

impl BatchAssembler {
    pub(crate) fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            size_hw: None,
            images: Vec::new(),
            masks: Vec::new(),
            sources: Vec::with_capacity(batch_size),
            epochs: Vec::with_capacity(batch_size),
        }
    }

    pub(crate) fn push(&mut self, sample: ProcessedSample) -> DatasetResult<()> {
        let size = sample.image.dims_hw();
        match self.size_hw {
            None => {
                self.size_hw = Some(size);
                let (h, w) = (size.0 as usize, size.1 as usize);
                self.images.reserve(self.batch_size * h * w * 3);
                self.masks.reserve(self.batch_size * h * w);
            }
            Some(expected) if expected != size => {
                return Err(SegDatasetError::ShapeMismatch {
                    expected,
                    found: size,
                });
            }
            _ => {}
        }
        let mask_hw = (sample.mask.height(), sample.mask.width());
        if mask_hw != size {
            return Err(SegDatasetError::ShapeMismatch {
                expected: size,
                found: mask_hw,
            });
        }
        self.images.extend_from_slice(sample.image.as_slice());
        self.masks.extend_from_slice(sample.mask.as_raw());
        self.sources.push(sample.index);
        self.epochs.push(sample.epoch);
        Ok(())
    }

    pub(crate) fn is_full(&self) -> bool {
        self.sources.len() >= self.batch_size
    }

    /// Hand out the finished batch and reset for the next one.
    pub(crate) fn finish(&mut self) -> Option<SegBatch> {
        let (height, width) = self.size_hw.take()?;
        Some(SegBatch {
            images: std::mem::take(&mut self.images),
            masks: std::mem::take(&mut self.masks),
            sources: std::mem::replace(&mut self.sources, Vec::with_capacity(self.batch_size)),
            epochs: std::mem::replace(&mut self.epochs, Vec::with_capacity(self.batch_size)),
            height,
            width,
        })
    }

    /// Drop whatever was collected so far.
    pub(crate) fn discard(&mut self) -> usize {
        let dropped = self.sources.len();
        self.size_hw = None;
        self.images.clear();
        self.masks.clear();
        self.sources.clear();
        self.epochs.clear();
        dropped
    }
}

#[cfg(feature = "burn-runtime")]
pub struct BurnSegBatch<B: burn::tensor::backend::Backend> {
    /// [N, H, W, 3]
    pub images: burn::tensor::Tensor<B, 4>,
    /// [N, H, W, 1]
    pub masks: burn::tensor::Tensor<B, 4, burn::tensor::Int>,
}

#[cfg(feature = "burn-runtime")]
impl SegBatch {
    pub fn to_burn<B: burn::tensor::backend::Backend>(&self, device: &B::Device) -> BurnSegBatch<B> {
        use burn::tensor::{Int, Tensor, TensorData};
        let images = Tensor::<B, 1>::from_floats(self.images.as_slice(), device)
            .reshape(self.image_shape());
        let labels: Vec<i64> = self.masks.iter().map(|&v| i64::from(v)).collect();
        let masks = Tensor::<B, 4, Int>::from_data(TensorData::new(labels, self.mask_shape()), device);
        BurnSegBatch { images, masks }
    }
}

#[cfg(feature = "burn-runtime")]
impl NormalizedImage {
    /// Single-image batch of shape [1, H, W, 3].
    pub fn to_burn<B: burn::tensor::backend::Backend>(
        &self,
        device: &B::Device,
    ) -> burn::tensor::Tensor<B, 4> {
        burn::tensor::Tensor::<B, 1>::from_floats(self.as_slice(), device).reshape([
            1,
            self.height as usize,
            self.width as usize,
            3,
        ])
    }
}
