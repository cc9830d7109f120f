//! Class-index maps and their conversion to color images.

use crate::error::{InferenceError, InferenceResult};
use image::{Rgb, RgbImage};

/// Row-major H x W grid of class indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMap {
    width: u32,
    height: u32,
    classes: Vec<u32>,
}

impl ClassMap {
    pub fn new(width: u32, height: u32, classes: Vec<u32>) -> InferenceResult<Self> {
        let expected = width as usize * height as usize;
        if classes.len() != expected {
            return Err(InferenceError::ClassMapSize {
                expected,
                found: classes.len(),
            });
        }
        Ok(Self {
            width,
            height,
            classes,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dims_hw(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.classes[(y * self.width + x) as usize]
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.classes
    }

    /// Fails on the first index outside `[0, num_classes)`.
    pub fn check_range(&self, num_classes: usize) -> InferenceResult<()> {
        match self
            .classes
            .iter()
            .copied()
            .find(|&c| c as usize >= num_classes)
        {
            Some(class) => Err(InferenceError::ClassOutOfRange { class, num_classes }),
            None => Ok(()),
        }
    }
}

/// Maps an H x W class-index map to an H x W x 3 color image.
pub trait LabelColorizer {
    fn num_classes(&self) -> usize;
    fn colorize(&self, classes: &ClassMap) -> InferenceResult<RgbImage>;
}

/// PASCAL VOC 2012 colors for background plus 20 object classes.
pub const VOC_COLORS: [[u8; 3]; 21] = [
    [0, 0, 0],
    [128, 0, 0],
    [0, 128, 0],
    [128, 128, 0],
    [0, 0, 128],
    [128, 0, 128],
    [0, 128, 128],
    [128, 128, 128],
    [64, 0, 0],
    [192, 0, 0],
    [64, 128, 0],
    [192, 128, 0],
    [64, 0, 128],
    [192, 0, 128],
    [64, 128, 128],
    [192, 128, 128],
    [0, 64, 0],
    [128, 64, 0],
    [0, 192, 0],
    [128, 192, 0],
    [0, 64, 128],
];

#[derive(Debug, Clone, Copy, Default)]
pub struct VocPalette;

impl LabelColorizer for VocPalette {
    fn num_classes(&self) -> usize {
        VOC_COLORS.len()
    }

    fn colorize(&self, classes: &ClassMap) -> InferenceResult<RgbImage> {
        classes.check_range(VOC_COLORS.len())?;
        Ok(RgbImage::from_fn(classes.width(), classes.height(), |x, y| {
            Rgb(VOC_COLORS[classes.get(x, y) as usize])
        }))
    }
}
