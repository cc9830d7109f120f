//! Deterministic normalization shared by the batch pipeline and single-image inference.
//!
//! Every sample goes through the same three steps:
//! 1. center crop-or-pad to the target (height, width), when one is set;
//! 2. RGB -> BGR channel permutation;
//! 3. per-channel mean subtraction.
//!
//! Construct one [`Normalizer`] and hand the same value to every consumer; a given
//! image then normalizes to bit-identical output on both paths.

use crate::types::{DecodedSample, NormalizedImage};
use image::imageops;
use image::{GrayImage, ImageBuffer, Luma, Pixel, Rgb, Rgb32FImage};
use serde::{Deserialize, Serialize};

/// Per-channel mean of the training set, in network (BGR) order, 0..=255 scale.
pub const DEFAULT_MEAN_BGR: [f32; 3] = [104.006_99, 116.668_77, 122.678_91];

/// Output channel `k` takes source (RGB) channel `NETWORK_CHANNEL_ORDER[k]`.
pub const NETWORK_CHANNEL_ORDER: [usize; 3] = [2, 1, 0];

/// Fill used for image pixels introduced by padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImagePad {
    /// Raw zero, i.e. `-mean` after normalization.
    #[default]
    Zero,
    /// The channel mean, i.e. zero after normalization.
    Mean,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    mean_bgr: [f32; 3],
    image_pad: ImagePad,
    mask_pad_label: u8,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MEAN_BGR)
    }
}

impl Normalizer {
    pub const fn new(mean_bgr: [f32; 3]) -> Self {
        Self {
            mean_bgr,
            image_pad: ImagePad::Zero,
            mask_pad_label: 0,
        }
    }

    pub fn with_image_pad(mut self, pad: ImagePad) -> Self {
        self.image_pad = pad;
        self
    }

    /// Label written into padded mask pixels. Defaults to 0, which collides with a real
    /// class whenever class 0 is not background.
    pub fn with_mask_pad_label(mut self, label: u8) -> Self {
        self.mask_pad_label = label;
        self
    }

    pub fn mean_bgr(&self) -> [f32; 3] {
        self.mean_bgr
    }

    pub fn image_pad(&self) -> ImagePad {
        self.image_pad
    }

    pub fn mask_pad_label(&self) -> u8 {
        self.mask_pad_label
    }

    /// Normalize one RGB image (0..=255 scale). `target` is (height, width).
    pub fn normalize_image(&self, image: &Rgb32FImage, target: Option<(u32, u32)>) -> NormalizedImage {
        let fitted;
        let image = match target {
            Some((h, w)) => {
                fitted = crop_or_pad(image, h, w, self.image_fill());
                &fitted
            }
            None => image,
        };
        let (width, height) = image.dimensions();
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for pixel in image.pixels() {
            for (k, &src) in NETWORK_CHANNEL_ORDER.iter().enumerate() {
                data.push(pixel[src] - self.mean_bgr[k]);
            }
        }
        NormalizedImage {
            width,
            height,
            data,
        }
    }

    /// Geometric step only: masks are never permuted or mean-shifted.
    pub fn normalize_mask(&self, mask: &GrayImage, target: Option<(u32, u32)>) -> GrayImage {
        match target {
            Some((h, w)) => crop_or_pad(mask, h, w, Luma([self.mask_pad_label])),
            None => mask.clone(),
        }
    }

    pub fn normalize_pair(
        &self,
        sample: &DecodedSample,
        target: Option<(u32, u32)>,
    ) -> (NormalizedImage, GrayImage) {
        (
            self.normalize_image(&sample.image, target),
            self.normalize_mask(&sample.mask, target),
        )
    }

    /// Raw RGB fill that lands on the configured post-normalization value.
    fn image_fill(&self) -> Rgb<f32> {
        match self.image_pad {
            ImagePad::Zero => Rgb([0.0; 3]),
            ImagePad::Mean => {
                let mut raw = [0.0f32; 3];
                for (k, &src) in NETWORK_CHANNEL_ORDER.iter().enumerate() {
                    raw[src] = self.mean_bgr[k];
                }
                Rgb(raw)
            }
        }
    }
}

/// Center crop-or-pad to `target_h` x `target_w`.
///
/// Oversized dimensions are cropped starting at `(size - target) / 2`; undersized ones
/// are placed at `(target - size) / 2` on a canvas filled with `fill`. A buffer that
/// already has the target size is returned unchanged.
pub fn crop_or_pad<P>(
    img: &ImageBuffer<P, Vec<P::Subpixel>>,
    target_h: u32,
    target_w: u32,
    fill: P,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
{
    let (w, h) = img.dimensions();
    if (w, h) == (target_w, target_h) {
        return img.clone();
    }
    let (src_x, dst_x, copy_w) = axis_window(w, target_w);
    let (src_y, dst_y, copy_h) = axis_window(h, target_h);
    let window = imageops::crop_imm(img, src_x, src_y, copy_w, copy_h).to_image();
    let mut canvas = ImageBuffer::from_pixel(target_w, target_h, fill);
    imageops::replace(&mut canvas, &window, i64::from(dst_x), i64::from(dst_y));
    canvas
}

/// (source offset, destination offset, copied length) along one axis.
fn axis_window(size: u32, target: u32) -> (u32, u32, u32) {
    if size >= target {
        ((size - target) / 2, 0, target)
    } else {
        (0, (target - size) / 2, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_example_pads_width_and_crops_height() {
        // 100 rows x 80 columns, every pixel tagged with its own coordinates.
        let img = ImageBuffer::from_fn(80, 100, |x, y| Luma([(x + 1000 * y) as f32]));
        let out = crop_or_pad(&img, 96, 96, Luma([-1.0]));
        assert_eq!(out.dimensions(), (96, 96));
        // 8 columns of padding on each side.
        assert_eq!(out.get_pixel(7, 0)[0], -1.0);
        assert_eq!(out.get_pixel(88, 0)[0], -1.0);
        // 2 rows cropped from the top, so output row 0 is source row 2, column 0.
        assert_eq!(out.get_pixel(8, 0)[0], 2000.0);
        assert_eq!(out.get_pixel(87, 95)[0], (79 + 1000 * 97) as f32);
    }

    #[test]
    fn target_sized_input_is_untouched() {
        let mask = GrayImage::from_fn(9, 5, |x, y| Luma([(x * 7 + y) as u8]));
        let out = crop_or_pad(&mask, 5, 9, Luma([0]));
        assert_eq!(out, mask);

        let norm = Normalizer::default();
        let once = norm.normalize_mask(&mask, Some((5, 9)));
        assert_eq!(norm.normalize_mask(&once, Some((5, 9))), once);
    }

    #[test]
    fn odd_padding_puts_extra_pixel_after() {
        let mask = GrayImage::from_pixel(2, 1, Luma([9]));
        let out = crop_or_pad(&mask, 1, 5, Luma([0]));
        let row: Vec<u8> = (0..5).map(|x| out.get_pixel(x, 0)[0]).collect();
        assert_eq!(row, vec![0, 9, 9, 0, 0]);
    }

    #[test]
    fn channels_are_reordered_then_mean_subtracted() {
        let img = Rgb32FImage::from_pixel(3, 3, Rgb([127.0, 127.0, 127.0]));
        let out = Normalizer::new([104.0, 116.7, 122.7]).normalize_image(&img, None);
        assert_eq!(out.dims_hw(), (3, 3));
        let px = out.pixel(1, 1);
        assert!((px[0] - (127.0 - 104.0)).abs() < 1e-4);
        assert!((px[1] - (127.0 - 116.7)).abs() < 1e-4);
        assert!((px[2] - (127.0 - 122.7)).abs() < 1e-4);

        let img = Rgb32FImage::from_pixel(1, 1, Rgb([10.0, 20.0, 30.0]));
        let out = Normalizer::new([1.0, 2.0, 3.0]).normalize_image(&img, None);
        assert_eq!(out.pixel(0, 0), [30.0 - 1.0, 20.0 - 2.0, 10.0 - 3.0]);
    }

    #[test]
    fn padding_fill_follows_image_pad() {
        let img = Rgb32FImage::from_pixel(1, 1, Rgb([50.0, 60.0, 70.0]));
        let zero = Normalizer::default().normalize_image(&img, Some((1, 3)));
        let mean = DEFAULT_MEAN_BGR;
        assert_eq!(zero.pixel(0, 0), [-mean[0], -mean[1], -mean[2]]);

        let centered = Normalizer::default()
            .with_image_pad(ImagePad::Mean)
            .normalize_image(&img, Some((1, 3)));
        assert_eq!(centered.pixel(0, 0), [0.0, 0.0, 0.0]);
        assert_eq!(centered.pixel(2, 0), [0.0, 0.0, 0.0]);
        assert_eq!(centered.pixel(1, 0), [70.0 - mean[0], 60.0 - mean[1], 50.0 - mean[2]]);
    }

    #[test]
    fn mask_padding_uses_configured_label() {
        let mask = GrayImage::from_pixel(2, 2, Luma([3]));
        let out = Normalizer::default()
            .with_mask_pad_label(255)
            .normalize_mask(&mask, Some((4, 4)));
        assert_eq!(out.get_pixel(0, 0)[0], 255);
        assert_eq!(out.get_pixel(1, 1)[0], 3);
        assert_eq!(out.get_pixel(2, 2)[0], 3);
        assert_eq!(out.get_pixel(3, 3)[0], 255);
    }

    #[test]
    fn normalization_is_deterministic() {
        let img = Rgb32FImage::from_fn(13, 7, |x, y| {
            Rgb([x as f32 * 3.0, y as f32 * 11.0, (x * y) as f32])
        });
        let norm = Normalizer::default();
        let a = norm.normalize_image(&img, Some((8, 8)));
        let b = norm.normalize_image(&img, Some((8, 8)));
        assert_eq!(a, b);
        let bits_a: Vec<u32> = a.data.iter().map(|v| v.to_bits()).collect();
        let bits_b: Vec<u32> = b.data.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits_a, bits_b);
    }
}
