//! Random-scale augmentation applied consistently to an image and its mask.

use crate::types::DecodedSample;
use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb32FImage};
use rand::{Rng, RngCore, SeedableRng};
use std::cmp::max;

/// Target dimensions for `scale`, rounded to the nearest pixel and never below 1.
pub fn scaled_dims(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let new_w = max(1, (width as f32 * scale).round() as u32);
    let new_h = max(1, (height as f32 * scale).round() as u32);
    (new_w, new_h)
}

/// Resize an image/mask pair by `scale`.
///
/// The image is resampled bilinearly. The mask only ever uses nearest-neighbor so
/// every output label already exists in the input mask.
pub fn scale_pair(image: &Rgb32FImage, mask: &GrayImage, scale: f32) -> (Rgb32FImage, GrayImage) {
    let (w, h) = image.dimensions();
    let (new_w, new_h) = scaled_dims(w, h, scale);
    // Float resampling clamps to the unit range.
    let unit = map_channels(image, |v| v / 255.0);
    let image = map_channels(
        &imageops::resize(&unit, new_w, new_h, FilterType::Triangle),
        |v| v * 255.0,
    );
    let mask = imageops::resize(mask, new_w, new_h, FilterType::Nearest);
    (image, mask)
}

fn map_channels(image: &Rgb32FImage, f: impl Fn(f32) -> f32) -> Rgb32FImage {
    let mut out = image.clone();
    for v in out.iter_mut() {
        *v = f(*v);
    }
    out
}

/// Draw one scale factor from `range` (inclusive) and rescale the sample with it.
pub fn random_scale(
    sample: DecodedSample,
    range: (f32, f32),
    rng: &mut dyn RngCore,
) -> DecodedSample {
    let (lo, hi) = range;
    let scale = rng.random_range(lo..=hi);
    let (image, mask) = scale_pair(&sample.image, &sample.mask, scale);
    DecodedSample { image, mask }
}

/// Per-sample RNG: reproducible from `(seed, epoch, index)` when seeded, thread-local otherwise.
pub(crate) fn sample_rng(seed: Option<u64>, epoch: u32, index: usize) -> Box<dyn RngCore> {
    match seed {
        Some(seed) => {
            let mixed = seed ^ (u64::from(epoch) << 32) ^ index as u64;
            Box::new(rand::rngs::StdRng::seed_from_u64(mixed))
        }
        None => Box::new(rand::rng()),
    }
}
