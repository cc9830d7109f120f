//! Decoding image/mask files into pixel buffers. No resizing happens here.

use crate::types::{DatasetResult, DecodedSample, Sample, SegDatasetError};
use image::{DynamicImage, GrayImage, ImageError, Luma, Rgb, Rgb32FImage};
use std::path::Path;

fn open(path: &Path, line: usize) -> DatasetResult<DynamicImage> {
    if !path.exists() {
        return Err(SegDatasetError::MissingFile {
            line,
            path: path.to_path_buf(),
        });
    }
    image::open(path).map_err(|e| match e {
        ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
            SegDatasetError::MissingFile {
                line,
                path: path.to_path_buf(),
            }
        }
        other => SegDatasetError::Decode {
            line,
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    })
}

/// Decode a 3-channel color image into RGB floats on the 0..=255 scale.
pub fn decode_image(path: &Path, line: usize) -> DatasetResult<Rgb32FImage> {
    let img = open(path, line)?;
    let channels = img.color().channel_count();
    if channels != 3 {
        return Err(SegDatasetError::Decode {
            line,
            path: path.to_path_buf(),
            reason: format!("expected 3 color channels, found {channels}"),
        });
    }
    let rgb = img.to_rgb8();
    Ok(Rgb32FImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let p = rgb.get_pixel(x, y);
        Rgb([f32::from(p[0]), f32::from(p[1]), f32::from(p[2])])
    }))
}

/// Decode a single-channel label mask.
///
/// 16-bit masks are accepted only when every class index fits in 8 bits.
pub fn decode_mask(path: &Path, line: usize) -> DatasetResult<GrayImage> {
    match open(path, line)? {
        DynamicImage::ImageLuma8(mask) => Ok(mask),
        DynamicImage::ImageLuma16(wide) => {
            if let Some(v) = wide.pixels().map(|p| p[0]).find(|v| *v > u16::from(u8::MAX)) {
                return Err(SegDatasetError::Decode {
                    line,
                    path: path.to_path_buf(),
                    reason: format!("16-bit mask holds label {v} which does not fit in 8 bits"),
                });
            }
            Ok(GrayImage::from_fn(wide.width(), wide.height(), |x, y| {
                Luma([wide.get_pixel(x, y)[0] as u8])
            }))
        }
        other => Err(SegDatasetError::Decode {
            line,
            path: path.to_path_buf(),
            reason: format!(
                "expected 1 label channel, found {} ({:?})",
                other.color().channel_count(),
                other.color()
            ),
        }),
    }
}

/// Decode both halves of a manifest sample.
///
/// The mask must cover the image pixel for pixel.
pub fn decode_sample(sample: &Sample) -> DatasetResult<DecodedSample> {
    let image = decode_image(&sample.image_path, sample.line)?;
    let mask = decode_mask(&sample.mask_path, sample.line)?;
    if image.dimensions() != mask.dimensions() {
        let (iw, ih) = image.dimensions();
        let (mw, mh) = mask.dimensions();
        return Err(SegDatasetError::Decode {
            line: sample.line,
            path: sample.mask_path.clone(),
            reason: format!("mask {mw}x{mh} differs from image {iw}x{ih}"),
        });
    }
    Ok(DecodedSample { image, mask })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{LumaA, Rgba, RgbaImage, RgbImage};

    #[test]
    fn rgb_image_decodes_to_float_scale() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("img.png");
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 10]));
        img.put_pixel(1, 0, Rgb([1, 2, 3]));
        img.save(&path).unwrap();

        let decoded = decode_image(&path, 1).unwrap();
        assert_eq!(decoded.dimensions(), (2, 1));
        assert_eq!(decoded.get_pixel(0, 0).0, [255.0, 0.0, 10.0]);
        assert_eq!(decoded.get_pixel(1, 0).0, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn rgba_image_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("img.png");
        RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]))
            .save(&path)
            .unwrap();
        let err = decode_image(&path, 7).unwrap_err();
        match err {
            SegDatasetError::Decode { line, reason, .. } => {
                assert_eq!(line, 7);
                assert!(reason.contains("found 4"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn color_mask_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mask.png");
        RgbImage::new(2, 2).save(&path).unwrap();
        assert!(matches!(
            decode_mask(&path, 3),
            Err(SegDatasetError::Decode { line: 3, .. })
        ));
    }

    #[test]
    fn mask_with_other_dimensions_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let image_path = tmp.path().join("img.png");
        let mask_path = tmp.path().join("mask.png");
        RgbImage::new(10, 10).save(&image_path).unwrap();
        GrayImage::from_pixel(6, 4, Luma([7])).save(&mask_path).unwrap();
        let sample = Sample {
            line: 5,
            image_path,
            mask_path: mask_path.clone(),
        };
        match decode_sample(&sample).unwrap_err() {
            SegDatasetError::Decode { line, path, reason } => {
                assert_eq!(line, 5);
                assert_eq!(path, mask_path);
                assert!(reason.contains("6x4"));
                assert!(reason.contains("10x10"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn gray_alpha_mask_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mask.png");
        image::ImageBuffer::from_pixel(2, 2, LumaA([1u8, 255]))
            .save(&path)
            .unwrap();
        assert!(decode_mask(&path, 1).is_err());
    }

    #[test]
    fn wide_mask_with_small_labels_is_narrowed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mask.png");
        image::ImageBuffer::from_pixel(3, 2, Luma([21u16]))
            .save(&path)
            .unwrap();
        let mask = decode_mask(&path, 1).unwrap();
        assert!(mask.pixels().all(|p| p[0] == 21));
    }

    #[test]
    fn wide_mask_with_large_labels_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mask.png");
        image::ImageBuffer::from_pixel(1, 1, Luma([300u16]))
            .save(&path)
            .unwrap();
        let err = decode_mask(&path, 1).unwrap_err();
        assert!(err.to_string().contains("300"));
    }

    #[test]
    fn missing_file_reports_line_and_path() {
        let sample = Sample {
            image_path: "/nonexistent/a.jpg".into(),
            mask_path: "/nonexistent/a.png".into(),
            line: 12,
        };
        match decode_sample(&sample).unwrap_err() {
            SegDatasetError::MissingFile { line, path } => {
                assert_eq!(line, 12);
                assert_eq!(path, Path::new("/nonexistent/a.jpg"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn corrupt_bytes_are_a_decode_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("img.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        assert!(matches!(
            decode_image(&path, 1),
            Err(SegDatasetError::Decode { .. })
        ));
    }
}
