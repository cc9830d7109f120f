//! Inference entry point against real files, including parity with the batch pipeline.

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use image::{GrayImage, Luma, Rgb, RgbImage};
use seg_dataset::{
    BatchOutcome, ImagePad, NormalizedImage, Normalizer, PipelineConfigBuilder, SegPipeline,
};
use seg_inference::{
    run_inference, AtrousHead, AtrousHeadConfig, BurnCheckpointLoader, ClassMap, InferenceBackend,
    InferenceError, InferenceOptions, InferenceResult, LabelColorizer, Segmenter,
    SegmenterLoader, VocPalette, VOC_COLORS,
};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Records the network input and labels every pixel with `class`.
struct RecordingSegmenter {
    seen: Arc<Mutex<Option<NormalizedImage>>>,
    class: u32,
}

impl Segmenter for RecordingSegmenter {
    fn num_classes(&self) -> usize {
        VOC_COLORS.len()
    }

    fn segment(&mut self, image: &NormalizedImage) -> InferenceResult<ClassMap> {
        *self.seen.lock().unwrap() = Some(image.clone());
        ClassMap::new(
            image.width,
            image.height,
            vec![self.class; (image.width * image.height) as usize],
        )
    }
}

struct RecordingLoader {
    seen: Arc<Mutex<Option<NormalizedImage>>>,
    class: u32,
}

impl RecordingLoader {
    fn new(class: u32) -> Self {
        Self {
            seen: Arc::new(Mutex::new(None)),
            class,
        }
    }
}

impl SegmenterLoader for RecordingLoader {
    type Segmenter = RecordingSegmenter;

    fn load(&self, _weights: &Path) -> InferenceResult<RecordingSegmenter> {
        Ok(RecordingSegmenter {
            seen: Arc::clone(&self.seen),
            class: self.class,
        })
    }
}

struct FailingLoader;

impl SegmenterLoader for FailingLoader {
    type Segmenter = RecordingSegmenter;

    fn load(&self, weights: &Path) -> InferenceResult<RecordingSegmenter> {
        Err(InferenceError::WeightLoad {
            path: weights.to_path_buf(),
            reason: "corrupt".to_string(),
        })
    }
}

fn gradient_image(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([(x * 17 % 256) as u8, (y * 29 % 256) as u8, ((x + y) * 7 % 256) as u8])
    })
}

#[test]
fn inference_input_matches_pipeline_batch_bit_for_bit() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    let image_path = root.join("photo.png");
    gradient_image(9, 6).save(&image_path)?;
    GrayImage::from_pixel(9, 6, Luma([1])).save(root.join("photo_mask.png"))?;
    let manifest = root.join("val.txt");
    fs::write(&manifest, "/photo.png /photo_mask.png\n")?;

    // One value shared by both paths.
    let normalizer = Normalizer::default().with_image_pad(ImagePad::Mean);

    let cfg = PipelineConfigBuilder::new(root, &manifest)
        .batch_size(1)
        .workers(1)
        .num_epochs(Some(1))
        .build()?;
    let mut pipeline = SegPipeline::new(cfg, normalizer)?;
    let batch = match pipeline.next_batch()? {
        BatchOutcome::Batch(batch) => batch,
        other => panic!("expected a batch, got {other:?}"),
    };

    let loader = RecordingLoader::new(0);
    let options = InferenceOptions {
        save_dir: root.join("out"),
        ..InferenceOptions::default()
    };
    run_inference(
        &image_path,
        Path::new("unused.bin"),
        &options,
        &normalizer,
        &loader,
        &VocPalette,
    )?;
    let seen = loader.seen.lock().unwrap().clone().expect("segmenter was called");

    assert_eq!(seen.dims_hw(), (batch.height, batch.width));
    let pipeline_bits: Vec<u32> = batch.image(0).iter().map(|v| v.to_bits()).collect();
    let inference_bits: Vec<u32> = seen.as_slice().iter().map(|v| v.to_bits()).collect();
    assert_eq!(pipeline_bits, inference_bits);
    Ok(())
}

#[test]
fn mask_is_written_to_save_dir_with_default_name() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let image_path = tmp.path().join("in.png");
    gradient_image(5, 4).save(&image_path)?;
    let options = InferenceOptions {
        save_dir: tmp.path().join("nested/output"),
        ..InferenceOptions::default()
    };

    let out = run_inference(
        &image_path,
        Path::new("weights.bin"),
        &options,
        &Normalizer::default(),
        &RecordingLoader::new(15),
        &VocPalette,
    )?;
    assert_eq!(out, tmp.path().join("nested/output/mask.png"));
    let saved = image::open(&out)?.to_rgb8();
    assert_eq!(saved.dimensions(), (5, 4));
    assert!(saved.pixels().all(|p| p.0 == VOC_COLORS[15]));
    assert_eq!(fs::read_dir(tmp.path().join("nested/output"))?.count(), 1);
    Ok(())
}

#[test]
fn weight_failure_aborts_before_reading_the_image() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let options = InferenceOptions {
        save_dir: tmp.path().join("out"),
        ..InferenceOptions::default()
    };
    let err = run_inference(
        Path::new("/nonexistent/photo.jpg"),
        Path::new("/nonexistent/model.bin"),
        &options,
        &Normalizer::default(),
        &FailingLoader,
        &VocPalette,
    )
    .unwrap_err();
    assert!(matches!(err, InferenceError::WeightLoad { .. }));
    assert!(!options.save_dir.exists());
    Ok(())
}

#[test]
fn out_of_range_classes_are_rejected() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let image_path = tmp.path().join("in.png");
    gradient_image(3, 3).save(&image_path)?;
    let options = InferenceOptions {
        save_dir: tmp.path().join("out"),
        ..InferenceOptions::default()
    };
    let err = run_inference(
        &image_path,
        Path::new("w.bin"),
        &options,
        &Normalizer::default(),
        &RecordingLoader::new(40),
        &VocPalette,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        InferenceError::ClassOutOfRange {
            class: 40,
            num_classes: 21
        }
    ));
    assert!(!options.output_path().exists());
    Ok(())
}

#[test]
fn missing_image_is_reported_by_path() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let err = run_inference(
        &tmp.path().join("absent.jpg"),
        Path::new("w.bin"),
        &InferenceOptions {
            save_dir: tmp.path().join("out"),
            ..InferenceOptions::default()
        },
        &Normalizer::default(),
        &RecordingLoader::new(0),
        &VocPalette,
    )
    .unwrap_err();
    match err {
        InferenceError::MissingImage(path) => assert!(path.ends_with("absent.jpg")),
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[test]
fn burn_checkpoint_runs_end_to_end() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let image_path = tmp.path().join("in.png");
    gradient_image(6, 5).save(&image_path)?;

    let device = Default::default();
    let cfg = AtrousHeadConfig {
        num_classes: 21,
        hidden: 4,
        dilation: 2,
    };
    let weights = tmp.path().join("atrous");
    AtrousHead::<InferenceBackend>::new(cfg.clone(), &device)
        .save_file(&weights, &BinFileRecorder::<FullPrecisionSettings>::new())
        .map_err(|e| anyhow::anyhow!("save checkpoint: {e:?}"))?;

    let loader = BurnCheckpointLoader::<InferenceBackend>::new(cfg, device);
    let options = InferenceOptions {
        save_dir: tmp.path().join("out"),
        ..InferenceOptions::default()
    };
    let out = run_inference(
        &image_path,
        &weights,
        &options,
        &Normalizer::default(),
        &loader,
        &VocPalette,
    )?;
    let saved = image::open(&out)?.to_rgb8();
    assert_eq!(saved.dimensions(), (6, 5));
    assert!(saved.pixels().all(|p| VOC_COLORS.contains(&p.0)));
    assert_eq!(VocPalette.num_classes(), 21);
    Ok(())
}
