//! Pipeline configuration and validation.

use crate::types::{DatasetResult, SegDatasetError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_SCALE_RANGE: (f32, f32) = (0.75, 1.25);
pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Prefix joined to every manifest path.
    pub data_dir: PathBuf,
    /// Text file listing `image mask` pairs.
    pub manifest_path: PathBuf,
    /// Crop-or-pad every sample to this (height, width). None keeps source size.
    pub target_size: Option<(u32, u32)>,
    /// Random per-sample rescale before crop-or-pad. Requires `target_size`.
    pub random_scale: bool,
    /// New random permutation of the manifest every epoch.
    pub shuffle: bool,
    pub batch_size: usize,
    /// Decode/augment/normalize threads.
    pub workers: usize,
    /// Bound on processed samples buffered between workers and the assembler.
    pub queue_capacity: usize,
    /// Seed for reproducible shuffling and augmentation.
    pub seed: Option<u64>,
    /// Stop after this many passes over the manifest. None streams forever.
    pub num_epochs: Option<u32>,
    /// Inclusive range the random scale factor is drawn from.
    pub scale_range: (f32, f32),
}

impl PipelineConfig {
    pub fn new(data_dir: impl Into<PathBuf>, manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            manifest_path: manifest_path.into(),
            target_size: None,
            random_scale: false,
            shuffle: false,
            batch_size: 1,
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            seed: None,
            num_epochs: None,
            scale_range: DEFAULT_SCALE_RANGE,
        }
    }

    pub fn validate(&self) -> DatasetResult<()> {
        if self.batch_size == 0 {
            return Err(SegDatasetError::Config("batch_size must be > 0".into()));
        }
        if self.workers == 0 {
            return Err(SegDatasetError::Config("workers must be > 0".into()));
        }
        if self.queue_capacity == 0 {
            return Err(SegDatasetError::Config("queue_capacity must be > 0".into()));
        }
        if let Some((h, w)) = self.target_size {
            if h == 0 || w == 0 {
                return Err(SegDatasetError::Config(format!(
                    "target_size must be non-zero, got {h}x{w}"
                )));
            }
        }
        if self.random_scale && self.target_size.is_none() {
            return Err(SegDatasetError::Config(
                "random_scale requires target_size to be set".into(),
            ));
        }
        let (lo, hi) = self.scale_range;
        if !(lo.is_finite() && hi.is_finite()) || lo <= 0.0 || lo > hi {
            return Err(SegDatasetError::Config(format!(
                "scale_range must satisfy 0 < min <= max, got [{lo}, {hi}]"
            )));
        }
        if self.num_epochs == Some(0) {
            return Err(SegDatasetError::Config("num_epochs must be > 0".into()));
        }
        Ok(())
    }

    /// Whether the augmentation stage runs for this configuration.
    pub fn augments(&self) -> bool {
        self.random_scale && self.target_size.is_some()
    }

    pub fn describe(&self) -> String {
        let ts = self
            .target_size
            .map(|(h, w)| format!("{}x{}", h, w))
            .unwrap_or_else(|| "none".to_string());
        format!(
            "target_size={} random_scale={} range=[{:.2},{:.2}] shuffle={} batch_size={} workers={} queue={} epochs={} seed={}",
            ts,
            self.random_scale,
            self.scale_range.0,
            self.scale_range.1,
            self.shuffle,
            self.batch_size,
            self.workers,
            self.queue_capacity,
            self.num_epochs
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unbounded".to_string()),
            self.seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string())
        )
    }
}

/// Chained construction of a validated [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfigBuilder {
    inner: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new(data_dir: impl Into<PathBuf>, manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            inner: PipelineConfig::new(data_dir, manifest_path),
        }
    }
    pub fn target_size(mut self, size: Option<(u32, u32)>) -> Self {
        self.inner.target_size = size;
        self
    }
    pub fn random_scale(mut self, enabled: bool) -> Self {
        self.inner.random_scale = enabled;
        self
    }
    pub fn scale_range(mut self, min: f32, max: f32) -> Self {
        self.inner.scale_range = (min, max);
        self
    }
    pub fn shuffle(mut self, enabled: bool) -> Self {
        self.inner.shuffle = enabled;
        self
    }
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.inner.batch_size = batch_size;
        self
    }
    pub fn workers(mut self, workers: usize) -> Self {
        self.inner.workers = workers;
        self
    }
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.inner.queue_capacity = capacity;
        self
    }
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.inner.seed = seed;
        self
    }
    pub fn num_epochs(mut self, epochs: Option<u32>) -> Self {
        self.inner.num_epochs = epochs;
        self
    }
    pub fn build(self) -> DatasetResult<PipelineConfig> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}
