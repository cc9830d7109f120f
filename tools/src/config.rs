use std::path::{Path, PathBuf};

use anyhow::Context;
use seg_dataset::{ImagePad, Normalizer, PipelineConfig, DEFAULT_MEAN_BGR};
use seg_inference::InferenceOptions;
use serde::Deserialize;
use tracing::warn;

const DEFAULT_CONFIG_NAME: &str = "seg-tools.toml";
const CONFIG_ENV: &str = "SEG_TOOLS_CONFIG";

/// Everything the tools need: pipeline settings, the shared normalizer, and
/// where inference writes its output.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub pipeline: PipelineConfig,
    pub normalizer: Normalizer,
    pub inference: InferenceOptions,
}

impl Default for ToolConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("dataset");
        Self {
            pipeline: PipelineConfig::new(&data_dir, data_dir.join("train.txt")),
            normalizer: Normalizer::default(),
            inference: InferenceOptions::default(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ToolConfigFile {
    data_dir: Option<String>,
    manifest_path: Option<String>,
    target_size: Option<[u32; 2]>,
    random_scale: Option<bool>,
    shuffle: Option<bool>,
    batch_size: Option<usize>,
    workers: Option<usize>,
    queue_capacity: Option<usize>,
    seed: Option<u64>,
    num_epochs: Option<u32>,
    scale_range: Option<[f32; 2]>,
    normalization: Option<NormalizationSection>,
    inference: Option<InferenceSection>,
}

#[derive(Debug, Deserialize, Default)]
struct NormalizationSection {
    mean: Option<[f32; 3]>,
    image_pad: Option<ImagePad>,
    mask_pad_label: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct InferenceSection {
    save_dir: Option<String>,
    file_name: Option<String>,
}

impl ToolConfig {
    /// `$SEG_TOOLS_CONFIG` if set, else `seg-tools.toml` in the working directory,
    /// else defaults. A file that exists but does not parse is an error.
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_path(Path::new(&path));
        }
        let default_path = Path::new(DEFAULT_CONFIG_NAME);
        if default_path.exists() {
            return Self::from_path(default_path);
        }
        Ok(Self::default())
    }

    /// Load a specific file, or fall back to [`ToolConfig::load`].
    pub fn load_or(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::load(),
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read tools config {}", path.display()))?;
        let file: ToolConfigFile = toml::from_str(&raw)
            .with_context(|| format!("parse tools config {}", path.display()))?;
        let cfg = Self::from_file(file);
        cfg.warn_if_invalid();
        Ok(cfg)
    }

    fn from_file(file: ToolConfigFile) -> Self {
        let data_dir = file
            .data_dir
            .map(|v| expand_path(&v))
            .unwrap_or_else(|| PathBuf::from("dataset"));
        let manifest_path = file
            .manifest_path
            .map(|v| expand_path(&v))
            .unwrap_or_else(|| data_dir.join("train.txt"));

        let mut pipeline = PipelineConfig::new(data_dir, manifest_path);
        pipeline.target_size = file.target_size.map(|[h, w]| (h, w));
        pipeline.random_scale = file.random_scale.unwrap_or(false);
        pipeline.shuffle = file.shuffle.unwrap_or(false);
        pipeline.batch_size = file.batch_size.unwrap_or(pipeline.batch_size);
        pipeline.workers = file.workers.unwrap_or(pipeline.workers);
        pipeline.queue_capacity = file.queue_capacity.unwrap_or(pipeline.queue_capacity);
        pipeline.seed = file.seed;
        pipeline.num_epochs = file.num_epochs;
        if let Some([lo, hi]) = file.scale_range {
            pipeline.scale_range = (lo, hi);
        }

        let norm = file.normalization.unwrap_or_default();
        let mut normalizer = Normalizer::new(norm.mean.unwrap_or(DEFAULT_MEAN_BGR));
        if let Some(pad) = norm.image_pad {
            normalizer = normalizer.with_image_pad(pad);
        }
        if let Some(label) = norm.mask_pad_label {
            normalizer = normalizer.with_mask_pad_label(label);
        }

        let inf = file.inference.unwrap_or_default();
        let defaults = InferenceOptions::default();
        let inference = InferenceOptions {
            save_dir: inf
                .save_dir
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.save_dir),
            file_name: inf
                .file_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(defaults.file_name),
        };

        ToolConfig {
            pipeline,
            normalizer,
            inference,
        }
    }

    fn warn_if_invalid(&self) {
        if let Err(e) = self.pipeline.validate() {
            warn!("tools config: {e}");
        }
    }
}

pub(crate) fn expand_path(raw: &str) -> PathBuf {
    let mut out = raw.to_string();
    if let Some(stripped) = out.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            out = format!("{home}{stripped}");
        }
    }
    PathBuf::from(expand_env(&out))
}

fn expand_env(input: &str) -> String {
    let mut out = String::new();
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match std::env::var(key) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => out.push_str(&format!("${{{key}}}")),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
