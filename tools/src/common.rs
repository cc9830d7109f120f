use clap::Args;
use seg_dataset::PipelineConfig;
use std::path::PathBuf;

/// Parse `HxW` (or a single `N` for a square) into (height, width).
pub fn parse_size(raw: &str) -> Result<(u32, u32), String> {
    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid size component {s:?}: {e}"))
    };
    match raw.split_once(['x', 'X', ',']) {
        Some((h, w)) => Ok((parse(h)?, parse(w)?)),
        None => {
            let n = parse(raw)?;
            Ok((n, n))
        }
    }
}

/// Path to a TOML tools config; falls back to `$SEG_TOOLS_CONFIG` / `seg-tools.toml`.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Command-line overrides for the pipeline section of the tools config.
#[derive(Debug, Clone, Default, Args)]
pub struct PipelineArgs {
    /// Directory every manifest path is joined onto.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Manifest listing `image mask` pairs.
    #[arg(long)]
    pub manifest: Option<PathBuf>,
    /// Crop-or-pad every sample to HxW.
    #[arg(long, value_parser = parse_size)]
    pub target_size: Option<(u32, u32)>,
    #[arg(long, default_value_t = false)]
    pub random_scale: bool,
    #[arg(long, default_value_t = false)]
    pub shuffle: bool,
    #[arg(long)]
    pub batch_size: Option<usize>,
    #[arg(long)]
    pub workers: Option<usize>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Stop after this many epochs (default: stream until interrupted).
    #[arg(long)]
    pub num_epochs: Option<u32>,
}

impl PipelineArgs {
    /// Flags win over the config file; switches can only turn features on.
    pub fn apply(&self, cfg: &mut PipelineConfig) {
        if let Some(dir) = &self.data_dir {
            cfg.data_dir = dir.clone();
        }
        if let Some(manifest) = &self.manifest {
            cfg.manifest_path = manifest.clone();
        }
        if self.target_size.is_some() {
            cfg.target_size = self.target_size;
        }
        cfg.random_scale |= self.random_scale;
        cfg.shuffle |= self.shuffle;
        if let Some(n) = self.batch_size {
            cfg.batch_size = n;
        }
        if let Some(n) = self.workers {
            cfg.workers = n;
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        if self.num_epochs.is_some() {
            cfg.num_epochs = self.num_epochs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_parse_in_height_width_order() {
        assert_eq!(parse_size("321x257"), Ok((321, 257)));
        assert_eq!(parse_size("64"), Ok((64, 64)));
        assert_eq!(parse_size("10,20"), Ok((10, 20)));
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn flags_override_config_values() {
        let mut cfg = PipelineConfig::new("/d", "/d/train.txt");
        cfg.shuffle = true;
        let args = PipelineArgs {
            manifest: Some(PathBuf::from("/d/val.txt")),
            batch_size: Some(4),
            target_size: Some((8, 9)),
            ..PipelineArgs::default()
        };
        args.apply(&mut cfg);
        assert_eq!(cfg.manifest_path, PathBuf::from("/d/val.txt"));
        assert_eq!(cfg.batch_size, 4);
        assert_eq!(cfg.target_size, Some((8, 9)));
        assert!(cfg.shuffle);
    }
}
