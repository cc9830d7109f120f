use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use seg_inference::prelude::*;
use seg_tools::common::ConfigArgs;
use seg_tools::{init_tracing, ToolConfig};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Segment a single image and save the colorized class mask"
)]
struct Args {
    /// Input RGB image.
    img_path: PathBuf,
    /// Checkpoint written by the training run.
    model_weights: PathBuf,
    /// Where to save the predicted mask (default from config, else ./output).
    #[arg(long)]
    save_dir: Option<PathBuf>,
    /// Number of classes the checkpoint predicts.
    #[arg(long, default_value_t = 21)]
    num_classes: usize,
    #[command(flatten)]
    config: ConfigArgs,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let tool_cfg = ToolConfig::load_or(args.config.config.as_deref())?;
    let mut options = tool_cfg.inference.clone();
    if let Some(dir) = args.save_dir {
        options.save_dir = dir;
    }

    let device = Default::default();
    let loader = BurnCheckpointLoader::<InferenceBackend>::new(
        AtrousHeadConfig {
            num_classes: args.num_classes,
            ..AtrousHeadConfig::default()
        },
        device,
    );
    let out = run_inference(
        &args.img_path,
        &args.model_weights,
        &options,
        &tool_cfg.normalizer,
        &loader,
        &VocPalette,
    )
    .with_context(|| format!("inference on {}", args.img_path.display()))?;
    println!("The output file has been saved to {}", out.display());
    Ok(())
}
