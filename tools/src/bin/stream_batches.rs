use anyhow::Context;
use clap::Parser;
use std::time::Instant;
use tracing::info;

use seg_dataset::{BatchOutcome, SegPipeline};
use seg_tools::common::{ConfigArgs, PipelineArgs};
use seg_tools::{init_tracing, ToolConfig};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Stream image/mask batches from a manifest and report their shapes"
)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,
    #[command(flatten)]
    pipeline: PipelineArgs,
    /// Stop after this many batches (default: until the pipeline is exhausted).
    #[arg(long)]
    max_batches: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let tool_cfg = ToolConfig::load_or(args.config.config.as_deref())?;
    let mut cfg = tool_cfg.pipeline.clone();
    args.pipeline.apply(&mut cfg);
    if cfg.num_epochs.is_none() && args.max_batches.is_none() {
        anyhow::bail!("refusing to stream forever: pass --num-epochs or --max-batches");
    }

    let mut pipeline = SegPipeline::new(cfg, tool_cfg.normalizer)
        .context("build segmentation pipeline")?;
    let started = Instant::now();
    let mut batches = 0usize;
    let mut rows = 0usize;
    loop {
        if args.max_batches.is_some_and(|max| batches >= max) {
            pipeline.shutdown();
            break;
        }
        match pipeline.next_batch()? {
            BatchOutcome::Batch(batch) => {
                batches += 1;
                rows += batch.len();
                info!(
                    batch = batches,
                    shape = ?batch.image_shape(),
                    sources = ?batch.sources,
                    epochs = ?batch.epochs,
                    "batch"
                );
            }
            BatchOutcome::Cancelled => {
                info!("pipeline cancelled");
                break;
            }
            BatchOutcome::Exhausted => {
                info!("all epochs delivered");
                break;
            }
        }
    }
    let secs = started.elapsed().as_secs_f32().max(0.001);
    println!(
        "streamed {batches} batches ({rows} samples) in {secs:.2}s ({:.1} samples/s)",
        rows as f32 / secs
    );
    Ok(())
}
