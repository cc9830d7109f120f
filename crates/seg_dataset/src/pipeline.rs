//! Worker pool streaming processed samples into assembled batches.
//!
//! Workers pull tickets from a shared [`EpochSequencer`], run decode -> augment ->
//! normalize on their own thread, and push results into a bounded channel. The
//! consuming thread blocks in [`SegPipeline::next_batch`] until a full batch is
//! available, the pipeline is cancelled, or a finite number of epochs runs out.
//!
//! Cancellation is only observed between samples. A worker that is decoding when the
//! stop signal arrives finishes that sample and then exits without queuing it.

use crate::aug::{random_scale, sample_rng};
use crate::batch::{BatchAssembler, SegBatch};
use crate::cancel::CancellationToken;
use crate::config::PipelineConfig;
use crate::decode::decode_sample;
use crate::manifest::Manifest;
use crate::normalize::Normalizer;
use crate::sequencer::{EpochSequencer, SharedSequencer, Ticket};
use crate::types::{DatasetResult, ProcessedSample, SegDatasetError};
use crossbeam_channel::{bounded, select_biased, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub(crate) const DEFAULT_LOG_EVERY_SAMPLES: usize = 1000;

/// Pipeline lifecycle. There is no transition back to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed, no batch requested yet.
    Init,
    Running,
    /// Stop requested, some workers still finishing their current sample.
    Stopping,
    Stopped,
}

/// Result of one [`SegPipeline::next_batch`] call.
#[derive(Debug)]
pub enum BatchOutcome {
    Batch(SegBatch),
    /// The pipeline was stopped; any partially assembled batch was dropped.
    Cancelled,
    /// Every configured epoch has been delivered. A trailing partial batch is dropped.
    Exhausted,
}

impl BatchOutcome {
    pub fn into_batch(self) -> Option<SegBatch> {
        match self {
            BatchOutcome::Batch(batch) => Some(batch),
            _ => None,
        }
    }
}

type WorkerMessage = DatasetResult<ProcessedSample>;

/// Read-only state shared by every worker.
struct WorkerContext {
    manifest: Arc<Manifest>,
    sequencer: SharedSequencer,
    normalizer: Normalizer,
    target_size: Option<(u32, u32)>,
    scale_range: Option<(f32, f32)>,
    seed: Option<u64>,
}

impl WorkerContext {
    fn process(&self, ticket: Ticket) -> WorkerMessage {
        let sample = &self.manifest.samples()[ticket.index];
        let mut decoded = decode_sample(sample)?;
        if let Some(range) = self.scale_range {
            let mut rng = sample_rng(self.seed, ticket.epoch, ticket.index);
            decoded = random_scale(decoded, range, rng.as_mut());
        }
        let (image, mask) = self.normalizer.normalize_pair(&decoded, self.target_size);
        Ok(ProcessedSample {
            index: ticket.index,
            epoch: ticket.epoch,
            image,
            mask,
        })
    }
}

/// Decrements the live-worker count however the worker thread exits.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn run_worker(
    id: usize,
    ctx: Arc<WorkerContext>,
    tx: Sender<WorkerMessage>,
    token: CancellationToken,
    _guard: ActiveGuard,
) {
    let mut processed = 0usize;
    info!(worker = id, "worker started");
    loop {
        if token.is_cancelled() {
            break;
        }
        let Some(ticket) = ctx.sequencer.pull() else {
            debug!(worker = id, processed, "sequence exhausted");
            break;
        };
        let result = ctx.process(ticket);
        let failed = result.is_err();
        if let Err(e) = &result {
            warn!(
                worker = id,
                epoch = ticket.epoch,
                index = ticket.index,
                error = %e,
                "sample failed; epoch degraded"
            );
        }
        if token.is_cancelled() {
            break;
        }
        // Stop wins over a ready send.
        select_biased! {
            recv(token.signal()) -> _ => break,
            send(tx, result) -> sent => {
                if sent.is_err() {
                    // Consumer went away.
                    break;
                }
            }
        }
        processed += 1;
        if failed {
            break;
        }
    }
    info!(worker = id, processed, "worker stopped");
}

fn log_every_from_env() -> Option<usize> {
    parse_log_every(std::env::var("SEG_DATASET_LOG_EVERY").ok().as_deref())
}

fn parse_log_every(raw: Option<&str>) -> Option<usize> {
    match raw {
        Some(val) => {
            if val.eq_ignore_ascii_case("off") || val.trim() == "0" {
                None
            } else {
                val.trim().parse::<usize>().ok().filter(|v| *v > 0)
            }
        }
        None => Some(DEFAULT_LOG_EVERY_SAMPLES),
    }
}

/// Streaming image/mask batch source.
pub struct SegPipeline {
    config: PipelineConfig,
    normalizer: Normalizer,
    manifest: Arc<Manifest>,
    token: CancellationToken,
    active: Arc<AtomicUsize>,
    rx: Option<Receiver<WorkerMessage>>,
    workers: Vec<JoinHandle<()>>,
    assembler: BatchAssembler,
    started: bool,
    exhausted: bool,
    processed_samples: usize,
    processed_batches: usize,
    started_at: Instant,
    last_logged_samples: usize,
    last_log: Instant,
    log_every_samples: Option<usize>,
}

impl SegPipeline {
    /// Load the manifest named by `config` and prepare (but do not start) the workers.
    pub fn new(config: PipelineConfig, normalizer: Normalizer) -> DatasetResult<Self> {
        config.validate()?;
        let manifest = Manifest::load(&config.data_dir, &config.manifest_path)?;
        Self::from_manifest(config, normalizer, manifest)
    }

    pub fn from_manifest(
        config: PipelineConfig,
        normalizer: Normalizer,
        manifest: Manifest,
    ) -> DatasetResult<Self> {
        config.validate()?;
        if manifest.is_empty() {
            return Err(SegDatasetError::EmptyManifest {
                path: manifest.source().to_path_buf(),
            });
        }
        info!(
            manifest = %manifest.source().display(),
            samples = manifest.len(),
            "{}",
            config.describe()
        );
        let now = Instant::now();
        Ok(Self {
            assembler: BatchAssembler::new(config.batch_size),
            config,
            normalizer,
            manifest: Arc::new(manifest),
            token: CancellationToken::new(),
            active: Arc::new(AtomicUsize::new(0)),
            rx: None,
            workers: Vec::new(),
            started: false,
            exhausted: false,
            processed_samples: 0,
            processed_batches: 0,
            started_at: now,
            last_logged_samples: 0,
            last_log: now,
            log_every_samples: log_every_from_env(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Token that stops this pipeline when cancelled. Safe to move to other threads.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn state(&self) -> PipelineState {
        let live = self.active.load(Ordering::SeqCst);
        if self.token.is_cancelled() || self.exhausted {
            if live > 0 {
                PipelineState::Stopping
            } else {
                PipelineState::Stopped
            }
        } else if self.started {
            PipelineState::Running
        } else {
            PipelineState::Init
        }
    }

    /// Block until a full batch is available.
    ///
    /// The first call starts the worker pool. A per-sample error is returned once and
    /// stops the pipeline; every later call reports [`BatchOutcome::Cancelled`].
    pub fn next_batch(&mut self) -> DatasetResult<BatchOutcome> {
        if self.token.is_cancelled() {
            self.assembler.discard();
            return Ok(BatchOutcome::Cancelled);
        }
        if self.exhausted {
            return Ok(BatchOutcome::Exhausted);
        }
        self.ensure_started()?;
        let Some(rx) = self.rx.clone() else {
            return Ok(BatchOutcome::Exhausted);
        };
        let signal = self.token.signal().clone();
        let t_wait = Instant::now();
        while !self.assembler.is_full() {
            if self.token.is_cancelled() {
                return Ok(self.cancelled());
            }
            let msg = select_biased! {
                recv(signal) -> _ => return Ok(self.cancelled()),
                recv(rx) -> msg => msg,
            };
            match msg {
                Ok(Ok(sample)) => {
                    if let Err(e) = self.assembler.push(sample) {
                        return Err(self.fail(e));
                    }
                }
                Ok(Err(e)) => return Err(self.fail(e)),
                Err(_) => return self.workers_finished(),
            }
        }
        if self.token.is_cancelled() {
            return Ok(self.cancelled());
        }
        let Some(batch) = self.assembler.finish() else {
            return Ok(BatchOutcome::Cancelled);
        };
        self.processed_batches += 1;
        self.processed_samples += batch.len();
        debug!(
            batch = self.processed_batches,
            rows = batch.len(),
            height = batch.height,
            width = batch.width,
            wait_ms = t_wait.elapsed().as_secs_f64() * 1000.0,
            "batch assembled"
        );
        self.maybe_log_progress();
        Ok(BatchOutcome::Batch(batch))
    }

    /// Iterate over batches until the pipeline is cancelled or exhausted.
    pub fn batches(&mut self) -> Batches<'_> {
        Batches { pipeline: self }
    }

    /// Stop the workers and wait for all of them to exit.
    pub fn shutdown(&mut self) {
        self.token.cancel();
        self.rx = None;
        self.join_workers();
    }

    fn ensure_started(&mut self) -> DatasetResult<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        let scale_range = self
            .config
            .augments()
            .then_some(self.config.scale_range);
        let ctx = Arc::new(WorkerContext {
            manifest: Arc::clone(&self.manifest),
            sequencer: SharedSequencer::new(EpochSequencer::new(
                self.manifest.len(),
                self.config.shuffle,
                self.config.seed,
                self.config.num_epochs,
            )),
            normalizer: self.normalizer,
            target_size: self.config.target_size,
            scale_range,
            seed: self.config.seed,
        });
        let (tx, rx) = bounded(self.config.queue_capacity);
        for id in 0..self.config.workers {
            let ctx = Arc::clone(&ctx);
            let tx = tx.clone();
            let token = self.token.clone();
            self.active.fetch_add(1, Ordering::SeqCst);
            let guard = ActiveGuard(Arc::clone(&self.active));
            let handle = thread::Builder::new()
                .name(format!("seg-worker-{id}"))
                .spawn(move || run_worker(id, ctx, tx, token, guard));
            match handle {
                Ok(handle) => self.workers.push(handle),
                Err(e) => {
                    // The guard moved into the failed closure and was dropped with it.
                    self.token.cancel();
                    self.join_workers();
                    return Err(SegDatasetError::Spawn(e));
                }
            }
        }
        self.rx = Some(rx);
        info!(workers = self.config.workers, "pipeline started");
        Ok(())
    }

    fn cancelled(&mut self) -> BatchOutcome {
        let dropped = self.assembler.discard();
        if dropped > 0 {
            debug!(dropped, "discarded partial batch on cancel");
        }
        BatchOutcome::Cancelled
    }

    fn fail(&mut self, err: SegDatasetError) -> SegDatasetError {
        error!(error = %err, "sample failed; stopping pipeline");
        self.token.cancel();
        self.assembler.discard();
        err
    }

    /// Every sender is gone: either the epochs ran out or a worker died.
    fn workers_finished(&mut self) -> DatasetResult<BatchOutcome> {
        self.rx = None;
        let panicked = self.join_workers();
        if let Some(id) = panicked {
            self.token.cancel();
            self.assembler.discard();
            return Err(SegDatasetError::WorkerPanicked(id));
        }
        self.exhausted = true;
        let dropped = self.assembler.discard();
        info!(
            batches = self.processed_batches,
            samples = self.processed_samples,
            dropped_tail = dropped,
            "all epochs delivered"
        );
        Ok(BatchOutcome::Exhausted)
    }

    /// Join every worker, returning the id of the first that panicked.
    fn join_workers(&mut self) -> Option<usize> {
        let mut panicked = None;
        for (id, handle) in self.workers.drain(..).enumerate() {
            if handle.join().is_err() {
                warn!(worker = id, "pipeline worker panicked");
                panicked.get_or_insert(id);
            }
        }
        panicked
    }

    fn maybe_log_progress(&mut self) {
        let Some(threshold) = self.log_every_samples else {
            return;
        };
        let since = self
            .processed_samples
            .saturating_sub(self.last_logged_samples);
        if since < threshold && self.last_log.elapsed() < Duration::from_secs(30) {
            return;
        }
        let secs = self.started_at.elapsed().as_secs_f32().max(0.001);
        info!(
            batches = self.processed_batches,
            samples = self.processed_samples,
            elapsed_s = secs,
            rate = self.processed_samples as f32 / secs,
            "[dataset] progress"
        );
        self.last_logged_samples = self.processed_samples;
        self.last_log = Instant::now();
    }
}

impl Drop for SegPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Iterator returned by [`SegPipeline::batches`].
pub struct Batches<'a> {
    pipeline: &'a mut SegPipeline,
}

impl Iterator for Batches<'_> {
    type Item = DatasetResult<SegBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.pipeline.next_batch() {
            Ok(BatchOutcome::Batch(batch)) => Some(Ok(batch)),
            Ok(BatchOutcome::Cancelled | BatchOutcome::Exhausted) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
