use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::assets::backgrounds::BackgroundSource;
use crate::assets::source::{SourceHandle, SourceLoader};
use crate::batch::job::{
    BatchJob, BatchProgress, BatchState, CancellationToken, ItemSeeds, ResidencyGauge, item_seeds,
};
use crate::batch::sink::{CompositeResult, ResultSink};
use crate::config::transform::TransformConfig;
use crate::foundation::core::SourceId;
use crate::foundation::error::{StrataError, StrataResult};
use crate::plan::{TransformPlanner, TransformationPlan};
use crate::render::compositor::LayerCompositor;

/// Outcome of one item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// An output was produced (possibly degraded).
    Succeeded,
    /// The item was skipped; see [`ItemReport::error`].
    Failed,
}

/// Error detail carried by a failed report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    /// Error class (`decode`, `composition`, `timeout`, ...).
    pub kind: String,
    /// Human readable message.
    pub message: String,
}

impl From<&StrataError> for ItemError {
    fn from(e: &StrataError) -> Self {
        Self {
            kind: e.kind().to_owned(),
            message: e.to_string(),
        }
    }
}

/// Record emitted on the result stream for every processed item. Carries no pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemReport {
    /// Submission index.
    pub index: usize,
    /// Batch size.
    pub total: usize,
    /// Source identifier.
    pub source: SourceId,
    /// Succeeded or failed.
    pub status: ItemStatus,
    /// Where the sink stored the composite, if it reports locations.
    pub output: Option<PathBuf>,
    /// Plan applied to the item, when planning was reached.
    pub plan: Option<TransformationPlan>,
    /// A background layer was substituted.
    pub degraded: bool,
    /// Failure detail.
    pub error: Option<ItemError>,
    /// Counters after this item.
    pub progress: BatchProgress,
    /// Wall time spent on the item.
    pub elapsed_ms: u64,
}

impl ItemReport {
    /// `true` for [`ItemStatus::Succeeded`].
    pub fn succeeded(&self) -> bool {
        self.status == ItemStatus::Succeeded
    }
}

/// Item whose error stopped the batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalError {
    /// Submission index.
    pub index: usize,
    /// Source identifier.
    pub source: SourceId,
    /// Error detail.
    pub error: ItemError,
}

/// Final (or current) state of a batch stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Lifecycle state.
    pub state: BatchState,
    /// Counters; `processed` is the number of results completed before a stop.
    pub progress: BatchProgress,
    /// Set when the batch ended in [`BatchState::Failed`].
    pub fatal: Option<FatalError>,
    /// Highest number of source images held decoded at once.
    pub peak_residency: usize,
}

struct Persisted {
    output: Option<PathBuf>,
    degraded: bool,
}

struct Outcome {
    index: usize,
    source: SourceId,
    plan: Option<TransformationPlan>,
    result: StrataResult<Persisted>,
    elapsed: Duration,
}

enum Pending {
    Ready(Outcome),
    Waiting {
        index: usize,
        source: SourceId,
        rx: mpsc::Receiver<Outcome>,
    },
}

enum Executor {
    Inline,
    Pool(rayon::ThreadPool),
}

enum Stop {
    Cancelled,
    Failed,
}

#[derive(Clone)]
struct Worker {
    config: Arc<TransformConfig>,
    loader: Arc<dyn SourceLoader>,
    backgrounds: Arc<dyn BackgroundSource>,
    sink: Arc<dyn ResultSink>,
    gauge: ResidencyGauge,
}

impl Worker {
    #[tracing::instrument(skip_all, fields(index = index, source = %handle.id))]
    fn process(&self, index: usize, handle: &SourceHandle, seed: u64) -> Outcome {
        let started = Instant::now();
        let mut plan = None;
        let result = self.run_stages(index, handle, seed, started, &mut plan);
        Outcome {
            index,
            source: handle.id.clone(),
            plan,
            result,
            elapsed: started.elapsed(),
        }
    }

    fn run_stages(
        &self,
        index: usize,
        handle: &SourceHandle,
        seed: u64,
        started: Instant,
        plan_slot: &mut Option<TransformationPlan>,
    ) -> StrataResult<Persisted> {
        let deadline = self
            .config
            .item_timeout_ms
            .map(|ms| started + Duration::from_millis(ms));
        let mut rng = StdRng::seed_from_u64(seed);

        let resident = self.gauge.enter();
        let foreground = self.loader.load(handle)?;
        checkpoint(deadline, "decode")?;
        let plan: &TransformationPlan = plan_slot.insert(TransformPlanner::plan(
            &foreground,
            handle.category,
            &self.config,
            &mut rng,
        )?);
        let mut stack = LayerCompositor::begin(&foreground, plan, &self.config)?;
        drop(foreground);
        drop(resident);

        let candidates = self
            .backgrounds
            .candidates(index, TransformConfig::BACKGROUND_LAYERS, &mut rng);
        for candidate in &candidates {
            if !stack.needs_background() {
                break;
            }
            let _resident = self.gauge.enter();
            match self.loader.load(candidate) {
                Ok(background) => stack.add_background(&background)?,
                Err(err) => {
                    tracing::warn!(background = %candidate.id, %err, "skipping background");
                }
            }
        }
        checkpoint(deadline, "backgrounds")?;

        let output = stack.finish()?;
        checkpoint(deadline, "compose")?;

        let degraded = output.degraded;
        let result = CompositeResult {
            index,
            source: handle.id.clone(),
            output,
            plan: plan.clone(),
        };
        let output = self.sink.persist(&result)?;
        Ok(Persisted { output, degraded })
    }
}

fn checkpoint(deadline: Option<Instant>, stage: &str) -> StrataResult<()> {
    match deadline {
        Some(d) if Instant::now() > d => Err(StrataError::timeout(format!(
            "item budget exceeded after {stage}"
        ))),
        _ => Ok(()),
    }
}

fn build_thread_pool(threads: usize) -> StrataResult<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("strata-worker-{i}"))
        .panic_handler(|_| tracing::error!("batch worker panicked"))
        .build()
        .map_err(|e| {
            StrataError::resource_exhaustion(format!("failed to build rayon thread pool: {e}"))
        })
}

/// Runs [`BatchJob`]s.
pub struct BatchStreamProcessor;

impl BatchStreamProcessor {
    /// Validate the job and return its lazy result stream.
    ///
    /// Configuration errors and an unusable destination are reported here, before any item is
    /// touched. No item is processed until the stream is pulled.
    pub fn run(job: BatchJob) -> StrataResult<BatchStream> {
        job.config.validate()?;
        job.sink.prepare()?;

        let limit = job.config.concurrency_limit;
        let executor = if limit == 1 {
            Executor::Inline
        } else {
            Executor::Pool(build_thread_pool(limit)?)
        };
        let total = job.sources.len();

        Ok(BatchStream {
            sources: job.sources,
            worker: Worker {
                config: Arc::new(job.config),
                loader: job.loader,
                backgrounds: job.backgrounds,
                sink: job.sink,
                gauge: ResidencyGauge::default(),
            },
            executor,
            limit,
            seed: job.seed,
            seeds: item_seeds(job.seed),
            next_dispatch: 0,
            window: VecDeque::with_capacity(limit),
            cancel: job.cancel,
            state: BatchState::Idle,
            stop: None,
            progress: BatchProgress {
                total,
                ..BatchProgress::default()
            },
            fatal: None,
        })
    }
}

/// Lazy, ordered, finite stream of [`ItemReport`]s. Not restartable.
///
/// At most `concurrency_limit` items are dispatched and unreported at any time; reports come
/// out in submission order.
pub struct BatchStream {
    sources: Vec<SourceHandle>,
    worker: Worker,
    executor: Executor,
    limit: usize,
    seed: u64,
    seeds: ItemSeeds,
    next_dispatch: usize,
    window: VecDeque<Pending>,
    cancel: CancellationToken,
    state: BatchState,
    stop: Option<Stop>,
    progress: BatchProgress,
    fatal: Option<FatalError>,
}

impl BatchStream {
    /// Current lifecycle state.
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Counters so far.
    pub fn progress(&self) -> BatchProgress {
        self.progress
    }

    /// Residency gauge shared with the workers.
    pub fn gauge(&self) -> &ResidencyGauge {
        &self.worker.gauge
    }

    /// Token that stops this stream.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Snapshot of state, counters and the fatal item, if any.
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            state: self.state,
            progress: self.progress,
            fatal: self.fatal.clone(),
            peak_residency: self.worker.gauge.peak(),
        }
    }

    fn start(&mut self) {
        self.state = BatchState::Running;
        tracing::info!(
            total = self.progress.total,
            concurrency = self.limit,
            seed = self.seed,
            "batch started"
        );
    }

    fn fill_window(&mut self) {
        while self.stop.is_none()
            && self.window.len() < self.limit
            && self.next_dispatch < self.sources.len()
        {
            if self.cancel.is_cancelled() {
                tracing::info!(
                    dispatched = self.next_dispatch,
                    in_flight = self.window.len(),
                    "cancellation observed, draining"
                );
                self.stop = Some(Stop::Cancelled);
                break;
            }
            self.dispatch();
        }
    }

    fn dispatch(&mut self) {
        let index = self.next_dispatch;
        self.next_dispatch += 1;
        let seed = self.seeds.next().unwrap_or_default();
        let handle = self.sources[index].clone();

        match &self.executor {
            Executor::Inline => {
                let outcome = self.worker.process(index, &handle, seed);
                self.window.push_back(Pending::Ready(outcome));
            }
            Executor::Pool(pool) => {
                let (tx, rx) = mpsc::sync_channel(1);
                let worker = self.worker.clone();
                let source = handle.id.clone();
                pool.spawn(move || {
                    let outcome = worker.process(index, &handle, seed);
                    let _ = tx.send(outcome);
                });
                self.window.push_back(Pending::Waiting { index, source, rx });
            }
        }
    }

    fn resolve(pending: Pending) -> Outcome {
        match pending {
            Pending::Ready(outcome) => outcome,
            Pending::Waiting { index, source, rx } => rx.recv().unwrap_or_else(|_| Outcome {
                index,
                source,
                plan: None,
                result: Err(StrataError::Other(anyhow::anyhow!(
                    "worker for item {index} stopped without a result"
                ))),
                elapsed: Duration::ZERO,
            }),
        }
    }

    fn report(&mut self, outcome: Outcome) -> ItemReport {
        self.progress.processed += 1;
        let (status, output, degraded, error) = match outcome.result {
            Ok(done) => {
                self.progress.succeeded += 1;
                if done.degraded {
                    tracing::debug!(index = outcome.index, "degraded composite");
                }
                (ItemStatus::Succeeded, done.output, done.degraded, None)
            }
            Err(err) => {
                self.progress.failed += 1;
                tracing::warn!(
                    index = outcome.index,
                    source = %outcome.source,
                    %err,
                    "item failed"
                );
                let detail = ItemError::from(&err);
                if err.is_batch_fatal() && self.fatal.is_none() {
                    tracing::error!(index = outcome.index, %err, "batch-fatal error, stopping");
                    self.fatal = Some(FatalError {
                        index: outcome.index,
                        source: outcome.source.clone(),
                        error: detail.clone(),
                    });
                    self.stop = Some(Stop::Failed);
                }
                (ItemStatus::Failed, None, false, Some(detail))
            }
        };

        ItemReport {
            index: outcome.index,
            total: self.progress.total,
            source: outcome.source,
            status,
            output,
            plan: outcome.plan,
            degraded,
            error,
            progress: self.progress,
            elapsed_ms: u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    fn finish(&mut self) {
        self.state = match self.stop {
            None => BatchState::Completed,
            Some(Stop::Cancelled) => BatchState::Cancelled,
            Some(Stop::Failed) => BatchState::Failed,
        };
        if let Err(err) = self.worker.sink.finish() {
            tracing::warn!(%err, "result sink failed to finish");
        }
        tracing::info!(
            state = ?self.state,
            processed = self.progress.processed,
            succeeded = self.progress.succeeded,
            failed = self.progress.failed,
            total = self.progress.total,
            peak_residency = self.worker.gauge.peak(),
            "batch finished"
        );
    }
}

impl Iterator for BatchStream {
    type Item = ItemReport;

    fn next(&mut self) -> Option<ItemReport> {
        if self.state.is_terminal() {
            return None;
        }
        if self.state == BatchState::Idle {
            self.start();
        }
        self.fill_window();
        match self.window.pop_front() {
            Some(pending) => {
                let outcome = Self::resolve(pending);
                Some(self.report(outcome))
            }
            None => {
                self.finish();
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/batch/processor.rs"]
mod tests;
