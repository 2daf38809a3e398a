use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::assets::backgrounds::{BackgroundSource, SiblingBackgrounds};
use crate::assets::source::{DecodeLoader, SourceHandle, SourceLoader};
use crate::batch::sink::ResultSink;
use crate::config::transform::TransformConfig;

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Fresh, not-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// `true` once [`CancellationToken::cancel`] was called (or the flag was raised elsewhere).
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Underlying flag, for registration with signal handlers.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Lifecycle of a batch stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// Created, nothing pulled yet.
    Idle,
    /// Items are being processed.
    Running,
    /// Every item was processed.
    Completed,
    /// Stopped early on request.
    Cancelled,
    /// Stopped early on a batch-fatal error.
    Failed,
}

impl BatchState {
    /// `true` for `Completed`, `Cancelled` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Progress counters. Monotonically non-decreasing while a batch runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Items reported so far.
    pub processed: usize,
    /// Items that produced an output.
    pub succeeded: usize,
    /// Items that failed.
    pub failed: usize,
    /// Items submitted.
    pub total: usize,
}

/// Counts source images currently held decoded and remembers the peak.
///
/// Workers take a guard around every decode, foreground and background alike, and drop it
/// once the image has been resampled into its layer.
#[derive(Clone, Debug, Default)]
pub struct ResidencyGauge {
    inner: Arc<GaugeInner>,
}

#[derive(Debug, Default)]
struct GaugeInner {
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl ResidencyGauge {
    /// Mark one decoded image resident until the guard is dropped.
    pub fn enter(&self) -> ResidencyGuard {
        let now = self.inner.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);
        ResidencyGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Decoded images resident right now.
    pub fn live(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Highest simultaneous residency observed.
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }
}

/// Releases one unit of residency on drop.
#[derive(Debug)]
pub struct ResidencyGuard {
    inner: Arc<GaugeInner>,
}

impl Drop for ResidencyGuard {
    fn drop(&mut self) {
        self.inner.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Per-item seeds derived from a batch seed, in submission order.
///
/// Seeds are drawn at dispatch, so sequential and parallel runs hand every item the same seed.
#[derive(Clone, Debug)]
pub struct ItemSeeds(StdRng);

impl Iterator for ItemSeeds {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        Some(self.0.r#gen())
    }
}

/// Seed sequence for a batch seeded with `seed`.
pub fn item_seeds(seed: u64) -> ItemSeeds {
    ItemSeeds(StdRng::seed_from_u64(seed))
}

/// Everything needed to run one batch.
pub struct BatchJob {
    pub(crate) sources: Vec<SourceHandle>,
    pub(crate) config: TransformConfig,
    pub(crate) cancel: CancellationToken,
    pub(crate) seed: u64,
    pub(crate) loader: Arc<dyn SourceLoader>,
    pub(crate) backgrounds: Arc<dyn BackgroundSource>,
    pub(crate) sink: Arc<dyn ResultSink>,
}

impl BatchJob {
    /// Job over `sources` writing through `sink`.
    ///
    /// Defaults: seed 0, a fresh cancellation token, a [`DecodeLoader`] honoring
    /// `config.max_source_width`, and [`SiblingBackgrounds`] over the same sources.
    pub fn new(
        sources: Vec<SourceHandle>,
        config: TransformConfig,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        let loader = Arc::new(DecodeLoader::from_config(&config));
        let backgrounds = Arc::new(SiblingBackgrounds::new(sources.clone()));
        Self {
            sources,
            config,
            cancel: CancellationToken::new(),
            seed: 0,
            loader,
            backgrounds,
            sink,
        }
    }

    /// Seed for the job's random state.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Share an existing cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replace the source loader.
    pub fn with_loader(mut self, loader: Arc<dyn SourceLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Replace the background supplier.
    pub fn with_backgrounds(mut self, backgrounds: Arc<dyn BackgroundSource>) -> Self {
        self.backgrounds = backgrounds;
        self
    }

    /// Token that stops this job.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Number of submitted sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// `true` when no sources were submitted.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/batch/job.rs"]
mod tests;
