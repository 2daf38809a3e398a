use std::sync::Arc;

use rand::RngCore;
use rand::seq::index;

use crate::assets::source::SourceHandle;

/// Nominates background candidates for one work item.
///
/// Candidates are handles, not pixels: the worker decodes them one at a time and skips those
/// that fail, so at most one background is held decoded per item. When fewer than `count`
/// candidates decode, the compositor applies its missing-background policy.
pub trait BackgroundSource: Send + Sync {
    /// Candidates for the `count` background layers of the item at `index`, in trial order.
    fn candidates(&self, index: usize, count: usize, rng: &mut dyn RngCore) -> Vec<SourceHandle>;
}

/// Picks backgrounds at random from the other sources of the same batch.
#[derive(Clone, Debug)]
pub struct SiblingBackgrounds {
    handles: Arc<[SourceHandle]>,
    max_attempts_per_layer: usize,
}

impl SiblingBackgrounds {
    /// Backgrounds drawn from `handles`, normally the batch's own sources.
    pub fn new(handles: impl Into<Arc<[SourceHandle]>>) -> Self {
        Self {
            handles: handles.into(),
            max_attempts_per_layer: 3,
        }
    }

    /// Number of sibling candidates nominated per requested layer.
    pub fn with_max_attempts_per_layer(mut self, attempts: usize) -> Self {
        self.max_attempts_per_layer = attempts.max(1);
        self
    }
}

impl BackgroundSource for SiblingBackgrounds {
    fn candidates(&self, index: usize, count: usize, rng: &mut dyn RngCore) -> Vec<SourceHandle> {
        let others = self
            .handles
            .len()
            .saturating_sub(usize::from(index < self.handles.len()));
        let attempts = count.saturating_mul(self.max_attempts_per_layer).min(others);
        if count == 0 || attempts == 0 {
            return Vec::new();
        }

        index::sample(rng, others, attempts)
            .into_iter()
            // Skip over the current item.
            .map(|j| if j >= index { j + 1 } else { j })
            .filter_map(|k| self.handles.get(k).cloned())
            .collect()
    }
}

/// Serves backgrounds from a fixed pool of sources shared by every item.
#[derive(Clone, Debug, Default)]
pub struct StaticBackgrounds {
    pool: Vec<SourceHandle>,
}

impl StaticBackgrounds {
    /// Pool of candidate sources.
    pub fn new(pool: Vec<SourceHandle>) -> Self {
        Self { pool }
    }

    /// Pool with no images; every item gets the missing-background treatment.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl BackgroundSource for StaticBackgrounds {
    fn candidates(&self, _index: usize, count: usize, rng: &mut dyn RngCore) -> Vec<SourceHandle> {
        let n = count.min(self.pool.len());
        if n == 0 {
            return Vec::new();
        }
        index::sample(rng, self.pool.len(), n)
            .into_iter()
            .map(|i| self.pool[i].clone())
            .collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/backgrounds.rs"]
mod tests;
