use anyhow::{ensure, Result};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

/// A `Sampler` decides the order in which dataset indices are visited.
///
/// `iter(epoch)` must be deterministic for a given sampler and epoch, so the
/// loader can reproduce an epoch from its seed alone.
pub trait Sampler: Send + Sync {
    type Item: Send + Sync;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send + '_>;
}

/// ============================================================================
/// Yields `0, 1, ..., dataset_size - 1` every epoch.
#[derive(Debug, Clone)]
pub struct SequentialSampler {
    dataset_size: usize,
}

impl SequentialSampler {
    pub fn new(dataset_size: usize) -> Self {
        Self { dataset_size }
    }
}

impl Sampler for SequentialSampler {
    type Item = usize;

    fn iter(&self, _epoch: usize) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        Box::new(0..self.dataset_size)
    }
}

/// ============================================================================
/// A fresh permutation of `0..dataset_size` per epoch.
///
/// The permutation for epoch `e` is drawn from an RNG seeded with
/// `base_seed + e`: identical for the same seed and epoch, different across
/// epochs.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    dataset_size: usize,
    base_seed: u64,
}

impl RandomSampler {
    pub fn new(dataset_size: usize, base_seed: u64) -> Self {
        Self {
            dataset_size,
            base_seed,
        }
    }
}

impl Sampler for RandomSampler {
    type Item = usize;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        let mut rng = StdRng::seed_from_u64(self.base_seed.wrapping_add(epoch as u64));
        let mut indices: Vec<usize> = (0..self.dataset_size).collect();
        indices.shuffle(&mut rng);
        Box::new(indices.into_iter())
    }
}

/// ============================================================================
/// Groups the items of an inner sampler into batches of `batch_size`.
///
/// The final batch may be shorter unless `drop_last` is set, in which case it
/// is discarded.
///
/// # Example
/// ```ignore
/// let batches = BatchSampler::new(SequentialSampler::new(5), 2, false)?;
/// let all: Vec<_> = batches.iter(0).collect();
/// assert_eq!(all, vec![vec![0, 1], vec![2, 3], vec![4]]);
/// ```
pub struct BatchSampler<S> {
    sampler: S,
    batch_size: usize,
    drop_last: bool,
}

impl<S: Sampler> BatchSampler<S> {
    pub fn new(sampler: S, batch_size: usize, drop_last: bool) -> Result<Self> {
        ensure!(
            batch_size > 0,
            "batch_size must be > 0, but got batch_size={}",
            batch_size
        );
        Ok(Self {
            sampler,
            batch_size,
            drop_last,
        })
    }
}

impl<S: Sampler> Sampler for BatchSampler<S> {
    type Item = Vec<S::Item>;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send + '_> {
        let mut inner = self.sampler.iter(epoch);
        let batch_size = self.batch_size;
        let drop_last = self.drop_last;

        Box::new(std::iter::from_fn(move || {
            let batch: Vec<_> = inner.by_ref().take(batch_size).collect();
            let complete = batch.len() == batch_size;
            (complete || (!drop_last && !batch.is_empty())).then_some(batch)
        }))
    }
}

impl<S: Sampler + ?Sized> Sampler for Box<S> {
    type Item = S::Item;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send + '_> {
        (**self).iter(epoch)
    }
}
