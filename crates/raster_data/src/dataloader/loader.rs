//! src/dataloader/loader.rs
//!
//! DataLoader construction.
//!
//! The DataLoader creates its sampler from `config.shuffle`:
//! - `shuffle = false`: a SequentialSampler
//! - `shuffle = true`: a RandomSampler seeded with `config.seed`, or with a
//!   freshly drawn seed when none is given
//!
//! Either sampler is wrapped in a BatchSampler using `batch_size` and
//! `drop_last`. Every call to `iter()` advances the epoch, so shuffled
//! loaders visit a new permutation per pass.

use crate::collator::{Collator, StackCollator};
use crate::dataset::DatasetRef;
use crate::sampler::{BatchSampler, RandomSampler, Sampler, SequentialSampler};
use anyhow::{ensure, Context, Result};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::config::DataLoaderConfig;
use super::iterator::DataLoaderIter;

/// Batches samples of a shared dataset view.
///
/// # Thread safety:
/// - `DataLoader` is Send + Sync and can be shared across threads.
/// - Several iterators may be created from the same DataLoader; each one
///   takes the next epoch number.
///
/// # Type parameters:
/// - `C`: Collator type (defaults to StackCollator)
pub struct DataLoader<C = StackCollator> {
    pub(crate) dataset: DatasetRef,
    pub(crate) collator: C,
    pub(crate) config: DataLoaderConfig,
    pub(crate) current_epoch: AtomicUsize,
    pub(crate) runtime_seed: u64,
    pub(crate) batch_sampler: BatchSampler<Box<dyn Sampler<Item = usize>>>,
}

impl DataLoader<StackCollator> {
    /// Creates a DataLoader with the default StackCollator.
    ///
    /// # Example
    /// ```ignore
    /// let config = DataLoaderConfig::builder()
    ///     .batch_size(32)
    ///     .shuffle(true)
    ///     .seed(42)
    ///     .build();
    /// let dataloader = DataLoader::new(dataset, config)?;
    /// ```
    pub fn new(dataset: DatasetRef, config: DataLoaderConfig) -> Result<Self> {
        Self::new_with_collator(dataset, config, StackCollator)
    }
}

impl<C> DataLoader<C>
where
    C: Collator + Clone + Send + Sync + 'static,
{
    /// # Errors
    /// - `batch_size` is 0
    /// - `prefetch_factor` is 0 while `num_workers > 0`
    pub fn new_with_collator(dataset: DatasetRef, config: DataLoaderConfig, collator: C) -> Result<Self> {
        ensure!(config.batch_size > 0, "Batch size must be greater than 0");
        ensure!(
            config.prefetch_factor > 0 || config.num_workers == 0,
            "Prefetch factor must be > 0 when using {} workers",
            config.num_workers
        );

        let runtime_seed = config.seed.unwrap_or_else(|| rand::rng().random());

        let sampler: Box<dyn Sampler<Item = usize>> = if config.shuffle {
            Box::new(RandomSampler::new(dataset.len(), runtime_seed))
        } else {
            Box::new(SequentialSampler::new(dataset.len()))
        };

        let batch_sampler = BatchSampler::new(sampler, config.batch_size, config.drop_last)
            .context("Failed to wrap sampler with BatchSampler")?;

        Ok(Self {
            dataset,
            collator,
            config,
            current_epoch: AtomicUsize::new(0),
            runtime_seed,
            batch_sampler,
        })
    }

    /// Starts a pass over the dataset.
    ///
    /// With `num_workers > 0` a fresh worker pool is spawned for this pass
    /// and joined when the iterator is dropped.
    pub fn iter(&self) -> Result<DataLoaderIter<'_, C>> {
        let epoch = self.current_epoch.fetch_add(1, Ordering::Relaxed);
        let batch_indices = self.batch_sampler.iter(epoch);

        if self.config.num_workers == 0 {
            Ok(DataLoaderIter::single(&self.dataset, &self.collator, batch_indices))
        } else {
            DataLoaderIter::multi(&self.dataset, &self.collator, &self.config, batch_indices)
                .with_context(|| format!("Failed to start workers for epoch {}", epoch))
        }
    }

    pub fn dataset(&self) -> &DatasetRef {
        &self.dataset
    }

    pub fn config(&self) -> &DataLoaderConfig {
        &self.config
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    pub fn shuffle(&self) -> bool {
        self.config.shuffle
    }

    /// Seed behind the shuffle order (drawn at construction if not configured).
    pub fn seed(&self) -> u64 {
        self.runtime_seed
    }

    /// Number of epochs started so far.
    pub fn epoch(&self) -> usize {
        self.current_epoch.load(Ordering::Relaxed)
    }

    /// Number of batches one pass yields.
    pub fn len(&self) -> usize {
        let samples = self.dataset.len();
        let batch_size = self.config.batch_size;
        if self.config.drop_last {
            samples / batch_size
        } else {
            samples.div_ceil(batch_size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
