//! src/dataloader/config.rs
//!
//! Configuration for DataLoader behaviour.
//!
//! Example:
//! ```ignore
//! let config = DataLoaderConfig::builder()
//!     .batch_size(32)
//!     .num_workers(4)
//!     .shuffle(true)
//!     .prefetch_factor(2)
//!     .build();
//! ```
//!
//! # Performance considerations:
//! - `num_workers`: more workers raise throughput and memory use
//! - `prefetch_factor`: batches kept in flight per worker

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DataLoaderConfig {
    /// Number of samples per batch (must be > 0)
    pub batch_size: usize,
    /// Number of worker threads (0 = load on the calling thread)
    pub num_workers: usize,
    /// Whether to drop the last incomplete batch
    pub drop_last: bool,
    /// Whether to visit samples in a fresh random order every epoch
    pub shuffle: bool,
    /// Seed for the shuffle order; drawn at random when absent
    pub seed: Option<u64>,
    /// Batches in flight per worker (must be > 0 when using workers)
    pub prefetch_factor: usize,
    /// Maximum time to wait for the next batch from the workers
    pub timeout: Duration,
    /// How often idle workers check for shutdown
    pub worker_timeout: Duration,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            num_workers: 0,
            drop_last: false,
            shuffle: false,
            seed: None,
            prefetch_factor: 2,
            timeout: Duration::from_secs(30),
            worker_timeout: Duration::from_millis(100),
        }
    }
}

impl DataLoaderConfig {
    pub fn builder() -> DataLoaderConfigBuilder {
        DataLoaderConfigBuilder::default()
    }
}

/// Builder for [`DataLoaderConfig`] with method chaining
#[derive(Default)]
pub struct DataLoaderConfigBuilder {
    config: DataLoaderConfig,
}

impl DataLoaderConfigBuilder {
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn num_workers(mut self, workers: usize) -> Self {
        self.config.num_workers = workers;
        self
    }

    pub fn drop_last(mut self, drop: bool) -> Self {
        self.config.drop_last = drop;
        self
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.config.shuffle = shuffle;
        self
    }

    /// Fix the shuffle order across runs.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn prefetch_factor(mut self, factor: usize) -> Self {
        self.config.prefetch_factor = factor;
        self
    }

    /// Set the timeout for receiving a batch.
    ///
    /// - Too low: may fail during legitimately slow rasterization
    /// - Too high: delays detection of stuck workers
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn worker_timeout(mut self, worker_timeout: Duration) -> Self {
        self.config.worker_timeout = worker_timeout;
        self
    }

    pub fn build(self) -> DataLoaderConfig {
        self.config
    }
}
