//! src/dataloader/mod.rs
//!
//! This module implements the `DataLoader`.
//!
//! The `DataLoader` coordinates a dataset view, a `Sampler`, and a `Collator`
//! to turn rasterized samples into batches, optionally loading them on worker
//! threads.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────┐
//!                    │ Dataset view │ (AgentDataset or Subset)
//!                    └──────┬───────┘
//!                           │ get_sample(i)
//!                           ↓
//!                      ┌─────────┐
//!                      │ Sampler │ (sequential or seeded random, batched)
//!                      └────┬────┘
//!                           │ batches of indices
//!                           ↓
//!                    ┌──────────────┐
//!                    │  DataLoader  │ ←───── DataLoaderConfig
//!                    └──────┬───────┘
//!                           │
//!                   [Worker Threads] (optional, fresh pool per epoch)
//!                           │
//!                           ↓
//!                     ┌──────────┐
//!                     │ Collator │ (stacks tensors)
//!                     └────┬─────┘
//!                          ↓
//!                    ┌───────────┐
//!                    │ MiniBatch │
//!                    └───────────┘
//! ```
//!
//! # Module Structure
//!
//! ```text
//! src/dataloader/
//! ├── mod.rs          # Public API exports + architecture docs
//! ├── config.rs       # DataLoaderConfig and builder
//! ├── loader.rs       # DataLoader struct and constructors
//! ├── iterator.rs     # DataLoaderIter (single-threaded and worker variants)
//! ├── workers/
//! │   ├── mod.rs      # Batch task/output types
//! │   └── pool.rs     # Generic `WorkerPool<Task, Output>`
//! └── common/
//!     ├── mod.rs
//!     └── thread.rs   # Thread-local worker ID
//! ```
//!
//! # Example Usage
//!
//! ```ignore
//! let config = DataLoaderConfig::builder()
//!     .batch_size(32)
//!     .num_workers(4)
//!     .shuffle(true)
//!     .build();
//!
//! let dataloader = DataLoader::new(dataset, config)?;
//! for batch in dataloader.iter()? {
//!     let batch: MiniBatch = batch?;
//!     let image = batch.get("image")?;
//! }
//! ```
//!
//! # Memory Usage
//! - Single-threaded: O(batch_size)
//! - Multi-threaded: O(num_workers x prefetch_factor x batch_size)

mod common;
mod config;
mod iterator;
mod loader;
mod workers;

pub use common::thread::{current_worker_id, WORKER_ID};
pub use config::{DataLoaderConfig, DataLoaderConfigBuilder};
pub use iterator::DataLoaderIter;
pub use loader::DataLoader;
