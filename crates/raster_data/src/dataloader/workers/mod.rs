//! Worker management for parallel batch loading.
//!
//! - `pool`: generic `WorkerPool<Task, Output>` with one task channel per worker
//!
//! The iterator hands each worker whole batches: a [`BatchTask`] carries the
//! dataset indices plus a sequence number, and the worker answers with the
//! same sequence number so the iterator can restore sampler order.

use crate::minibatch::MiniBatch;
use anyhow::Result;

pub(crate) mod pool;

/// One batch of dataset indices, tagged with its position in the epoch.
#[derive(Debug)]
pub(crate) struct BatchTask {
    pub(crate) seq: usize,
    pub(crate) indices: Vec<usize>,
}

/// A worker's answer to a [`BatchTask`] with the same `seq`.
pub(crate) type BatchOutput = (usize, Result<MiniBatch>);
