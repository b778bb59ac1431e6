//! src/dataloader/iterator.rs
//!
//! Iteration over batches produced by `DataLoader::iter()`.
//!
//! Two variants:
//! - `Single`: loads and collates each batch on the calling thread
//! - `Multi`: a fresh worker pool for this epoch; batches are routed
//!   round-robin (batch `i` goes to worker `i % num_workers`) and yielded in
//!   sampler order through a small reorder buffer
//!
//! Both variants yield exactly the same batches in the same order for a
//! given loader and epoch.

use crate::collator::Collator;
use crate::dataset::{Dataset, DatasetRef};
use crate::minibatch::MiniBatch;
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::common::thread::{current_worker_id, set_worker_id};
use super::config::DataLoaderConfig;
use super::workers::pool::WorkerPool;
use super::workers::{BatchOutput, BatchTask};

type BatchIndices<'a> = Box<dyn Iterator<Item = Vec<usize>> + Send + 'a>;

/// Iterator over collated batches for one epoch.
pub struct DataLoaderIter<'a, C> {
    inner: IteratorImpl<'a, C>,
}

enum IteratorImpl<'a, C> {
    Single {
        dataset: &'a dyn Dataset,
        collator: &'a C,
        batch_indices: BatchIndices<'a>,
    },

    /// - `next_seq`: sequence number of the next batch to send
    /// - `next_yield`: sequence number the caller receives next
    /// - `reordered`: batches that arrived ahead of `next_yield`
    /// - `in_flight_limit`: cap on `next_seq - next_yield`
    Multi {
        pool: WorkerPool<BatchTask, BatchOutput>,
        batch_indices: BatchIndices<'a>,
        next_seq: usize,
        next_yield: usize,
        reordered: BTreeMap<usize, Result<MiniBatch>>,
        in_flight_limit: usize,
        exhausted: bool,
        timeout: Duration,
    },
}

/// Loads `indices` from `dataset` and collates them into one batch.
fn load_batch<C: Collator>(dataset: &dyn Dataset, collator: &C, indices: &[usize]) -> Result<MiniBatch> {
    let samples = indices
        .iter()
        .map(|&i| {
            dataset
                .get_sample(i)
                .with_context(|| format!("Failed to load sample {}", i))
        })
        .collect::<Result<Vec<_>>>()?;
    collator.collate(&samples)
}

fn run_worker<C: Collator>(
    worker_id: usize,
    dataset: &dyn Dataset,
    collator: &C,
    tasks: Receiver<BatchTask>,
    outputs: Sender<BatchOutput>,
    shutdown: &AtomicBool,
    poll: Duration,
) {
    set_worker_id(worker_id);
    tracing::trace!(worker_id, "loader worker started");

    while !shutdown.load(Ordering::Relaxed) {
        let task = match tasks.recv_timeout(poll) {
            Ok(task) => task,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let batch = load_batch(dataset, collator, &task.indices).with_context(|| {
            format!(
                "Worker {} failed on batch {}",
                current_worker_id().unwrap_or(worker_id),
                task.seq
            )
        });
        if outputs.send((task.seq, batch)).is_err() {
            break;
        }
    }
    tracing::trace!(worker_id, "loader worker stopped");
}

impl<'a, C> DataLoaderIter<'a, C>
where
    C: Collator + Clone + Send + Sync + 'static,
{
    pub(crate) fn single(dataset: &'a DatasetRef, collator: &'a C, batch_indices: BatchIndices<'a>) -> Self {
        Self {
            inner: IteratorImpl::Single {
                dataset: dataset.as_ref(),
                collator,
                batch_indices,
            },
        }
    }

    pub(crate) fn multi(
        dataset: &DatasetRef,
        collator: &C,
        config: &DataLoaderConfig,
        batch_indices: BatchIndices<'a>,
    ) -> Result<Self> {
        let worker_dataset = dataset.clone();
        let worker_collator = collator.clone();
        let poll = config.worker_timeout;

        let pool = WorkerPool::new(
            config.num_workers,
            config.prefetch_factor,
            move |worker_id, tasks, outputs, shutdown: &AtomicBool| {
                run_worker(
                    worker_id,
                    worker_dataset.as_ref(),
                    &worker_collator,
                    tasks,
                    outputs,
                    shutdown,
                    poll,
                )
            },
        )?;

        Ok(Self {
            inner: IteratorImpl::Multi {
                pool,
                batch_indices,
                next_seq: 0,
                next_yield: 0,
                reordered: BTreeMap::new(),
                in_flight_limit: config.num_workers * config.prefetch_factor,
                exhausted: false,
                timeout: config.timeout,
            },
        })
    }
}

impl<C: Collator> Iterator for DataLoaderIter<'_, C> {
    type Item = Result<MiniBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IteratorImpl::Single {
                dataset,
                collator,
                batch_indices,
            } => {
                let indices = batch_indices.next()?;
                Some(load_batch(*dataset, *collator, &indices))
            }

            IteratorImpl::Multi {
                pool,
                batch_indices,
                next_seq,
                next_yield,
                reordered,
                in_flight_limit,
                exhausted,
                timeout,
            } => {
                while !*exhausted && *next_seq - *next_yield < *in_flight_limit {
                    let Some(indices) = batch_indices.next() else {
                        *exhausted = true;
                        break;
                    };
                    let seq = *next_seq;
                    let task = BatchTask { seq, indices };
                    if let Err(e) = pool.send(seq % pool.num_workers(), task) {
                        return Some(Err(e));
                    }
                    *next_seq += 1;
                }

                if *next_yield == *next_seq {
                    return None;
                }

                loop {
                    if let Some(batch) = reordered.remove(&*next_yield) {
                        *next_yield += 1;
                        return Some(batch);
                    }
                    match pool.recv_timeout(*timeout) {
                        Ok((seq, batch)) => {
                            reordered.insert(seq, batch);
                        }
                        Err(e) => return Some(Err(e)),
                    }
                }
            }
        }
    }
}
