//! Worker pool for parallel batch loading.
//!
//! Each worker owns a bounded task channel so the main thread decides which
//! worker handles which batch; all workers share one bounded output channel.
//! Dropping the pool raises the shutdown flag, closes the task channels and
//! joins every thread.

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub(crate) struct WorkerPool<Task, Output> {
    workers: Vec<thread::JoinHandle<()>>,
    task_txs: Vec<Sender<Task>>,
    output_rx: Receiver<Output>,
    shutdown: Arc<AtomicBool>,
}

impl<Task, Output> WorkerPool<Task, Output>
where
    Task: Send + 'static,
    Output: Send + 'static,
{
    /// Spawns `num_workers` threads running `worker_fn(worker_id, tasks, outputs, shutdown)`.
    ///
    /// Each task channel holds `buffer_size` tasks; the output channel holds
    /// `buffer_size * num_workers` results so a worker never blocks on output
    /// while the main thread keeps at most that many tasks in flight.
    pub(crate) fn new<F>(num_workers: usize, buffer_size: usize, worker_fn: F) -> Result<Self>
    where
        F: Fn(usize, Receiver<Task>, Sender<Output>, &AtomicBool) + Send + Sync + 'static,
    {
        if num_workers == 0 {
            bail!("Cannot create WorkerPool with 0 workers; use single-threaded loading instead");
        }
        if buffer_size == 0 {
            bail!("Cannot create WorkerPool with buffer_size 0");
        }

        let (output_tx, output_rx) = bounded(buffer_size * num_workers);
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_fn = Arc::new(worker_fn);

        let mut pool = Self {
            workers: Vec::with_capacity(num_workers),
            task_txs: Vec::with_capacity(num_workers),
            output_rx,
            shutdown,
        };

        for worker_id in 0..num_workers {
            let (task_tx, task_rx) = bounded(buffer_size);
            let output_tx = output_tx.clone();
            let shutdown = pool.shutdown.clone();
            let worker_fn = worker_fn.clone();

            // On spawn failure `pool` is dropped, which joins the workers already running.
            let handle = thread::Builder::new()
                .name(format!("raster-loader-{}", worker_id))
                .spawn(move || worker_fn(worker_id, task_rx, output_tx, &shutdown))
                .with_context(|| format!("Failed to spawn worker thread {}", worker_id))?;

            pool.task_txs.push(task_tx);
            pool.workers.push(handle);
        }
        Ok(pool)
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.task_txs.len()
    }

    pub(crate) fn send(&self, worker_id: usize, task: Task) -> Result<()> {
        let tx = self
            .task_txs
            .get(worker_id)
            .ok_or_else(|| anyhow!("No worker with id {}", worker_id))?;
        tx.send(task)
            .map_err(|_| anyhow!("Worker {} has disconnected", worker_id))
    }

    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Result<Output> {
        self.output_rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => anyhow!(
                "Worker timeout after {:?} - possible deadlock or slow data loading",
                timeout
            ),
            RecvTimeoutError::Disconnected => {
                anyhow!("Worker channel disconnected - workers may have crashed")
            }
        })
    }
}

impl<Task, Output> Drop for WorkerPool<Task, Output> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.task_txs.clear();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::warn!("data loader worker panicked");
            }
        }
    }
}
