//! Thread-local worker identification.
//!
//! Loader workers record their ID here on start so nested code (dataset
//! views, rasterizers) can tag log lines and errors without threading the ID
//! through every call. The calling thread reports `None`.

use std::cell::Cell;

thread_local! {
    /// `Some(id)` inside loader worker `id`, `None` elsewhere.
    pub static WORKER_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

pub(crate) fn set_worker_id(worker_id: usize) {
    WORKER_ID.with(|id| id.set(Some(worker_id)));
}

/// ID of the loader worker running on this thread, if any.
pub fn current_worker_id() -> Option<usize> {
    WORKER_ID.with(Cell::get)
}
