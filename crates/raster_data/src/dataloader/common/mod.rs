//! src/dataloader/common/mod.rs
//!
//! Helpers shared by the single-threaded and worker code paths.

pub mod thread;
