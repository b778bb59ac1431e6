//! Data loading for rasterized driving-trajectory datasets.
//!
//! A [`DataModule`] resolves train/validation loader parameters from a JSON
//! [`Config`] and optional overrides, opens chunked datasets under a data root,
//! builds per-agent rasterized views, and hands out batch [`DataLoader`]s.

pub mod agent_dataset;
pub mod collator;
pub mod config;
pub mod dataloader;
pub mod datamodule;
pub mod dataset;
pub mod error;
pub mod index;
pub mod minibatch;
pub mod rasterization;
pub mod sample;
pub mod sampler;
pub mod storage;

pub use agent_dataset::AgentDataset;
pub use collator::{Collator, StackCollator};
pub use config::{Config, LoaderSection, ModelParams, RasterParams};
pub use dataloader::{DataLoader, DataLoaderConfig};
pub use datamodule::{DataModule, DataModuleArgs, DataModuleOverrides, LoaderOverrides, Stage};
pub use dataset::{random_split, Dataset, DatasetRef, Subset};
pub use error::DataModuleError;
pub use index::read_index_column;
pub use minibatch::MiniBatch;
pub use rasterization::{build_rasterizer, Rasterizer};
pub use sample::Sample;
pub use storage::{ChunkedDataset, LocalDataManager, OpenChunkedDataset};
