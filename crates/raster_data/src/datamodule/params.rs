//! src/datamodule/params.rs
//!
//! Effective per-split parameters.
//!
//! Every parameter is resolved in three layers: an explicit argument wins over
//! the matching `*_dataloader` configuration value, which wins over a
//! hardcoded default. Train batch size and train split have no default.

use anyhow::{Context, Result};
use std::path::Path;

use super::args::DataModuleOverrides;
use crate::config::{Config, LoaderSection};
use crate::error::DataModuleError;
use crate::index::{read_index_column, INDEX_COLUMN};

pub const DEFAULT_NUM_WORKERS: usize = 4;
pub const DEFAULT_CACHE_SIZE: f64 = 1e9;
pub const DEFAULT_TRAIN_SHUFFLE: bool = true;
pub const DEFAULT_VAL_SHUFFLE: bool = false;

/// Explicit argument first, then the configured value.
fn layered<T>(explicit: Option<T>, configured: impl FnOnce() -> Option<T>) -> Option<T> {
    explicit.or_else(configured)
}

fn missing(key: &str) -> DataModuleError {
    DataModuleError::MissingConfigKey {
        key: key.to_string(),
    }
}

fn read_idxs(path: Option<&Path>) -> Result<Option<Vec<usize>>> {
    path.map(|path| {
        read_index_column(path, INDEX_COLUMN)
            .with_context(|| format!("Failed to load indices from {}", path.display()))
    })
    .transpose()
}

/// ============================================================================
/// Effective parameters of one split.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitParams {
    /// Dataset key under the data root; `None` only for validation.
    pub split: Option<String>,
    pub batch_size: usize,
    pub shuffle: bool,
    pub num_workers: usize,
    /// Ordered subset of view indices, duplicates kept.
    pub idxs: Option<Vec<usize>>,
}

impl SplitParams {
    fn resolve_train(config: &Config, overrides: &DataModuleOverrides) -> Result<Self> {
        let configured: Option<&LoaderSection> = config.train_dataloader.as_ref();

        let split = match overrides.train_split.clone() {
            Some(split) => split,
            None => config
                .train_section()?
                .split
                .clone()
                .ok_or_else(|| missing("train_dataloader.split"))?,
        };
        let batch_size = match overrides.train_batch_size {
            Some(batch_size) => batch_size,
            None => config
                .train_section()?
                .batch_size
                .ok_or_else(|| missing("train_dataloader.batch_size"))?,
        };
        let shuffle = layered(overrides.train_shuffle, || configured.and_then(|s| s.shuffle))
            .unwrap_or(DEFAULT_TRAIN_SHUFFLE);
        let num_workers = layered(overrides.train_num_workers, || configured.and_then(|s| s.num_workers))
            .unwrap_or(DEFAULT_NUM_WORKERS);

        Ok(Self {
            split: Some(split),
            batch_size,
            shuffle,
            num_workers,
            idxs: read_idxs(overrides.train_idxs.as_deref())?,
        })
    }

    fn resolve_val(config: &Config, overrides: &DataModuleOverrides, train: &SplitParams) -> Result<Self> {
        let section = config.val_section();

        Ok(Self {
            split: layered(overrides.val_split.clone(), || section.split.clone()),
            batch_size: layered(overrides.val_batch_size, || section.batch_size).unwrap_or(train.batch_size),
            shuffle: layered(overrides.val_shuffle, || section.shuffle).unwrap_or(DEFAULT_VAL_SHUFFLE),
            num_workers: layered(overrides.val_num_workers, || section.num_workers)
                .unwrap_or(DEFAULT_NUM_WORKERS),
            idxs: read_idxs(overrides.val_idxs.as_deref())?,
        })
    }
}

/// ============================================================================
/// Everything a `DataModule` decides at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParams {
    pub train: SplitParams,
    pub val: SplitParams,
    /// Share of the training view carved out for validation.
    pub val_proportion: Option<f64>,
    /// Byte bound of each opened dataset's chunk cache.
    pub cache_size: usize,
    pub split_seed: Option<u64>,
    pub val_idxs_from_train_view: bool,
}

impl ResolvedParams {
    /// Resolves both splits and reads any index files.
    ///
    /// # Errors
    /// - `MissingConfigKey` when train split or batch size is neither passed nor configured
    /// - `MissingValidationSource` when there is neither a validation split nor a proportion
    /// - `InvalidProportion` for a proportion outside `[0, 1]`
    /// - unreadable or malformed index files
    pub fn resolve(config: &Config, overrides: &DataModuleOverrides) -> Result<Self> {
        let train = SplitParams::resolve_train(config, overrides)?;
        let val = SplitParams::resolve_val(config, overrides, &train)?;

        if val.split.is_none() && overrides.val_proportion.is_none() {
            return Err(DataModuleError::MissingValidationSource.into());
        }
        if let Some(p) = overrides.val_proportion {
            if !(0.0..=1.0).contains(&p) {
                return Err(DataModuleError::InvalidProportion(p).into());
            }
        }
        anyhow::ensure!(
            overrides.cache_size.is_finite() && overrides.cache_size >= 0.0,
            "Cache size must be a non-negative number of bytes, got {}",
            overrides.cache_size
        );

        Ok(Self {
            train,
            val,
            val_proportion: overrides.val_proportion,
            cache_size: overrides.cache_size as usize,
            split_seed: overrides.split_seed,
            val_idxs_from_train_view: overrides.val_idxs_from_train_view,
        })
    }

    /// Train split key; always set after resolution.
    pub fn train_split(&self) -> &str {
        self.train.split.as_deref().unwrap_or_default()
    }

    /// Whether validation is carved out of the training view.
    pub fn val_shares_train_split(&self) -> bool {
        match self.val.split.as_deref() {
            None => true,
            Some(split) => split == self.train_split(),
        }
    }
}
