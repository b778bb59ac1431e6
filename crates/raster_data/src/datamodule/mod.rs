//! src/datamodule/mod.rs
//!
//! The `DataModule`: resolves train/validation parameters once, opens the
//! chunked datasets on `setup`, and hands out batch loaders.
//!
//! ```text
//!  Config + DataModuleOverrides
//!            │ ResolvedParams::resolve (explicit > configured > default)
//!            ↓
//!       DataModule ── ensure_resources() ──→ LocalDataManager, Rasterizer (once)
//!            │
//!            │ build_views(stage)
//!            ↓
//!   train split ──→ AgentDataset ──→ [Subset(train_idxs)] ──┬─→ random_split ──→ train / val
//!                                                          │        (same split)
//!   val split   ──→ AgentDataset ──→ [Subset(val_idxs)]  ───┴─→ val (distinct split)
//!            │
//!            ↓
//!   train_dataloader() / val_dataloader() ──→ DataLoader
//! ```
//!
//! # Example
//! ```ignore
//! let config = Config::from_json_file("config.json")?;
//! let overrides = DataModuleOverrides {
//!     val_proportion: Some(0.1),
//!     ..Default::default()
//! };
//! let mut module = DataModule::new("/data/lyft", config, overrides)?;
//! module.setup(Some(Stage::Fit))?;
//!
//! for batch in module.train_dataloader(LoaderOverrides::default())?.iter()? {
//!     let image = batch?.get("image")?.shallow_clone();
//! }
//! ```

mod args;
mod params;

pub use args::{parse_boolish, DataModuleArgs, DataModuleOverrides};
pub use params::{
    ResolvedParams, SplitParams, DEFAULT_CACHE_SIZE, DEFAULT_NUM_WORKERS, DEFAULT_TRAIN_SHUFFLE,
    DEFAULT_VAL_SHUFFLE,
};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::agent_dataset::AgentDataset;
use crate::config::Config;
use crate::dataloader::{DataLoader, DataLoaderConfig};
use crate::dataset::{random_split, DatasetRef, Subset};
use crate::error::DataModuleError;
use crate::rasterization::{build_rasterizer, Rasterizer};
use crate::storage::{ChunkedDataset, LocalDataManager, OpenChunkedDataset};

/// Lifecycle stage passed to `setup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Stage {
    Fit,
    Validate,
    Test,
    Predict,
}

/// Per-call loader overrides; unset fields use the resolved split parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderOverrides {
    pub batch_size: Option<usize>,
    pub num_workers: Option<usize>,
    pub shuffle: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitKind {
    Train,
    Val,
}

impl SplitKind {
    fn name(self) -> &'static str {
        match self {
            SplitKind::Train => "train",
            SplitKind::Val => "val",
        }
    }
}

pub struct DataModule {
    data_root: PathBuf,
    config: Config,
    params: ResolvedParams,
    data_manager: Option<Arc<LocalDataManager>>,
    rasterizer: Option<Arc<dyn Rasterizer>>,
    train_data: Option<DatasetRef>,
    val_data: Option<DatasetRef>,
    train_source: Option<Arc<OpenChunkedDataset>>,
    val_source: Option<Arc<OpenChunkedDataset>>,
}

impl DataModule {
    /// Resolves parameters and reads index files. Touches no dataset.
    ///
    /// # Errors
    /// See [`ResolvedParams::resolve`].
    pub fn new(data_root: impl Into<PathBuf>, config: Config, overrides: DataModuleOverrides) -> Result<Self> {
        let data_root = data_root.into();
        let params = ResolvedParams::resolve(&config, &overrides)?;

        tracing::info!(root = %data_root.display(), "initializing data module");
        tracing::info!(
            split = params.train_split(),
            batch_size = params.train.batch_size,
            shuffle = params.train.shuffle,
            num_workers = params.train.num_workers,
            idxs = ?overrides.train_idxs,
            "train"
        );
        tracing::info!(
            split = ?params.val.split,
            batch_size = params.val.batch_size,
            shuffle = params.val.shuffle,
            num_workers = params.val.num_workers,
            idxs = ?overrides.val_idxs,
            proportion = ?params.val_proportion,
            "val"
        );

        Ok(Self {
            data_root,
            config,
            params,
            data_manager: None,
            rasterizer: None,
            train_data: None,
            val_data: None,
            train_source: None,
            val_source: None,
        })
    }

    /// Convenience constructor from parsed command-line arguments.
    pub fn from_args(args: DataModuleArgs, config: Config) -> Result<Self> {
        Self::new(args.data_root, config, args.overrides)
    }

    /// Creates the data manager and rasterizer unless they already exist.
    pub fn ensure_resources(&mut self) -> Result<()> {
        self.resources().map(|_| ())
    }

    fn resources(&mut self) -> Result<(Arc<LocalDataManager>, Arc<dyn Rasterizer>)> {
        let data_manager = match &self.data_manager {
            Some(data_manager) => data_manager.clone(),
            None => {
                let data_manager = Arc::new(LocalDataManager::new(&self.data_root)?);
                self.data_manager = Some(data_manager.clone());
                data_manager
            }
        };
        let rasterizer = match &self.rasterizer {
            Some(rasterizer) => rasterizer.clone(),
            None => {
                let rasterizer =
                    build_rasterizer(&self.config, &data_manager).context("Failed to build rasterizer")?;
                tracing::debug!(shape = ?rasterizer.shape(), "rasterizer ready");
                self.rasterizer = Some(rasterizer.clone());
                rasterizer
            }
        };
        Ok((data_manager, rasterizer))
    }

    /// Rebuilds the train and validation views for the fit stage.
    ///
    /// Other stages leave the views untouched.
    pub fn build_views(&mut self, stage: Option<Stage>) -> Result<()> {
        if !matches!(stage, None | Some(Stage::Fit)) {
            tracing::debug!(?stage, "no views to build for stage");
            return Ok(());
        }
        let (data_manager, rasterizer) = self.resources()?;
        let params = &self.params;

        let train_source = self.open_split(&data_manager, params.train_split())?;
        let mut train_view: DatasetRef =
            Arc::new(AgentDataset::new(&self.config, train_source.clone(), rasterizer.clone())?);
        if let Some(idxs) = &params.train.idxs {
            train_view = Arc::new(Subset::new(train_view, idxs.clone()).context("Invalid train indices")?);
        }

        let (train_data, val_data, val_source) = if params.val_shares_train_split() {
            let proportion = params
                .val_proportion
                .ok_or_else(|| DataModuleError::MissingValProportion {
                    split: params.train_split().to_string(),
                })?;
            if params.val.idxs.is_some() {
                tracing::warn!("val_idxs are ignored when validation is split from the training data");
            }

            let total = train_view.len();
            let val_len = (total as f64 * proportion).floor() as usize;
            let mut parts = random_split(train_view, &[total - val_len, val_len], params.split_seed)?;
            let val: DatasetRef = Arc::new(parts.pop().context("random_split returned no parts")?);
            let train: DatasetRef = Arc::new(parts.pop().context("random_split returned one part")?);
            tracing::info!(train = train.len(), val = val.len(), proportion, "split training data");
            (train, val, train_source.clone())
        } else {
            let val_split = params.val.split.as_deref().unwrap_or_default();
            let val_source = self.open_split(&data_manager, val_split)?;
            let mut val: DatasetRef =
                Arc::new(AgentDataset::new(&self.config, val_source.clone(), rasterizer)?);

            if let Some(idxs) = &params.val.idxs {
                let parent = if params.val_idxs_from_train_view {
                    tracing::warn!("applying val_idxs to the training view (legacy behaviour)");
                    train_view.clone()
                } else {
                    val
                };
                val = Arc::new(Subset::new(parent, idxs.clone()).context("Invalid val indices")?);
            }
            tracing::info!(train = train_view.len(), val = val.len(), "opened separate validation split");
            (train_view, val, val_source)
        };

        self.train_data = Some(train_data);
        self.val_data = Some(val_data);
        self.train_source = Some(train_source);
        self.val_source = Some(val_source);
        Ok(())
    }

    /// `ensure_resources` followed by `build_views`.
    pub fn setup(&mut self, stage: Option<Stage>) -> Result<()> {
        self.ensure_resources()?;
        self.build_views(stage)
    }

    fn open_split(&self, data_manager: &LocalDataManager, key: &str) -> Result<Arc<OpenChunkedDataset>> {
        let path = data_manager.require(key)?;
        let dataset = ChunkedDataset::new(path)
            .open(self.params.cache_size)
            .with_context(|| format!("Failed to open split '{}'", key))?;
        tracing::debug!(
            split = key,
            scenes = dataset.num_scenes(),
            frames = dataset.num_frames(),
            agents = dataset.num_agents(),
            cache_size = self.params.cache_size,
            "opened chunked dataset"
        );
        Ok(Arc::new(dataset))
    }

    pub fn train_dataloader(&self, overrides: LoaderOverrides) -> Result<DataLoader> {
        self.dataloader(SplitKind::Train, overrides)
    }

    pub fn val_dataloader(&self, overrides: LoaderOverrides) -> Result<DataLoader> {
        self.dataloader(SplitKind::Val, overrides)
    }

    fn dataloader(&self, kind: SplitKind, overrides: LoaderOverrides) -> Result<DataLoader> {
        let (data, params) = match kind {
            SplitKind::Train => (&self.train_data, &self.params.train),
            SplitKind::Val => (&self.val_data, &self.params.val),
        };
        let data = data
            .clone()
            .ok_or(DataModuleError::NotSetUp { split: kind.name() })?;

        let config = DataLoaderConfig::builder()
            .batch_size(overrides.batch_size.unwrap_or(params.batch_size))
            .num_workers(overrides.num_workers.unwrap_or(params.num_workers))
            .shuffle(overrides.shuffle.unwrap_or(params.shuffle))
            .build();
        DataLoader::new(data, config).with_context(|| format!("Failed to create {} dataloader", kind.name()))
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn params(&self) -> &ResolvedParams {
        &self.params
    }

    pub fn train_params(&self) -> &SplitParams {
        &self.params.train
    }

    pub fn val_params(&self) -> &SplitParams {
        &self.params.val
    }

    pub fn data_manager(&self) -> Option<&Arc<LocalDataManager>> {
        self.data_manager.as_ref()
    }

    pub fn rasterizer(&self) -> Option<&Arc<dyn Rasterizer>> {
        self.rasterizer.as_ref()
    }

    pub fn train_data(&self) -> Option<&DatasetRef> {
        self.train_data.as_ref()
    }

    pub fn val_data(&self) -> Option<&DatasetRef> {
        self.val_data.as_ref()
    }

    /// Opened dataset behind the training view.
    pub fn train_source(&self) -> Option<&Arc<OpenChunkedDataset>> {
        self.train_source.as_ref()
    }

    /// Opened dataset behind the validation view; the training one when
    /// validation is split from it.
    pub fn val_source(&self) -> Option<&Arc<OpenChunkedDataset>> {
        self.val_source.as_ref()
    }
}
