//! src/config.rs
//!
//! Nested dataset configuration.
//!
//! Mirrors the JSON document shared by the data module, the rasterizer and the
//! per-agent view:
//!
//! ```text
//! {
//!   "train_dataloader": {"split": "scenes/train.zarr", "batch_size": 32, "shuffle": true, "num_workers": 4},
//!   "val_dataloader":   {"split": "scenes/validate.zarr", "batch_size": 32},
//!   "raster_params":    {"map_type": "box_debug", "raster_size": [224, 224], ...},
//!   "model_params":     {"history_num_frames": 10, "future_num_frames": 50}
//! }
//! ```
//!
//! Loader section fields are all optional here. Whether a missing value is an
//! error depends on whether an explicit argument supplied it, which is decided
//! during parameter resolution (see `datamodule::params`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::DataModuleError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub train_dataloader: Option<LoaderSection>,
    #[serde(default)]
    pub val_dataloader: Option<LoaderSection>,
    #[serde(default)]
    pub raster_params: RasterParams,
    #[serde(default)]
    pub model_params: ModelParams,
}

/// One `*_dataloader` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoaderSection {
    pub split: Option<String>,
    pub batch_size: Option<usize>,
    pub shuffle: Option<bool>,
    pub num_workers: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterParams {
    /// `box_debug` or `stub_debug`.
    pub map_type: String,
    /// Raster width and height in pixels.
    pub raster_size: [usize; 2],
    /// Metres per pixel along x and y.
    pub pixel_size: [f64; 2],
    /// Position of the centred agent in the raster, as a fraction of its size.
    pub ego_center: [f64; 2],
    /// Agents below this label probability are not indexed by the agent view.
    pub filter_agents_threshold: f32,
    /// Optional metadata file that must exist under the data root.
    pub dataset_meta_key: Option<String>,
}

impl Default for RasterParams {
    fn default() -> Self {
        Self {
            map_type: "box_debug".to_string(),
            raster_size: [224, 224],
            pixel_size: [0.5, 0.5],
            ego_center: [0.25, 0.5],
            filter_agents_threshold: 0.5,
            dataset_meta_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub history_num_frames: usize,
    pub future_num_frames: usize,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            history_num_frames: 10,
            future_num_frames: 50,
        }
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse configuration")
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// The `train_dataloader` section; an error when absent.
    pub fn train_section(&self) -> Result<&LoaderSection> {
        self.train_dataloader.as_ref().ok_or_else(|| {
            DataModuleError::MissingConfigKey {
                key: "train_dataloader".to_string(),
            }
            .into()
        })
    }

    /// The `val_dataloader` section, or an empty one when absent.
    pub fn val_section(&self) -> LoaderSection {
        self.val_dataloader.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_parse_full_document() -> Result<()> {
        let config = Config::from_json_str(
            r#"{
                "train_dataloader": {"split": "train.zarr", "batch_size": 12, "shuffle": false, "num_workers": 2},
                "val_dataloader": {"split": "val.zarr"},
                "raster_params": {"map_type": "stub_debug", "raster_size": [32, 16]},
                "model_params": {"history_num_frames": 2, "future_num_frames": 5},
                "train_params": {"max_num_steps": 100}
            }"#,
        )?;

        let train = config.train_section()?;
        assert_eq!(train.split.as_deref(), Some("train.zarr"));
        assert_eq!(train.batch_size, Some(12));
        assert_eq!(train.shuffle, Some(false));
        assert_eq!(config.val_section().split.as_deref(), Some("val.zarr"));
        assert_eq!(config.val_section().batch_size, None);
        assert_eq!(config.raster_params.raster_size, [32, 16]);
        assert_eq!(config.raster_params.pixel_size, [0.5, 0.5]);
        assert_eq!(config.model_params.future_num_frames, 5);
        Ok(())
    }

    #[test]
    fn test_missing_train_section() -> Result<()> {
        let config = Config::from_json_str("{}")?;
        let err = config.train_section().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataModuleError>(),
            Some(DataModuleError::MissingConfigKey { key }) if key == "train_dataloader"
        ));
        assert_eq!(config.val_section(), LoaderSection::default());
        Ok(())
    }

    #[test]
    fn test_malformed_document() {
        assert!(Config::from_json_str(r#"{"train_dataloader": {"batch_size": "big"}}"#).is_err());
    }
}
