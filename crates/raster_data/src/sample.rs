use anyhow::{anyhow, Result};
use std::collections::HashMap;
use tch::Tensor;

/// A single training example produced by a dataset view.
///
/// It maps feature names to tensors. For the per-agent view these are:
/// - `"image"`: `[channels, height, width]` raster
/// - `"history_positions"` / `"history_availabilities"`: `[H + 1, 2]` / `[H + 1]`
/// - `"target_positions"` / `"target_availabilities"`: `[F, 2]` / `[F]`
/// - `"centroid"`, `"yaw"`, `"track_id"`, `"timestamp"`
#[derive(Debug)]
pub struct Sample {
    pub features: HashMap<String, Tensor>,
}

/// Shallow clone: tensors share storage with the original.
impl Clone for Sample {
    fn clone(&self) -> Self {
        let features = self
            .features
            .iter()
            .map(|(k, v)| (k.clone(), v.shallow_clone()))
            .collect();
        Self { features }
    }
}

/// Safety:
/// `tch::Tensor` is `Send`, and a `Sample` is only mutated through `&mut self`,
/// so shared references can be read from several worker threads at once.
unsafe impl Send for Sample {}
unsafe impl Sync for Sample {}

impl Sample {
    pub fn new(features: HashMap<String, Tensor>) -> Self {
        Self { features }
    }

    /// Creates a `Sample` holding one feature. Chain with
    /// [`with_feature`](Self::with_feature) to add more.
    pub fn from_single(name: impl Into<String>, tensor: Tensor) -> Self {
        Self {
            features: HashMap::from([(name.into(), tensor)]),
        }
    }

    /// Adds or overwrites a feature.
    pub fn with_feature(mut self, name: impl Into<String>, tensor: Tensor) -> Self {
        self.features.insert(name.into(), tensor);
        self
    }

    pub fn get(&self, feature: &str) -> Result<&Tensor> {
        self.features
            .get(feature)
            .ok_or_else(|| anyhow!("Feature {} not found", feature))
    }

    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }
}
