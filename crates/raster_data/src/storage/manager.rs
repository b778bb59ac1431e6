use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::error::DataModuleError;

/// Resolves dataset keys (split names, metadata files) against a data root.
#[derive(Debug, Clone)]
pub struct LocalDataManager {
    root: PathBuf,
}

impl LocalDataManager {
    /// Fails if `root` is not an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(DataModuleError::InvalidDataRoot(root).into());
        }
        tracing::debug!(root = %root.display(), "data manager ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `root/key` if it exists.
    pub fn require(&self, key: &str) -> Result<PathBuf> {
        let path = self.root.join(key);
        if path.exists() {
            Ok(path)
        } else {
            Err(DataModuleError::SplitNotFound {
                key: key.to_string(),
                root: self.root.clone(),
            }
            .into())
        }
    }
}
