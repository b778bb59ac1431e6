//! src/index.rs
//!
//! Reads explicit subset indices from a CSV file.
//!
//! The file needs a header row with the requested column; other columns are
//! ignored. Rows keep their order and duplicates, so
//!
//! ```text
//! idx,score
//! 3,0.1
//! 1,0.9
//! 1,0.4
//! ```
//!
//! reads as `[3, 1, 1]` for column `idx`.

use anyhow::{anyhow, Context, Result};
use std::path::Path;

/// Column name used by index files.
pub const INDEX_COLUMN: &str = "idx";

pub fn read_index_column(path: impl AsRef<Path>, column: &str) -> Result<Vec<usize>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open index file {}", path.display()))?;

    let position = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .iter()
        .position(|name| name == column)
        .ok_or_else(|| anyhow!("Index file {} has no '{}' column", path.display(), column))?;

    let mut indices = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed row {} in {}", row + 1, path.display()))?;
        let field = record.get(position).unwrap_or_default();
        let index = field.parse::<usize>().with_context(|| {
            format!(
                "Invalid index '{}' at row {} of {}",
                field,
                row + 1,
                path.display()
            )
        })?;
        indices.push(index);
    }

    tracing::debug!(path = %path.display(), count = indices.len(), "read index file");
    Ok(indices)
}
