//! src/storage/chunked.rs
//!
//! On-disk chunked trajectory dataset.
//!
//! # Layout
//!
//! ```text
//! <dataset>/
//! ├── meta.json        # {format_version, chunk_size, num_scenes, num_frames, num_agents}
//! ├── scenes/0.json    # up to `chunk_size` Scene rows per file
//! ├── frames/0.json
//! ├── frames/1.json
//! └── agents/0.json ...
//! ```
//!
//! Opening is two-step: [`ChunkedDataset::new`] only records the location,
//! [`ChunkedDataset::open`] validates the metadata and attaches a chunk cache
//! bounded by `cache_size_bytes`. Reads go through the cache, so random access
//! over a large agents table only decodes the chunks it touches.

use anyhow::{anyhow, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::cache::{CacheStats, ChunkCache};
use super::records::{Agent, Frame, Record, Scene, Table};

pub const FORMAT_VERSION: u32 = 1;
pub const META_FILE: &str = "meta.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkedMeta {
    pub format_version: u32,
    pub chunk_size: usize,
    pub num_scenes: usize,
    pub num_frames: usize,
    pub num_agents: usize,
}

impl ChunkedMeta {
    pub fn rows(&self, table: Table) -> usize {
        match table {
            Table::Scenes => self.num_scenes,
            Table::Frames => self.num_frames,
            Table::Agents => self.num_agents,
        }
    }

    pub fn num_chunks(&self, table: Table) -> usize {
        self.rows(table).div_ceil(self.chunk_size)
    }
}

/// Path to a chunked dataset that has not been opened yet.
#[derive(Debug, Clone)]
pub struct ChunkedDataset {
    path: PathBuf,
}

impl ChunkedDataset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validates the dataset and returns a readable handle whose chunk cache
    /// holds at most `cache_size_bytes` of encoded chunk data.
    pub fn open(self, cache_size_bytes: usize) -> Result<OpenChunkedDataset> {
        let meta_path = self.path.join(META_FILE);
        let meta_text = std::fs::read_to_string(&meta_path)
            .with_context(|| format!("Failed to read {}", meta_path.display()))?;
        let meta: ChunkedMeta = serde_json::from_str(&meta_text)
            .with_context(|| format!("Malformed metadata in {}", meta_path.display()))?;

        ensure!(
            meta.format_version == FORMAT_VERSION,
            "Unsupported chunked dataset version {} in {} (expected {})",
            meta.format_version,
            self.path.display(),
            FORMAT_VERSION
        );
        ensure!(
            meta.chunk_size > 0,
            "chunk_size must be > 0 in {}",
            meta_path.display()
        );
        for table in [Table::Scenes, Table::Frames, Table::Agents] {
            let dir = self.path.join(table.dir_name());
            ensure!(
                meta.rows(table) == 0 || dir.is_dir(),
                "Missing '{}' table directory in {}",
                table.dir_name(),
                self.path.display()
            );
        }

        tracing::debug!(
            path = %self.path.display(),
            scenes = meta.num_scenes,
            frames = meta.num_frames,
            agents = meta.num_agents,
            cache_size_bytes,
            "opened chunked dataset"
        );

        Ok(OpenChunkedDataset {
            path: self.path,
            meta,
            cache: Mutex::new(ChunkCache::new(cache_size_bytes)),
        })
    }
}

/// A validated chunked dataset with a shared chunk cache.
///
/// Safe to share across loader workers behind an `Arc`; the cache is the only
/// mutable state and is guarded by a mutex that is never held during I/O.
pub struct OpenChunkedDataset {
    path: PathBuf,
    meta: ChunkedMeta,
    cache: Mutex<ChunkCache>,
}

impl std::fmt::Debug for OpenChunkedDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenChunkedDataset")
            .field("path", &self.path)
            .field("meta", &self.meta)
            .finish()
    }
}

impl OpenChunkedDataset {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> &ChunkedMeta {
        &self.meta
    }

    pub fn num_scenes(&self) -> usize {
        self.meta.num_scenes
    }

    pub fn num_frames(&self) -> usize {
        self.meta.num_frames
    }

    pub fn num_agents(&self) -> usize {
        self.meta.num_agents
    }

    pub fn scene(&self, index: usize) -> Result<Scene> {
        self.row(index)
    }

    pub fn frame(&self, index: usize) -> Result<Frame> {
        self.row(index)
    }

    pub fn agent(&self, index: usize) -> Result<Agent> {
        self.row(index)
    }

    pub fn scenes(&self, range: Range<usize>) -> Result<Vec<Scene>> {
        self.rows(range)
    }

    pub fn frames(&self, range: Range<usize>) -> Result<Vec<Frame>> {
        self.rows(range)
    }

    pub fn agents(&self, range: Range<usize>) -> Result<Vec<Agent>> {
        self.rows(range)
    }

    pub fn cache_stats(&self) -> Result<CacheStats> {
        let cache = self
            .cache
            .lock()
            .map_err(|_| anyhow!("Chunk cache lock poisoned"))?;
        Ok(cache.stats())
    }

    fn row<T: Record>(&self, index: usize) -> Result<T> {
        let len = self.meta.rows(T::TABLE);
        ensure!(
            index < len,
            "Row {} out of bounds for '{}' table of length {}",
            index,
            T::TABLE.dir_name(),
            len
        );
        let chunk = self.chunk::<T>(index / self.meta.chunk_size)?;
        Ok(chunk[index % self.meta.chunk_size].clone())
    }

    fn rows<T: Record>(&self, range: Range<usize>) -> Result<Vec<T>> {
        let len = self.meta.rows(T::TABLE);
        ensure!(
            range.start <= range.end && range.end <= len,
            "Range {:?} out of bounds for '{}' table of length {}",
            range,
            T::TABLE.dir_name(),
            len
        );

        let chunk_size = self.meta.chunk_size;
        let mut out = Vec::with_capacity(range.len());
        let mut index = range.start;
        while index < range.end {
            let chunk_index = index / chunk_size;
            let chunk = self.chunk::<T>(chunk_index)?;
            let offset = index % chunk_size;
            let take = (range.end - index).min(chunk.len() - offset);
            out.extend_from_slice(&chunk[offset..offset + take]);
            index += take;
        }
        Ok(out)
    }

    /// Returns a decoded chunk, loading it from disk on a cache miss.
    fn chunk<T: Record>(&self, chunk_index: usize) -> Result<Arc<Vec<T>>> {
        let key = (T::TABLE, chunk_index);
        let cached = self
            .cache
            .lock()
            .map_err(|_| anyhow!("Chunk cache lock poisoned"))?
            .get(&key);
        if let Some(chunk) = cached {
            return chunk
                .downcast::<Vec<T>>()
                .map_err(|_| anyhow!("Chunk cache holds the wrong row type for {:?}", key));
        }

        let path = chunk_path(&self.path, T::TABLE, chunk_index);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read chunk {}", path.display()))?;
        let rows: Vec<T> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Malformed chunk {}", path.display()))?;

        let expected = expected_chunk_rows(&self.meta, T::TABLE, chunk_index);
        ensure!(
            rows.len() == expected,
            "Chunk {} holds {} rows, expected {}",
            path.display(),
            rows.len(),
            expected
        );

        let chunk = Arc::new(rows);
        self.cache
            .lock()
            .map_err(|_| anyhow!("Chunk cache lock poisoned"))?
            .insert(key, chunk.clone(), bytes.len());
        Ok(chunk)
    }
}

pub(crate) fn chunk_path(root: &Path, table: Table, chunk_index: usize) -> PathBuf {
    root.join(table.dir_name())
        .join(format!("{}.json", chunk_index))
}

fn expected_chunk_rows(meta: &ChunkedMeta, table: Table, chunk_index: usize) -> usize {
    let start = chunk_index * meta.chunk_size;
    meta.rows(table).saturating_sub(start).min(meta.chunk_size)
}

#[cfg(test)]
mod chunked_dataset_tests {
    use super::*;
    use crate::storage::writer::ChunkedDatasetWriter;

    fn agent(track_id: u64) -> Agent {
        Agent {
            centroid: [track_id as f64, 0.0],
            extent: [4.0, 2.0, 1.5],
            yaw: 0.0,
            velocity: [0.0, 0.0],
            track_id,
            label_probability: 1.0,
        }
    }

    /// One scene, three frames with 2 + 3 + 2 agents, chunks of 2 rows.
    fn write_small(dir: &Path) -> Result<ChunkedDataset> {
        let scenes = vec![Scene {
            frame_index_interval: [0, 3],
            host: "host-a".to_string(),
            start_time: 0,
            end_time: 300,
        }];
        let intervals = [[0, 2], [2, 5], [5, 7]];
        let frames = intervals
            .iter()
            .enumerate()
            .map(|(i, &agent_index_interval)| Frame {
                timestamp: i as i64 * 100,
                agent_index_interval,
                ego_translation: [0.0, 0.0, 0.0],
                ego_rotation_yaw: 0.0,
            })
            .collect::<Vec<_>>();
        let agents = (0..7).map(agent).collect::<Vec<_>>();

        ChunkedDatasetWriter::new(dir.join("small.zarr"), 2).write(&scenes, &frames, &agents)
    }

    #[test]
    fn test_open_and_read_rows() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let dataset = write_small(dir.path())?.open(1 << 20)?;

        assert_eq!(dataset.num_scenes(), 1);
        assert_eq!(dataset.num_frames(), 3);
        assert_eq!(dataset.num_agents(), 7);
        assert_eq!(dataset.frame(2)?.timestamp, 200);
        assert_eq!(dataset.agent(6)?.track_id, 6);

        // Crosses chunk boundaries at 2 and 4.
        let ids: Vec<u64> = dataset.agents(1..6)?.iter().map(|a| a.track_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert!(dataset.agents(3..3)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_out_of_bounds_reads_fail() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let dataset = write_small(dir.path())?.open(1 << 20)?;

        assert!(dataset.agent(7).is_err());
        assert!(dataset.frames(2..4).is_err());
        Ok(())
    }

    #[test]
    fn test_reads_are_cached() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let dataset = write_small(dir.path())?.open(1 << 20)?;

        dataset.agent(0)?;
        dataset.agent(1)?;
        let stats = dataset.cache_stats()?;
        assert_eq!((stats.misses, stats.hits), (1, 1));
        assert_eq!(stats.chunks, 1);
        Ok(())
    }

    #[test]
    fn test_zero_cache_still_reads() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let dataset = write_small(dir.path())?.open(0)?;

        assert_eq!(dataset.agent(3)?.track_id, 3);
        assert_eq!(dataset.agent(3)?.track_id, 3);
        assert_eq!(dataset.cache_stats()?.chunks, 0);
        Ok(())
    }

    #[test]
    fn test_open_rejects_missing_or_bad_meta() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(ChunkedDataset::new(dir.path().join("absent.zarr"))
            .open(0)
            .is_err());

        let bad = dir.path().join("bad.zarr");
        std::fs::create_dir_all(&bad)?;
        std::fs::write(
            bad.join(META_FILE),
            r#"{"format_version": 99, "chunk_size": 2, "num_scenes": 0, "num_frames": 0, "num_agents": 0}"#,
        )?;
        let err = ChunkedDataset::new(&bad).open(0).unwrap_err();
        assert!(err.to_string().contains("Unsupported chunked dataset version"));
        Ok(())
    }

    #[test]
    fn test_truncated_chunk_is_detected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_small(dir.path())?.path().to_path_buf();
        std::fs::write(chunk_path(&path, Table::Agents, 1), "[]")?;

        let dataset = ChunkedDataset::new(&path).open(1 << 20)?;
        assert!(dataset.agent(0).is_ok());
        assert!(dataset.agent(2).is_err());
        Ok(())
    }
}
