use anyhow::{ensure, Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use super::chunked::{chunk_path, ChunkedDataset, ChunkedMeta, FORMAT_VERSION, META_FILE};
use super::records::{Agent, Frame, Record, Scene};

/// Writes scenes, frames and agents into the chunked layout read by
/// [`ChunkedDataset`].
///
/// Interval consistency is checked before anything touches the disk: every
/// scene's frame interval must lie inside the frames table and every frame's
/// agent interval inside the agents table.
pub struct ChunkedDatasetWriter {
    path: PathBuf,
    chunk_size: usize,
}

impl ChunkedDatasetWriter {
    pub fn new(path: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            path: path.into(),
            chunk_size,
        }
    }

    pub fn write(&self, scenes: &[Scene], frames: &[Frame], agents: &[Agent]) -> Result<ChunkedDataset> {
        ensure!(self.chunk_size > 0, "chunk_size must be > 0");
        for (i, scene) in scenes.iter().enumerate() {
            let [start, end] = scene.frame_index_interval;
            ensure!(
                start <= end && end <= frames.len(),
                "Scene {} frame interval [{}, {}) exceeds {} frames",
                i,
                start,
                end,
                frames.len()
            );
        }
        for (i, frame) in frames.iter().enumerate() {
            let [start, end] = frame.agent_index_interval;
            ensure!(
                start <= end && end <= agents.len(),
                "Frame {} agent interval [{}, {}) exceeds {} agents",
                i,
                start,
                end,
                agents.len()
            );
        }

        std::fs::create_dir_all(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        self.write_table(scenes)?;
        self.write_table(frames)?;
        self.write_table(agents)?;

        let meta = ChunkedMeta {
            format_version: FORMAT_VERSION,
            chunk_size: self.chunk_size,
            num_scenes: scenes.len(),
            num_frames: frames.len(),
            num_agents: agents.len(),
        };
        let meta_path = self.path.join(META_FILE);
        let file = File::create(&meta_path)
            .with_context(|| format!("Failed to create {}", meta_path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &meta)
            .with_context(|| format!("Failed to write {}", meta_path.display()))?;

        tracing::debug!(
            path = %self.path.display(),
            scenes = scenes.len(),
            frames = frames.len(),
            agents = agents.len(),
            "wrote chunked dataset"
        );
        Ok(ChunkedDataset::new(self.path.clone()))
    }

    fn write_table<T: Record>(&self, rows: &[T]) -> Result<()> {
        let dir = self.path.join(T::TABLE.dir_name());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        for (chunk_index, chunk) in rows.chunks(self.chunk_size).enumerate() {
            let path = chunk_path(&self.path, T::TABLE, chunk_index);
            let file = File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            serde_json::to_writer(BufWriter::new(file), chunk)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod writer_tests {
    use super::*;

    fn frame(agent_index_interval: [usize; 2]) -> Frame {
        Frame {
            timestamp: 0,
            agent_index_interval,
            ego_translation: [0.0; 3],
            ego_rotation_yaw: 0.0,
        }
    }

    #[test]
    fn test_rejects_inconsistent_intervals() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let writer = ChunkedDatasetWriter::new(dir.path().join("bad.zarr"), 4);

        let err = writer.write(&[], &[frame([0, 3])], &[]).unwrap_err();
        assert!(err.to_string().contains("agent interval"));
        assert!(!dir.path().join("bad.zarr").exists());
        Ok(())
    }

    #[test]
    fn test_writes_chunk_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let frames: Vec<Frame> = (0..5).map(|_| frame([0, 0])).collect();
        let dataset = ChunkedDatasetWriter::new(dir.path().join("ok.zarr"), 2).write(&[], &frames, &[])?;

        let frames_dir = dataset.path().join("frames");
        let mut names: Vec<_> = std::fs::read_dir(&frames_dir)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<_>>()?;
        names.sort();
        assert_eq!(names, vec!["0.json", "1.json", "2.json"]);

        let opened = dataset.open(1024)?;
        assert_eq!(opened.meta().num_chunks(crate::storage::Table::Frames), 3);
        Ok(())
    }
}
