//! src/agent_dataset.rs
//!
//! Per-agent view over an opened chunked dataset.
//!
//! Every agent row whose `label_probability` reaches the configured threshold
//! becomes one sample. A sample is centred on that agent at its frame and
//! carries:
//! - the raster of the last `history_num_frames + 1` frames,
//! - past positions of the agent (`history_*`), most recent first,
//! - future positions of the agent (`target_*`), nearest first,
//!
//! all in the agent's own frame (origin at its centroid, x along its heading).
//! Past and future steps never cross the boundary of the agent's scene; steps
//! outside the scene, or where the agent was not observed, are zero with
//! availability 0.

use anyhow::{Context, Result};
use std::sync::Arc;
use tch::Tensor;

use crate::config::Config;
use crate::dataset::Dataset;
use crate::error::DataModuleError;
use crate::rasterization::{FrameAgents, Rasterizer};
use crate::sample::Sample;
use crate::storage::{Agent, OpenChunkedDataset};

pub struct AgentDataset {
    dataset: Arc<OpenChunkedDataset>,
    rasterizer: Arc<dyn Rasterizer>,
    history_num_frames: usize,
    future_num_frames: usize,
    /// Agent rows exposed by this view, ascending.
    agent_indices: Vec<usize>,
    /// First agent row of every frame.
    frame_agent_starts: Vec<usize>,
    /// First frame of every scene.
    scene_frame_starts: Vec<usize>,
    scene_frame_ends: Vec<usize>,
}

impl AgentDataset {
    /// Indexes the agents of `dataset` that pass
    /// `config.raster_params.filter_agents_threshold`.
    pub fn new(config: &Config, dataset: Arc<OpenChunkedDataset>, rasterizer: Arc<dyn Rasterizer>) -> Result<Self> {
        let scenes = dataset
            .scenes(0..dataset.num_scenes())
            .context("Failed to index scenes")?;
        let frames = dataset
            .frames(0..dataset.num_frames())
            .context("Failed to index frames")?;

        let threshold = config.raster_params.filter_agents_threshold;
        let chunk_size = dataset.meta().chunk_size;
        let mut agent_indices = Vec::new();
        let mut start = 0;
        while start < dataset.num_agents() {
            let end = (start + chunk_size).min(dataset.num_agents());
            let agents = dataset.agents(start..end).context("Failed to index agents")?;
            agent_indices.extend(
                agents
                    .iter()
                    .enumerate()
                    .filter(|(_, agent)| agent.label_probability >= threshold)
                    .map(|(offset, _)| start + offset),
            );
            start = end;
        }

        tracing::info!(
            path = %dataset.path().display(),
            agents = agent_indices.len(),
            total_agents = dataset.num_agents(),
            threshold,
            "agent dataset indexed"
        );

        Ok(Self {
            rasterizer,
            history_num_frames: config.model_params.history_num_frames,
            future_num_frames: config.model_params.future_num_frames,
            agent_indices,
            frame_agent_starts: frames.iter().map(|f| f.agent_index_interval[0]).collect(),
            scene_frame_starts: scenes.iter().map(|s| s.frame_index_interval[0]).collect(),
            scene_frame_ends: scenes.iter().map(|s| s.frame_index_interval[1]).collect(),
            dataset,
        })
    }

    /// The opened dataset backing this view.
    pub fn source(&self) -> &Arc<OpenChunkedDataset> {
        &self.dataset
    }

    /// Agent row behind sample `index`.
    pub fn agent_index(&self, index: usize) -> Option<usize> {
        self.agent_indices.get(index).copied()
    }

    fn frame_of_agent(&self, agent_index: usize) -> Result<usize> {
        self.frame_agent_starts
            .partition_point(|&start| start <= agent_index)
            .checked_sub(1)
            .with_context(|| format!("Agent {} precedes every frame", agent_index))
    }

    /// `[start, end)` frame range of the scene containing `frame_index`.
    fn scene_bounds(&self, frame_index: usize) -> Result<(usize, usize)> {
        let scene = self
            .scene_frame_starts
            .partition_point(|&start| start <= frame_index)
            .checked_sub(1)
            .with_context(|| format!("Frame {} belongs to no scene", frame_index))?;
        Ok((self.scene_frame_starts[scene], self.scene_frame_ends[scene]))
    }

    fn frame_agents(&self, frame_index: usize) -> Result<FrameAgents> {
        let frame = self.dataset.frame(frame_index)?;
        let [start, end] = frame.agent_index_interval;
        let agents = self.dataset.agents(start..end)?;
        Ok(FrameAgents { frame, agents })
    }
}

impl Dataset for AgentDataset {
    fn len(&self) -> usize {
        self.agent_indices.len()
    }

    fn get_sample(&self, index: usize) -> Result<Sample> {
        let agent_index = self.agent_index(index).ok_or(DataModuleError::IndexOutOfBounds {
            index,
            len: self.agent_indices.len(),
        })?;
        let agent = self.dataset.agent(agent_index)?;
        let frame_index = self.frame_of_agent(agent_index)?;
        let (scene_start, scene_end) = self.scene_bounds(frame_index)?;

        let history = (0..=self.history_num_frames)
            .map_while(|k| frame_index.checked_sub(k).filter(|&f| f >= scene_start))
            .map(|f| self.frame_agents(f))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Failed to gather history for agent {}", agent_index))?;
        let future = (1..=self.future_num_frames)
            .map(|k| frame_index + k)
            .take_while(|&f| f < scene_end)
            .map(|f| self.frame_agents(f))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Failed to gather future for agent {}", agent_index))?;

        let (history_positions, history_availabilities) =
            relative_track(&agent, &history, self.history_num_frames + 1);
        let (target_positions, target_availabilities) =
            relative_track(&agent, &future, self.future_num_frames);

        let [channels, height, width] = self.rasterizer.shape();
        let image = self
            .rasterizer
            .rasterize(&history, Some(&agent))
            .with_context(|| format!("Failed to rasterize agent {}", agent_index))?;

        let timestamp = history.first().map(|h| h.frame.timestamp).unwrap_or_default();

        Ok(Sample::from_single(
            "image",
            Tensor::from_slice(&image).reshape([channels as i64, height as i64, width as i64]),
        )
        .with_feature(
            "history_positions",
            Tensor::from_slice(&history_positions).reshape([(self.history_num_frames + 1) as i64, 2]),
        )
        .with_feature(
            "history_availabilities",
            Tensor::from_slice(&history_availabilities),
        )
        .with_feature(
            "target_positions",
            Tensor::from_slice(&target_positions).reshape([self.future_num_frames as i64, 2]),
        )
        .with_feature(
            "target_availabilities",
            Tensor::from_slice(&target_availabilities),
        )
        .with_feature("centroid", Tensor::from_slice(&agent.centroid))
        .with_feature("yaw", Tensor::from_slice(&[agent.yaw]))
        .with_feature("track_id", Tensor::from_slice(&[agent.track_id as i64]))
        .with_feature("timestamp", Tensor::from_slice(&[timestamp])))
    }
}

/// Positions of `agent.track_id` across `frames`, in the agent's frame of
/// reference, padded with unavailable steps up to `steps`.
fn relative_track(agent: &Agent, frames: &[FrameAgents], steps: usize) -> (Vec<f32>, Vec<f32>) {
    let mut positions = vec![0.0f32; steps * 2];
    let mut availabilities = vec![0.0f32; steps];
    let (sin, cos) = (-(agent.yaw as f64)).sin_cos();

    for (step, frame) in frames.iter().take(steps).enumerate() {
        if let Some(seen) = frame.agents.iter().find(|a| a.track_id == agent.track_id) {
            let dx = seen.centroid[0] - agent.centroid[0];
            let dy = seen.centroid[1] - agent.centroid[1];
            positions[step * 2] = (cos * dx - sin * dy) as f32;
            positions[step * 2 + 1] = (sin * dx + cos * dy) as f32;
            availabilities[step] = 1.0;
        }
    }
    (positions, availabilities)
}

#[cfg(test)]
mod agent_dataset_tests {
    use super::*;
    use crate::config::{ModelParams, RasterParams};
    use crate::rasterization::StubRasterizer;
    use crate::storage::{ChunkedDatasetWriter, Frame, Scene};

    fn agent(track_id: u64, x: f64, label_probability: f32) -> Agent {
        Agent {
            centroid: [x, 0.0],
            extent: [4.0, 2.0, 1.5],
            yaw: 0.0,
            velocity: [1.0, 0.0],
            track_id,
            label_probability,
        }
    }

    /// Scene 0: frames 0..4, scene 1: frames 4..6. Each frame holds track 1
    /// (moving +1 m per frame) and a low-confidence track 2.
    fn build(dir: &std::path::Path) -> Result<AgentDataset> {
        build_with_future(dir, 3)
    }

    fn build_with_future(dir: &std::path::Path, future_num_frames: usize) -> Result<AgentDataset> {
        let scenes = vec![
            Scene {
                frame_index_interval: [0, 4],
                host: "a".to_string(),
                start_time: 0,
                end_time: 4,
            },
            Scene {
                frame_index_interval: [4, 6],
                host: "b".to_string(),
                start_time: 4,
                end_time: 6,
            },
        ];
        let mut frames = Vec::new();
        let mut agents = Vec::new();
        for f in 0..6usize {
            let start = agents.len();
            agents.push(agent(1, f as f64, 0.9));
            agents.push(agent(2, 50.0, 0.1));
            frames.push(Frame {
                timestamp: f as i64 * 100,
                agent_index_interval: [start, agents.len()],
                ego_translation: [0.0, 0.0, 0.0],
                ego_rotation_yaw: 0.0,
            });
        }
        let opened = ChunkedDatasetWriter::new(dir.join("agents.zarr"), 3)
            .write(&scenes, &frames, &agents)?
            .open(1 << 20)?;

        let config = Config {
            raster_params: RasterParams {
                map_type: "stub_debug".to_string(),
                raster_size: [8, 4],
                ..RasterParams::default()
            },
            model_params: ModelParams {
                history_num_frames: 2,
                future_num_frames,
            },
            ..Config::default()
        };
        let rasterizer = Arc::new(StubRasterizer::new(&config.raster_params, 2));
        AgentDataset::new(&config, Arc::new(opened), rasterizer)
    }

    fn floats(sample: &Sample, feature: &str) -> Result<Vec<f32>> {
        Ok(sample.get(feature)?.flatten(0, -1).try_into()?)
    }

    #[test]
    fn test_filters_by_label_probability() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let dataset = build(dir.path())?;

        assert_eq!(dataset.len(), 6);
        assert_eq!(dataset.agent_index(0), Some(0));
        assert_eq!(dataset.agent_index(1), Some(2));
        assert!(dataset.get_sample(6).is_err());
        Ok(())
    }

    #[test]
    fn test_sample_shapes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let dataset = build(dir.path())?;
        let sample = dataset.get_sample(1)?;

        assert_eq!(sample.get("image")?.size(), vec![6, 4, 8]);
        assert_eq!(sample.get("history_positions")?.size(), vec![3, 2]);
        assert_eq!(sample.get("target_positions")?.size(), vec![3, 2]);
        assert_eq!(sample.get("track_id")?.int64_value(&[0]), 1);
        assert_eq!(sample.get("timestamp")?.int64_value(&[0]), 100);
        Ok(())
    }

    #[test]
    fn test_future_is_clamped_to_scene() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let dataset = build(dir.path())?;

        // Frame 2 of scene 0: only frame 3 lies ahead inside the scene.
        let sample = dataset.get_sample(2)?;
        assert_eq!(floats(&sample, "target_availabilities")?, vec![1.0, 0.0, 0.0]);
        assert_eq!(floats(&sample, "target_positions")?, vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_history_is_clamped_to_scene() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let dataset = build(dir.path())?;

        // Frame 4 opens scene 1: no past frames available.
        let sample = dataset.get_sample(4)?;
        assert_eq!(floats(&sample, "history_availabilities")?, vec![1.0, 0.0, 0.0]);

        // Frame 3: two past frames in scene 0, positions behind the agent.
        let sample = dataset.get_sample(3)?;
        assert_eq!(floats(&sample, "history_availabilities")?, vec![1.0, 1.0, 1.0]);
        assert_eq!(
            floats(&sample, "history_positions")?,
            vec![0.0, 0.0, -1.0, 0.0, -2.0, 0.0]
        );
        Ok(())
    }

    #[test]
    fn test_zero_future_frames() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let dataset = build_with_future(dir.path(), 0)?;
        let sample = dataset.get_sample(0)?;

        assert_eq!(sample.get("target_positions")?.size(), vec![0, 2]);
        assert_eq!(sample.get("target_availabilities")?.size(), vec![0]);
        assert_eq!(sample.get("history_positions")?.size(), vec![3, 2]);
        Ok(())
    }
}
