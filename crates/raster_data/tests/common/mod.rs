//! Fixtures shared by the integration tests: synthetic chunked datasets,
//! configs and index files written into temporary directories.
#![allow(dead_code)]

use anyhow::Result;
use raster_data::storage::{Agent, ChunkedDatasetWriter, Frame, Scene};
use raster_data::{Config, Dataset};
use std::path::{Path, PathBuf};

pub const FRAMES_PER_SCENE: usize = 4;
pub const AGENTS_PER_FRAME: usize = 3;

/// Writes `num_scenes` scenes of `FRAMES_PER_SCENE` frames, each holding
/// `AGENTS_PER_FRAME` confident agents, under `root/key`.
///
/// Frame `f` has timestamp `f * 100`; agent slot `k` keeps track id `k + 1`
/// and moves one metre per frame, so `(timestamp, track_id)` identifies a sample.
pub fn write_dataset(root: &Path, key: &str, num_scenes: usize) -> Result<()> {
    let mut scenes = Vec::new();
    let mut frames = Vec::new();
    let mut agents = Vec::new();

    for s in 0..num_scenes {
        let first = frames.len();
        for step in 0..FRAMES_PER_SCENE {
            let start = agents.len();
            for k in 0..AGENTS_PER_FRAME {
                agents.push(Agent {
                    centroid: [step as f64, 5.0 * k as f64],
                    extent: [4.0, 1.8, 1.5],
                    yaw: 0.0,
                    velocity: [1.0, 0.0],
                    track_id: k as u64 + 1,
                    label_probability: 1.0,
                });
            }
            frames.push(Frame {
                timestamp: frames.len() as i64 * 100,
                agent_index_interval: [start, agents.len()],
                ego_translation: [step as f64, -3.0, 0.0],
                ego_rotation_yaw: 0.0,
            });
        }
        scenes.push(Scene {
            frame_index_interval: [first, frames.len()],
            host: format!("host-{}", s),
            start_time: first as i64 * 100,
            end_time: frames.len() as i64 * 100,
        });
    }

    ChunkedDatasetWriter::new(root.join(key), 5).write(&scenes, &frames, &agents)?;
    Ok(())
}

/// Number of samples `write_dataset` produces for `num_scenes`.
pub fn num_samples(num_scenes: usize) -> usize {
    num_scenes * FRAMES_PER_SCENE * AGENTS_PER_FRAME
}

/// Small box rasters and short tracks to keep tests fast.
pub fn config(train_split: &str, train_batch_size: usize, val_split: Option<&str>) -> Result<Config> {
    let val = match val_split {
        Some(split) => format!(r#", "val_dataloader": {{"split": "{}", "num_workers": 0}}"#, split),
        None => String::new(),
    };
    Config::from_json_str(&format!(
        r#"{{
            "train_dataloader": {{"split": "{}", "batch_size": {}, "num_workers": 0}}{},
            "raster_params": {{"map_type": "box_debug", "raster_size": [16, 12], "pixel_size": [1.0, 1.0]}},
            "model_params": {{"history_num_frames": 1, "future_num_frames": 2}}
        }}"#,
        train_split, train_batch_size, val
    ))
}

pub fn write_idxs(dir: &Path, name: &str, idxs: &[usize]) -> Result<PathBuf> {
    let path = dir.join(name);
    let mut text = String::from("idx\n");
    for idx in idxs {
        text.push_str(&format!("{}\n", idx));
    }
    std::fs::write(&path, text)?;
    Ok(path)
}

/// `timestamp * 1000 + track_id` of a sample, unique within one dataset.
pub fn sample_key(dataset: &dyn Dataset, index: usize) -> Result<i64> {
    let sample = dataset.get_sample(index)?;
    let timestamp = sample.get("timestamp")?.int64_value(&[0]);
    let track_id = sample.get("track_id")?.int64_value(&[0]);
    Ok(timestamp * 1000 + track_id)
}

pub fn sample_keys(dataset: &dyn Dataset) -> Result<Vec<i64>> {
    (0..dataset.len()).map(|i| sample_key(dataset, i)).collect()
}
