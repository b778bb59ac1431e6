//! src/rasterization.rs
//!
//! Rasterization policies that turn a short history of frames into a fixed
//! size `[channels, height, width]` image centred on one agent (or on the ego
//! vehicle when no agent is given).
//!
//! # Channel layout (box_debug)
//!
//! ```text
//! channel 0 ..= H          other agents (and the ego vehicle) at t, t-1, ..., t-H
//! channel H+1 ..= 2H+1     the centred agent at t, t-1, ..., t-H
//! ```
//!
//! where `H = history_num_frames`. Missing history steps (before the scene
//! starts) leave their channels empty.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::config::{Config, RasterParams};
use crate::error::DataModuleError;
use crate::storage::{Agent, Frame, LocalDataManager};

/// Length and width of the recording vehicle in metres.
pub const EGO_EXTENT: [f64; 2] = [4.869, 1.852];

/// Agents of one frame, as seen by a rasterizer.
#[derive(Debug, Clone)]
pub struct FrameAgents {
    pub frame: Frame,
    pub agents: Vec<Agent>,
}

pub trait Rasterizer: Send + Sync {
    /// `[channels, height, width]` of every raster this policy produces.
    fn shape(&self) -> [usize; 3];

    /// Renders `history` (index 0 is the current frame, index k is k steps
    /// back) centred on `agent`, or on the ego vehicle when `agent` is `None`.
    ///
    /// Returns a row-major buffer of `shape().iter().product()` floats.
    fn rasterize(&self, history: &[FrameAgents], agent: Option<&Agent>) -> Result<Vec<f32>>;
}

/// Builds the rasterizer named by `config.raster_params.map_type`.
///
/// If `dataset_meta_key` is configured it must resolve through `data_manager`.
pub fn build_rasterizer(config: &Config, data_manager: &LocalDataManager) -> Result<Arc<dyn Rasterizer>> {
    let params = &config.raster_params;
    if let Some(key) = &params.dataset_meta_key {
        data_manager.require(key)?;
    }
    if params.raster_size[0] == 0 || params.raster_size[1] == 0 {
        bail!("raster_size must be non-zero, got {:?}", params.raster_size);
    }
    if params.pixel_size[0] <= 0.0 || params.pixel_size[1] <= 0.0 {
        bail!("pixel_size must be positive, got {:?}", params.pixel_size);
    }

    let history_num_frames = config.model_params.history_num_frames;
    let rasterizer: Arc<dyn Rasterizer> = match params.map_type.as_str() {
        "box_debug" => Arc::new(BoxRasterizer::new(params, history_num_frames)),
        "stub_debug" => Arc::new(StubRasterizer::new(params, history_num_frames)),
        other => return Err(DataModuleError::UnsupportedMapType(other.to_string()).into()),
    };

    tracing::info!(
        map_type = %params.map_type,
        shape = ?rasterizer.shape(),
        "rasterizer built"
    );
    Ok(rasterizer)
}

/// `[channels, height, width]` of a raster over `history_num_frames + 1` frames.
fn raster_shape(raster_size: [usize; 2], history_num_frames: usize) -> [usize; 3] {
    [2 * (history_num_frames + 1), raster_size[1], raster_size[0]]
}

/// ============================================================================
/// Draws every agent as a filled oriented box.
#[derive(Debug, Clone)]
pub struct BoxRasterizer {
    raster_size: [usize; 2],
    pixel_size: [f64; 2],
    ego_center: [f64; 2],
    history_num_frames: usize,
}

/// Raster pose: world position and heading that map to `ego_center`.
#[derive(Debug, Clone, Copy)]
struct Pose {
    center: [f64; 2],
    yaw: f64,
}

impl BoxRasterizer {
    pub fn new(params: &RasterParams, history_num_frames: usize) -> Self {
        Self {
            raster_size: params.raster_size,
            pixel_size: params.pixel_size,
            ego_center: params.ego_center,
            history_num_frames,
        }
    }

    /// World coordinates to (fractional) pixel coordinates.
    fn world_to_raster(&self, pose: Pose, p: [f64; 2]) -> [f64; 2] {
        let (sin, cos) = (-pose.yaw).sin_cos();
        let dx = p[0] - pose.center[0];
        let dy = p[1] - pose.center[1];
        let local = [cos * dx - sin * dy, sin * dx + cos * dy];
        [
            local[0] / self.pixel_size[0] + self.ego_center[0] * self.raster_size[0] as f64,
            local[1] / self.pixel_size[1] + self.ego_center[1] * self.raster_size[1] as f64,
        ]
    }

    fn raster_to_world(&self, pose: Pose, px: [f64; 2]) -> [f64; 2] {
        let local = [
            (px[0] - self.ego_center[0] * self.raster_size[0] as f64) * self.pixel_size[0],
            (px[1] - self.ego_center[1] * self.raster_size[1] as f64) * self.pixel_size[1],
        ];
        let (sin, cos) = pose.yaw.sin_cos();
        [
            pose.center[0] + cos * local[0] - sin * local[1],
            pose.center[1] + sin * local[0] + cos * local[1],
        ]
    }

    fn draw_box(&self, image: &mut [f32], channel: usize, pose: Pose, centroid: [f64; 2], yaw: f64, extent: [f64; 2]) {
        let [width, height] = self.raster_size;
        let (half_len, half_wid) = (extent[0] / 2.0, extent[1] / 2.0);
        let (sin, cos) = yaw.sin_cos();

        let corners = [(1.0, 1.0), (1.0, -1.0), (-1.0, 1.0), (-1.0, -1.0)].map(|(sl, sw)| {
            let (u, v) = (sl * half_len, sw * half_wid);
            self.world_to_raster(
                pose,
                [centroid[0] + cos * u - sin * v, centroid[1] + sin * u + cos * v],
            )
        });
        let min_x = corners.iter().map(|c| c[0]).fold(f64::INFINITY, f64::min).floor().max(0.0);
        let max_x = corners.iter().map(|c| c[0]).fold(f64::NEG_INFINITY, f64::max).ceil();
        let min_y = corners.iter().map(|c| c[1]).fold(f64::INFINITY, f64::min).floor().max(0.0);
        let max_y = corners.iter().map(|c| c[1]).fold(f64::NEG_INFINITY, f64::max).ceil();
        if max_x < 0.0 || max_y < 0.0 {
            return;
        }
        let max_x = (max_x as usize).min(width);
        let max_y = (max_y as usize).min(height);

        let plane = &mut image[channel * width * height..(channel + 1) * width * height];
        for y in min_y as usize..max_y {
            for x in min_x as usize..max_x {
                let world = self.raster_to_world(pose, [x as f64 + 0.5, y as f64 + 0.5]);
                let (dx, dy) = (world[0] - centroid[0], world[1] - centroid[1]);
                let u = cos * dx + sin * dy;
                let v = -sin * dx + cos * dy;
                if u.abs() <= half_len && v.abs() <= half_wid {
                    plane[y * width + x] = 1.0;
                }
            }
        }
    }
}

impl Rasterizer for BoxRasterizer {
    fn shape(&self) -> [usize; 3] {
        raster_shape(self.raster_size, self.history_num_frames)
    }

    fn rasterize(&self, history: &[FrameAgents], agent: Option<&Agent>) -> Result<Vec<f32>> {
        let Some(current) = history.first() else {
            bail!("Cannot rasterize an empty history");
        };
        let pose = match agent {
            Some(agent) => Pose {
                center: agent.centroid,
                yaw: agent.yaw as f64,
            },
            None => Pose {
                center: [current.frame.ego_translation[0], current.frame.ego_translation[1]],
                yaw: current.frame.ego_rotation_yaw,
            },
        };

        let [channels, height, width] = self.shape();
        let mut image = vec![0.0f32; channels * height * width];
        let steps = self.history_num_frames + 1;

        for (t, step) in history.iter().take(steps).enumerate() {
            let agents_channel = t;
            let ego_channel = steps + t;
            let ego_centroid = [step.frame.ego_translation[0], step.frame.ego_translation[1]];
            let ego_yaw = step.frame.ego_rotation_yaw;

            for other in &step.agents {
                if agent.is_some_and(|a| a.track_id == other.track_id) {
                    self.draw_box(
                        &mut image,
                        ego_channel,
                        pose,
                        other.centroid,
                        other.yaw as f64,
                        [other.extent[0] as f64, other.extent[1] as f64],
                    );
                } else {
                    self.draw_box(
                        &mut image,
                        agents_channel,
                        pose,
                        other.centroid,
                        other.yaw as f64,
                        [other.extent[0] as f64, other.extent[1] as f64],
                    );
                }
            }

            // The recording vehicle is an ordinary road user from an agent's point of view.
            let ego_target = if agent.is_some() { agents_channel } else { ego_channel };
            self.draw_box(&mut image, ego_target, pose, ego_centroid, ego_yaw, EGO_EXTENT);
        }
        Ok(image)
    }
}

/// ============================================================================
/// Produces all-zero rasters of the box rasterizer's shape. Useful when only
/// trajectories are consumed.
#[derive(Debug, Clone)]
pub struct StubRasterizer {
    shape: [usize; 3],
}

impl StubRasterizer {
    pub fn new(params: &RasterParams, history_num_frames: usize) -> Self {
        Self {
            shape: raster_shape(params.raster_size, history_num_frames),
        }
    }
}

impl Rasterizer for StubRasterizer {
    fn shape(&self) -> [usize; 3] {
        self.shape
    }

    fn rasterize(&self, _history: &[FrameAgents], _agent: Option<&Agent>) -> Result<Vec<f32>> {
        Ok(vec![0.0; self.shape.iter().product()])
    }
}
