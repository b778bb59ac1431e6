use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A scene is a contiguous run of frames recorded by one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Half-open `[start, end)` range into the frames table.
    pub frame_index_interval: [usize; 2],
    pub host: String,
    pub start_time: i64,
    pub end_time: i64,
}

/// One timestep of the recording vehicle (ego) and the agents it perceived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub timestamp: i64,
    /// Half-open `[start, end)` range into the agents table.
    pub agent_index_interval: [usize; 2],
    pub ego_translation: [f64; 3],
    pub ego_rotation_yaw: f64,
}

/// A perceived road user at one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub centroid: [f64; 2],
    /// Length, width, height in metres.
    pub extent: [f32; 3],
    pub yaw: f32,
    pub velocity: [f32; 2],
    pub track_id: u64,
    pub label_probability: f32,
}

/// The three tables of a chunked dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Scenes,
    Frames,
    Agents,
}

impl Table {
    /// Name of the directory holding this table's chunks.
    pub fn dir_name(self) -> &'static str {
        match self {
            Table::Scenes => "scenes",
            Table::Frames => "frames",
            Table::Agents => "agents",
        }
    }
}

/// Row type stored in one [`Table`].
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: Table;
}

impl Record for Scene {
    const TABLE: Table = Table::Scenes;
}

impl Record for Frame {
    const TABLE: Table = Table::Frames;
}

impl Record for Agent {
    const TABLE: Table = Table::Agents;
}
