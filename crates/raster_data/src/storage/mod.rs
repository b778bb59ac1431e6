//! Storage collaborators: data-root resolution and the chunked on-disk format.

mod cache;
mod chunked;
mod manager;
mod records;
mod writer;

pub use cache::CacheStats;
pub use chunked::{ChunkedDataset, ChunkedMeta, OpenChunkedDataset, FORMAT_VERSION, META_FILE};
pub use manager::LocalDataManager;
pub use records::{Agent, Frame, Record, Scene, Table};
pub use writer::ChunkedDatasetWriter;
