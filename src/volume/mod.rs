//! Volume data types: element kinds, shapes, owned buffers and the
//! recycling pool.

mod buffer;
mod element;
mod pool;

pub use buffer::{VolumeBuffer, VolumeDims, VoxelSize};
pub use element::ElementType;
pub use pool::VolumePool;
