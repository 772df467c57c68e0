//! One-shot volume capture: a requested snapshot of each layer's
//! device-side volume, delivered to registered listeners on the next frame.

use crate::volume::{ElementType, VolumeDims, VoxelSize};

/// Raw snapshot of one layer's volume at capture time.
#[derive(Debug, Clone)]
pub struct VolumeSnapshot {
    pub bytes: Vec<u8>,
    pub element: ElementType,
    pub dims: VolumeDims,
    pub voxel_size: VoxelSize,
}

/// Receiver of capture snapshots. Called from the render thread while the
/// renderer-wide lock is held; implementations should hand the data off
/// rather than do heavy work inline.
pub trait CaptureListener: Send {
    fn volume_captured(&self, layer: usize, snapshot: &VolumeSnapshot);
}
