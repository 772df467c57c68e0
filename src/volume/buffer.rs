//! Typed, owned voxel buffers and their shape descriptors.

use super::ElementType;
use crate::error::VolumeError;
use bytemuck::Pod;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Volume extent in voxels. All axes are positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeDims {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl VolumeDims {
    pub fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Total number of voxels.
    pub fn voxel_count(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth as u64
    }

    /// Euclidean diagonal in voxels. The full-quality ray-march step budget
    /// is this diagonal scaled by the layer quality factor.
    pub fn diagonal(&self) -> f64 {
        let w = self.width as f64;
        let h = self.height as f64;
        let d = self.depth as f64;
        (w * w + h * h + d * d).sqrt()
    }

    /// True when every axis fits within `max` per axis.
    pub fn fits_within(&self, max: &VolumeDims) -> bool {
        self.width <= max.width && self.height <= max.height && self.depth <= max.depth
    }
}

impl fmt::Display for VolumeDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.depth)
    }
}

/// Physical size of a single voxel in real units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelSize {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl VoxelSize {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn isotropic(size: f64) -> Self {
        Self::new(size, size, size)
    }
}

impl Default for VoxelSize {
    fn default() -> Self {
        Self::isotropic(1.0)
    }
}

/// An owned, contiguous, typed voxel buffer.
///
/// The payload length always equals `voxel_count * bytes_per_voxel`; the
/// raw-bytes constructor is the only place an inconsistent buffer can be
/// presented and it rejects the mismatch up front. Ownership moves with the
/// buffer on every hand-off; there is no shared mutation.
pub struct VolumeBuffer {
    element: ElementType,
    dims: VolumeDims,
    data: Vec<u8>,
}

impl VolumeBuffer {
    /// Allocates a zero-filled buffer of the given shape.
    pub fn zeroed(element: ElementType, dims: VolumeDims) -> Self {
        let size = (element.bytes_per_voxel() * dims.voxel_count()) as usize;
        Self {
            element,
            dims,
            data: vec![0u8; size],
        }
    }

    /// Wraps raw bytes, validating that the length matches the declared
    /// shape and element type exactly.
    pub fn from_bytes(
        element: ElementType,
        dims: VolumeDims,
        data: Vec<u8>,
    ) -> Result<Self, VolumeError> {
        let expected = element.bytes_per_voxel() * dims.voxel_count();
        if data.len() as u64 != expected {
            return Err(VolumeError::InconsistentBufferSize {
                actual: data.len() as u64,
                expected,
                dims,
                element,
            });
        }
        Ok(Self {
            element,
            dims,
            data,
        })
    }

    pub fn element(&self) -> ElementType {
        self.element
    }

    pub fn dims(&self) -> VolumeDims {
        self.dims
    }

    pub fn size_in_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Reinterprets the payload as a typed voxel slice.
    pub fn as_slice<T: Pod>(&self) -> &[T] {
        bytemuck::cast_slice(&self.data)
    }

    /// Mutable typed view of the payload, for producers filling the buffer.
    pub fn as_slice_mut<T: Pod>(&mut self) -> &mut [T] {
        bytemuck::cast_slice_mut(&mut self.data)
    }

    /// True when the buffer can stand in for a request of the given shape.
    /// Used by the pool; anything short of an exact match is a miss.
    pub fn matches(&self, element: ElementType, dims: VolumeDims) -> bool {
        self.element == element && self.dims == dims
    }
}

impl fmt::Debug for VolumeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeBuffer")
            .field("element", &self.element)
            .field("dims", &self.dims)
            .field("size_in_bytes", &self.data.len())
            .finish()
    }
}
