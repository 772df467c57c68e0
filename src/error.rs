//! Error handling for the volume rendering core.
//!
//! Validation failures on the submission path are fatal to the call and
//! raised immediately; a hand-off that merely runs out of time is reported
//! as `Ok(false)`, never as an error.

use crate::volume::{ElementType, VolumeDims};

/// Errors raised while validating or handing off volume data.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error(
        "buffer of {actual} bytes is inconsistent with {dims} voxels of {element} \
         ({expected} bytes expected)"
    )]
    InconsistentBufferSize {
        actual: u64,
        expected: u64,
        dims: VolumeDims,
        element: ElementType,
    },

    #[error(
        "volume of {size_in_bytes} bytes does not fit the device buffer budget \
         of {max_bytes} bytes"
    )]
    VolumeTooLarge { size_in_bytes: u64, max_bytes: u64 },

    #[error("volume dimensions {dims} exceed the device maximum {max_dims}")]
    DimensionsTooLarge {
        dims: VolumeDims,
        max_dims: VolumeDims,
    },
}

/// Errors surfaced by the rendering backend collaborator.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("device lost: {message}")]
    DeviceLost { message: String },

    #[error("storage allocation failed for layer {layer}: {message}")]
    StorageAllocation { layer: usize, message: String },

    #[error("kernel launch failed for layer {layer}: {message}")]
    KernelLaunch { layer: usize, message: String },

    #[error("backend operation '{operation}' failed: {message}")]
    OperationFailed { operation: String, message: String },
}

/// Top-level error type for renderer entry points.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("render layer {layer} out of range ({layers} layers configured)")]
    LayerOutOfRange { layer: usize, layers: usize },
}

/// Result alias used across the renderer.
pub type RenderResult<T> = Result<T, RenderError>;

/// Extension trait for adding backend context to foreign errors.
pub trait BackendResultExt<T> {
    fn backend_context(self, operation: &str) -> Result<T, BackendError>;
}

impl<T, E: std::fmt::Display> BackendResultExt<T> for Result<T, E> {
    fn backend_context(self, operation: &str) -> Result<T, BackendError> {
        self.map_err(|e| BackendError::OperationFailed {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }
}
