//! Voxel element kinds supported by the renderer.

use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;
use std::fmt;

/// Numeric kind of a single voxel. Fixed at renderer construction and
/// shared by every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    U8,
    U16,
    I16,
    F32,
}

impl ElementType {
    /// Storage size of one voxel, in bytes.
    pub fn bytes_per_voxel(self) -> u64 {
        match self {
            ElementType::U8 => 1,
            ElementType::U16 => 2,
            ElementType::I16 => 2,
            ElementType::F32 => 4,
        }
    }

    /// Upper clamp for the brightness parameter. Unsigned-byte data covers a
    /// much smaller dynamic range, so its useful brightness ceiling is lower.
    pub fn max_brightness(self) -> f32 {
        match self {
            ElementType::U8 => 16.0,
            _ => 256.0,
        }
    }
}

impl Default for ElementType {
    fn default() -> Self {
        ElementType::U8
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::U8 => write!(f, "u8"),
            ElementType::U16 => write!(f, "u16"),
            ElementType::I16 => write!(f, "i16"),
            ElementType::F32 => write!(f, "f32"),
        }
    }
}

// bytes_per_voxel must agree with the primitive types voxel slices are
// reinterpreted as.
const_assert_eq!(std::mem::size_of::<u8>(), 1);
const_assert_eq!(std::mem::size_of::<u16>(), 2);
const_assert_eq!(std::mem::size_of::<i16>(), 2);
const_assert_eq!(std::mem::size_of::<f32>(), 4);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_voxel() {
        assert_eq!(ElementType::U8.bytes_per_voxel(), 1);
        assert_eq!(ElementType::U16.bytes_per_voxel(), 2);
        assert_eq!(ElementType::I16.bytes_per_voxel(), 2);
        assert_eq!(ElementType::F32.bytes_per_voxel(), 4);
    }

    #[test]
    fn test_brightness_ceiling_depends_on_element() {
        assert_eq!(ElementType::U8.max_brightness(), 16.0);
        assert_eq!(ElementType::U16.max_brightness(), 256.0);
    }
}
