//! Element types of the data buffer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Interpretation of one element of the data buffer.
///
/// The discriminant is the tag stored in the segment header and must never be
/// renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum DataType {
    /// Unsigned 8-bit integer
    Uint8 = 0,
    /// Signed 8-bit integer
    Int8 = 1,
    /// Unsigned 16-bit integer
    Uint16 = 2,
    /// Signed 16-bit integer
    Int16 = 3,
    /// Unsigned 32-bit integer
    Uint32 = 4,
    /// Signed 32-bit integer
    Int32 = 5,
    /// Unsigned 64-bit integer
    Uint64 = 6,
    /// Signed 64-bit integer
    Int64 = 7,
    /// IEEE 754 binary16
    Half = 8,
    /// IEEE 754 binary32
    Float = 9,
    /// IEEE 754 binary64
    Double = 10,
    /// Pair of binary32 (re, im)
    ComplexFloat = 11,
    /// Pair of binary64 (re, im)
    ComplexDouble = 12,
}

impl DataType {
    /// Every supported data type, in tag order.
    pub const ALL: [DataType; 13] = [
        DataType::Uint8,
        DataType::Int8,
        DataType::Uint16,
        DataType::Int16,
        DataType::Uint32,
        DataType::Int32,
        DataType::Uint64,
        DataType::Int64,
        DataType::Half,
        DataType::Float,
        DataType::Double,
        DataType::ComplexFloat,
        DataType::ComplexDouble,
    ];

    /// Width of one element in bytes.
    #[inline]
    pub const fn element_size(self) -> usize {
        match self {
            DataType::Uint8 | DataType::Int8 => 1,
            DataType::Uint16 | DataType::Int16 | DataType::Half => 2,
            DataType::Uint32 | DataType::Int32 | DataType::Float => 4,
            DataType::Uint64 | DataType::Int64 | DataType::Double | DataType::ComplexFloat => 8,
            DataType::ComplexDouble => 16,
        }
    }

    /// Header tag.
    #[inline]
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Convert from a header tag. Returns `None` for unknown tags.
    #[inline]
    pub const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(DataType::Uint8),
            1 => Some(DataType::Int8),
            2 => Some(DataType::Uint16),
            3 => Some(DataType::Int16),
            4 => Some(DataType::Uint32),
            5 => Some(DataType::Int32),
            6 => Some(DataType::Uint64),
            7 => Some(DataType::Int64),
            8 => Some(DataType::Half),
            9 => Some(DataType::Float),
            10 => Some(DataType::Double),
            11 => Some(DataType::ComplexFloat),
            12 => Some(DataType::ComplexDouble),
            _ => None,
        }
    }

    /// Byte length of `element_count` elements, `None` on overflow.
    #[inline]
    pub const fn byte_size(self, element_count: usize) -> Option<usize> {
        element_count.checked_mul(self.element_size())
    }

    /// Upper-case name as used in configuration and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            DataType::Uint8 => "UINT8",
            DataType::Int8 => "INT8",
            DataType::Uint16 => "UINT16",
            DataType::Int16 => "INT16",
            DataType::Uint32 => "UINT32",
            DataType::Int32 => "INT32",
            DataType::Uint64 => "UINT64",
            DataType::Int64 => "INT64",
            DataType::Half => "HALF",
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::ComplexFloat => "COMPLEX_FLOAT",
            DataType::ComplexDouble => "COMPLEX_DOUBLE",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
