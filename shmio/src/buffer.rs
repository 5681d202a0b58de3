//! Typed, shaped, zero-copy views of the data buffer

use crate::data_type::DataType;
use crate::error::{ShmError, ShmResult};
use crate::shared_memory::SharedMemory;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element types that may be laid over the data buffer.
///
/// # Safety
///
/// Implementors must be plain old data: no padding, every bit pattern valid,
/// `size_of::<Self>() == DATA_TYPE.element_size()` and alignment no larger
/// than 16 bytes.
pub unsafe trait Element: Copy + Send + Sync + 'static {
    /// The data type this element type stands for
    const DATA_TYPE: DataType;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            // SAFETY: primitive numeric types and arrays of them are POD.
            unsafe impl Element for $ty {
                const DATA_TYPE: DataType = DataType::$dtype;
            }
        )*
    };
}

impl_element! {
    u8 => Uint8,
    i8 => Int8,
    u16 => Uint16,
    i16 => Int16,
    u32 => Uint32,
    i32 => Int32,
    u64 => Uint64,
    i64 => Int64,
    f32 => Float,
    f64 => Double,
    [f32; 2] => ComplexFloat,
    [f64; 2] => ComplexDouble,
}

/// IEEE 754 binary16 value, stored as its raw bits.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Half(pub u16);

// SAFETY: transparent wrapper around u16.
unsafe impl Element for Half {
    const DATA_TYPE: DataType = DataType::Half;
}

impl Half {
    /// Wrap raw bits
    pub const fn from_bits(bits: u16) -> Self {
        Half(bits)
    }

    /// Raw bits
    pub const fn to_bits(self) -> u16 {
        self.0
    }

    /// Widen to `f32` (exact).
    pub fn to_f32(self) -> f32 {
        let sign = ((self.0 & 0x8000) as u32) << 16;
        let exp = ((self.0 >> 10) & 0x1f) as u32;
        let frac = (self.0 & 0x03ff) as u32;

        let bits = match (exp, frac) {
            (0, 0) => sign,
            (0, _) => {
                // Subnormal: renormalize into f32's wider exponent range.
                let shift = frac.leading_zeros() - 21;
                let frac = (frac << shift) & 0x03ff;
                sign | ((127 - 15 + 1 - shift) << 23) | (frac << 13)
            }
            (0x1f, 0) => sign | 0x7f80_0000,
            (0x1f, _) => sign | 0x7fc0_0000 | (frac << 13),
            _ => sign | ((exp + 127 - 15) << 23) | (frac << 13),
        };
        f32::from_bits(bits)
    }

    /// Narrow from `f32`, rounding to nearest even.
    pub fn from_f32(value: f32) -> Self {
        let bits = value.to_bits();
        let sign = ((bits >> 16) & 0x8000) as u16;
        let exp = ((bits >> 23) & 0xff) as i32;
        let frac = bits & 0x007f_ffff;

        if exp == 0xff {
            let nan = if frac != 0 { 0x0200 } else { 0 };
            return Half(sign | 0x7c00 | nan);
        }

        let unbiased = exp - 127;
        if unbiased > 15 {
            return Half(sign | 0x7c00);
        }
        if unbiased >= -14 {
            let half_exp = (unbiased + 15) as u32;
            let mantissa = frac >> 13;
            let rest = frac & 0x1fff;
            let mut out = (half_exp << 10) | mantissa;
            if rest > 0x1000 || (rest == 0x1000 && out & 1 == 1) {
                out += 1; // may carry into the exponent, up to infinity
            }
            return Half(sign | out as u16);
        }
        if unbiased < -25 {
            return Half(sign);
        }

        // Subnormal result.
        let full = frac | 0x0080_0000;
        let shift = (-14 - unbiased + 13) as u32;
        let mantissa = full >> shift;
        let rest = full & ((1 << shift) - 1);
        let halfway = 1 << (shift - 1);
        let mut out = mantissa;
        if rest > halfway || (rest == halfway && out & 1 == 1) {
            out += 1;
        }
        Half(sign | out as u16)
    }
}

impl From<f32> for Half {
    fn from(value: f32) -> Self {
        Half::from_f32(value)
    }
}

impl From<Half> for f32 {
    fn from(value: Half) -> Self {
        value.to_f32()
    }
}

impl fmt::Debug for Half {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f32())
    }
}

/// Row-major strides, in elements, for `shape`.
fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

/// Flat offset of `index`, or `None` on wrong rank or out-of-bounds.
fn flat_index(shape: &[usize], index: &[usize]) -> Option<usize> {
    if index.len() != shape.len() {
        return None;
    }
    index
        .iter()
        .zip(shape)
        .try_fold(0usize, |acc, (&i, &extent)| (i < extent).then(|| acc * extent + i))
}

/// Read-only shaped view of the data buffer.
#[derive(Clone, Copy)]
pub struct ArrayView<'a, T: Element> {
    data: &'a [T],
    shape: &'a [usize],
}

impl<'a, T: Element> ArrayView<'a, T> {
    /// Dimension extents
    pub fn shape(&self) -> &'a [usize] {
        self.shape
    }

    /// Row-major strides in elements
    pub fn strides(&self) -> Vec<usize> {
        row_major_strides(self.shape)
    }

    /// Number of dimensions
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false for a segment buffer
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Elements in row-major order
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Element at a multi-dimensional index
    pub fn get(&self, index: &[usize]) -> Option<&'a T> {
        flat_index(self.shape, index).map(|i| &self.data[i])
    }

    /// Iterate in row-major order
    pub fn iter(&self) -> std::slice::Iter<'a, T> {
        self.data.iter()
    }

    /// Row `row` of a 2-D view
    pub fn row(&self, row: usize) -> Option<&'a [T]> {
        match *self.shape {
            [rows, cols] if row < rows => Some(&self.data[row * cols..(row + 1) * cols]),
            _ => None,
        }
    }
}

impl<T: Element + fmt::Debug> fmt::Debug for ArrayView<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayView")
            .field("dtype", &T::DATA_TYPE)
            .field("shape", &self.shape)
            .finish()
    }
}

/// Mutable shaped view of the data buffer.
pub struct ArrayViewMut<'a, T: Element> {
    data: &'a mut [T],
    shape: &'a [usize],
}

impl<'a, T: Element> ArrayViewMut<'a, T> {
    /// Dimension extents
    pub fn shape(&self) -> &[usize] {
        self.shape
    }

    /// Row-major strides in elements
    pub fn strides(&self) -> Vec<usize> {
        row_major_strides(self.shape)
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false for a segment buffer
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Elements in row-major order
    pub fn as_slice(&self) -> &[T] {
        &*self.data
    }

    /// Mutable elements in row-major order
    pub fn as_slice_mut(&mut self) -> &mut [T] {
        &mut *self.data
    }

    /// Element at a multi-dimensional index
    pub fn get(&self, index: &[usize]) -> Option<&T> {
        flat_index(self.shape, index).map(|i| &self.data[i])
    }

    /// Mutable element at a multi-dimensional index
    pub fn get_mut(&mut self, index: &[usize]) -> Option<&mut T> {
        flat_index(self.shape, index).map(|i| &mut self.data[i])
    }

    /// Iterate in row-major order
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    /// Mutable iteration in row-major order
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.data.iter_mut()
    }

    /// Set every element to `value`
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Overwrite the whole buffer; `OutOfRange` if `src` has a different length.
    pub fn copy_from_slice(&mut self, src: &[T]) -> ShmResult<()> {
        if src.len() != self.data.len() {
            return Err(ShmError::out_of_range(format!(
                "source has {} elements, buffer holds {}",
                src.len(),
                self.data.len()
            )));
        }
        self.data.copy_from_slice(src);
        Ok(())
    }

    /// Read-only view of the same buffer
    pub fn view(&self) -> ArrayView<'_, T> {
        ArrayView {
            data: &*self.data,
            shape: self.shape,
        }
    }
}

impl SharedMemory {
    /// The data buffer as raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.segment.data()
    }

    /// The data buffer as mutable raw bytes
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.segment.data_mut()
    }

    /// Typed view; `TypeMismatch` unless `T` matches the segment's data type.
    pub fn ndarray<T: Element>(&self) -> ShmResult<ArrayView<'_, T>> {
        self.check_element::<T>()?;
        let len = self.element_count();
        // SAFETY: the data region is 64-byte aligned, `len * size_of::<T>()`
        // bytes long (validated at create/open) and `T` is POD.
        let data = unsafe { std::slice::from_raw_parts(self.segment.data_ptr() as *const T, len) };
        Ok(ArrayView {
            data,
            shape: self.shape(),
        })
    }

    /// Mutable typed view; `TypeMismatch` unless `T` matches the segment's data type.
    pub fn ndarray_mut<T: Element>(&mut self) -> ShmResult<ArrayViewMut<'_, T>> {
        self.check_element::<T>()?;
        let len = self.element_count();
        let ptr = self.segment.data_ptr_mut() as *mut T;
        // SAFETY: as in `ndarray`; `&mut self` makes this the only view
        // handed out by this handle.
        let data = unsafe { std::slice::from_raw_parts_mut(ptr, len) };
        Ok(ArrayViewMut {
            data,
            shape: self.shape(),
        })
    }

    fn check_element<T: Element>(&self) -> ShmResult<()> {
        if T::DATA_TYPE != self.data_type() {
            return Err(ShmError::TypeMismatch {
                what: format!("buffer of '{}'", self.name()),
                expected: self.data_type().to_string(),
                found: T::DATA_TYPE.to_string(),
            });
        }
        Ok(())
    }
}
