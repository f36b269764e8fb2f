//! The tensor/node data model: fixed six-dimensional shape and stride
//! convention, operator tags, and the small scalar parameter block used by
//! scalar-RHS kernels.
//!
//! Dimensions beyond a tensor's actual rank are fixed at 1. This keeps every
//! stride walk a constant-depth loop (five `%`/`/` pairs) instead of a
//! dynamic-rank recursion.

use crate::storage::StorageHandle;

/// Fixed tensor rank carried by every shape/stride array.
pub const MAX_DIMS: usize = 6;

/// Operator tag accepted by the dispatcher.
///
/// `*Dv` variants are derivatives of the named function. `SiluDv`/`GeluDv`
/// are unimplemented and panic if dispatched. `SoftmaxDv` is wired to the
/// same kernel as `Softmax` — not a real derivative, preserved as a known
/// defect rather than silently "fixed".
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OpTag {
    Nop,
    Clone,
    View,
    Transpose,
    Permute,
    Mean,
    Min,
    Max,
    Sum,
    Abs,
    Neg,
    Log,
    Sqr,
    Sqrt,
    Sin,
    Cos,
    Step,
    Softmax,
    SoftmaxDv,
    Sigmoid,
    SigmoidDv,
    HardSigmoid,
    Silu,
    SiluDv,
    Tanh,
    TanhDv,
    Relu,
    ReluDv,
    Gelu,
    GeluDv,
    Add,
    Sub,
    Mul,
    Div,
    Adds,
    Subs,
    Muls,
    Divs,
    Matmul,
}

/// Scalar parameter block for scalar-RHS kernels (`Adds`/`Subs`/`Muls`/`Divs`).
#[derive(Clone, Copy, Debug, Default)]
pub struct OpParams {
    pub scalar: f32,
}

/// A dense float32 tensor handle: shape, strides (in elements, not bytes),
/// a reference to backing storage, and the operator that produces it.
pub struct Tensor {
    pub shape: [i64; MAX_DIMS],
    pub strides: [i64; MAX_DIMS],
    pub storage: StorageHandle,
    /// Byte offset of this tensor's first element within `storage`.
    pub offset: usize,
    pub op: OpTag,
    pub op_inputs: [Option<TensorRef>; 2],
    pub op_params: OpParams,
}

/// A reference-counted handle to another tensor, used as an operator input.
pub type TensorRef = std::sync::Arc<Tensor>;

impl Tensor {
    /// Total element count: the product of all six declared dimensions.
    pub fn numel(&self) -> i64 {
        self.shape.iter().product()
    }

    /// Byte size of this tensor's data (`numel * 4`, float32 elements).
    pub fn data_size(&self) -> usize {
        self.numel() as usize * std::mem::size_of::<f32>()
    }

    /// Read-only view over this tensor's elements as a flat float32 slice.
    ///
    /// # Safety
    /// The caller must ensure no worker concurrently writes the same range
    /// (upheld by the partitioning scheme in the kernel layer, not checked
    /// here).
    pub unsafe fn as_slice(&self) -> &[f32] {
        let ptr = self.storage.data_ptr().add(self.offset) as *const f32;
        std::slice::from_raw_parts(ptr, self.numel() as usize)
    }

    /// Mutable view over this tensor's elements as a flat float32 slice.
    ///
    /// # Safety
    /// The caller must ensure exclusive access to the addressed range.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice(&self) -> &mut [f32] {
        let ptr = self.storage.data_ptr().add(self.offset) as *mut f32;
        std::slice::from_raw_parts_mut(ptr, self.numel() as usize)
    }

    /// True if this tensor is contiguous (row-major with respect to `shape`).
    pub fn is_contiguous(&self) -> bool {
        let mut expected = 1i64;
        for i in 0..MAX_DIMS {
            if self.strides[i] != expected {
                return false;
            }
            expected *= self.shape[i];
        }
        true
    }

    pub fn is_shape_eq(&self, other: &Tensor) -> bool {
        self.shape == other.shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn contiguous_tensor(shape: [i64; MAX_DIMS], data: &[f32]) -> Tensor {
        let storage = Storage::alloc(data.len() * std::mem::size_of::<f32>());
        storage.copy_in(0, bytemuck_cast(data));
        let mut strides = [1i64; MAX_DIMS];
        let mut acc = 1i64;
        for i in 0..MAX_DIMS {
            strides[i] = acc;
            acc *= shape[i];
        }
        Tensor {
            shape,
            strides,
            storage: storage.handle(),
            offset: 0,
            op: OpTag::Nop,
            op_inputs: [None, None],
            op_params: OpParams::default(),
        }
    }

    fn bytemuck_cast(data: &[f32]) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(data.as_ptr() as *const u8, std::mem::size_of_val(data))
        }
    }

    #[test]
    fn numel_is_product_of_shape() {
        let t = contiguous_tensor([2, 3, 1, 1, 1, 1], &[0.0; 6]);
        assert_eq!(t.numel(), 6);
    }

    #[test]
    fn contiguous_tensor_reports_contiguous() {
        let t = contiguous_tensor([4, 1, 1, 1, 1, 1], &[1.0, 2.0, 3.0, 4.0]);
        assert!(t.is_contiguous());
    }

    #[test]
    fn shape_eq_compares_full_dims() {
        let a = contiguous_tensor([2, 2, 1, 1, 1, 1], &[0.0; 4]);
        let b = contiguous_tensor([2, 2, 1, 1, 1, 1], &[0.0; 4]);
        assert!(a.is_shape_eq(&b));
    }
}
