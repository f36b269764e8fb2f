//! Operator dispatch: maps an [`OpTag`] to the kernel that computes it.
//!
//! Modeled as an exhaustive `match` rather than a table of function
//! pointers — the match arms are ordered to mirror the forward dispatch
//! table this crate's lineage used, for traceability, but Rust's pattern
//! matching makes the array-of-fn-pointers indirection unnecessary.

use crate::kernels;
use crate::simd::VectorEngine;
use crate::tensor::{OpTag, Tensor};

/// Executes the forward kernel for `node.op` over this worker's partition.
///
/// `node.op_inputs[0]`/`[1]` must be populated as required by the operator;
/// violating that (wrong arity, shape mismatch) is a programmer error and
/// panics rather than returning a `Result` — see the crate's error-handling
/// notes.
pub fn execute_forward(engine: &VectorEngine, worker_idx: u32, worker_count: u32, node: &Tensor) {
    let x = || node.op_inputs[0].as_ref().expect("missing operand 0");
    let y = || node.op_inputs[1].as_ref().expect("missing operand 1");

    match node.op {
        OpTag::Nop | OpTag::View | OpTag::Transpose | OpTag::Permute => {}
        OpTag::Clone => kernels::clone_buffer(worker_idx, worker_count, node, x()),

        OpTag::Mean => kernels::mean(worker_idx, node, x(), engine),
        OpTag::Min => kernels::min(worker_idx, node, x(), engine),
        OpTag::Max => kernels::max(worker_idx, node, x(), engine),
        OpTag::Sum => kernels::sum(worker_idx, node, x(), engine),

        OpTag::Abs => kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.abs(o, x)),
        OpTag::Neg => kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.neg(o, x)),
        OpTag::Log => kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.log(o, x)),
        OpTag::Sqr => kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.sqr(o, x)),
        OpTag::Sqrt => kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.sqrt(o, x)),
        OpTag::Sin => kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.sin(o, x)),
        OpTag::Cos => kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.cos(o, x)),
        OpTag::Step => kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.step(o, x)),
        OpTag::Softmax => {
            kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.softmax(o, x))
        }
        // Not a real derivative: wired to the same kernel as `Softmax`, preserved as-is.
        OpTag::SoftmaxDv => {
            kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.softmax_dv(o, x))
        }
        OpTag::Sigmoid => {
            kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.sigmoid(o, x))
        }
        OpTag::SigmoidDv => {
            kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.sigmoid_dv(o, x))
        }
        OpTag::HardSigmoid => {
            kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.hard_sigmoid(o, x))
        }
        OpTag::Silu => kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.silu(o, x)),
        OpTag::SiluDv => {
            kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.silu_dv(o, x))
        }
        OpTag::Tanh => kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.tanh(o, x)),
        OpTag::TanhDv => {
            kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.tanh_dv(o, x))
        }
        OpTag::Relu => kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.relu(o, x)),
        OpTag::ReluDv => {
            kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.relu_dv(o, x))
        }
        OpTag::Gelu => kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.gelu(o, x)),
        OpTag::GeluDv => {
            kernels::unary(engine, worker_idx, worker_count, node, x(), |e, o, x| e.gelu_dv(o, x))
        }

        OpTag::Add => kernels::binary(engine, worker_idx, worker_count, node, x(), y(), |e, o, x, y| e.add(o, x, y)),
        OpTag::Sub => kernels::binary(engine, worker_idx, worker_count, node, x(), y(), |e, o, x, y| e.sub(o, x, y)),
        OpTag::Mul => kernels::binary(engine, worker_idx, worker_count, node, x(), y(), |e, o, x, y| e.mul(o, x, y)),
        OpTag::Div => kernels::binary(engine, worker_idx, worker_count, node, x(), y(), |e, o, x, y| e.div(o, x, y)),

        OpTag::Adds => {
            let s = node.op_params.scalar;
            kernels::unary_scalar(engine, worker_idx, worker_count, node, x(), s, |e, o, x, s| e.adds(o, x, s))
        }
        OpTag::Subs => {
            let s = node.op_params.scalar;
            kernels::unary_scalar(engine, worker_idx, worker_count, node, x(), s, |e, o, x, s| e.subs(o, x, s))
        }
        OpTag::Muls => {
            let s = node.op_params.scalar;
            kernels::unary_scalar(engine, worker_idx, worker_count, node, x(), s, |e, o, x, s| e.muls(o, x, s))
        }
        OpTag::Divs => {
            let s = node.op_params.scalar;
            kernels::unary_scalar(engine, worker_idx, worker_count, node, x(), s, |e, o, x, s| e.divs(o, x, s))
        }

        OpTag::Matmul => kernels::matmul(worker_idx, worker_count, node, x(), y()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MathMode;
    use crate::storage::Storage;
    use crate::tensor::{OpParams, TensorRef, MAX_DIMS};

    fn tensor(shape: [i64; MAX_DIMS], data: &[f32]) -> Tensor {
        let storage = Storage::alloc(data.len() * std::mem::size_of::<f32>());
        let bytes = unsafe {
            std::slice::from_raw_parts(data.as_ptr() as *const u8, std::mem::size_of_val(data))
        };
        storage.copy_in(0, bytes);
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

    #[test]
    fn relu_dispatches_through_match() {
        let engine = VectorEngine::new(MathMode::Precise);
        let x: TensorRef = std::sync::Arc::new(tensor([4, 1, 1, 1, 1, 1], &[-1.0, 2.0, -3.0, 4.0]));
        let mut r = tensor([4, 1, 1, 1, 1, 1], &[0.0; 4]);
        r.op = OpTag::Relu;
        r.op_inputs = [Some(x), None];
        execute_forward(&engine, 0, 1, &r);
        assert_eq!(unsafe { r.as_slice() }, &[0.0, 2.0, 0.0, 4.0]);
    }

    #[test]
    fn nop_does_nothing() {
        let engine = VectorEngine::new(MathMode::Precise);
        let mut r = tensor([2, 1, 1, 1, 1, 1], &[7.0, 8.0]);
        r.op = OpTag::Nop;
        execute_forward(&engine, 0, 1, &r);
        assert_eq!(unsafe { r.as_slice() }, &[7.0, 8.0]);
    }

    #[test]
    #[should_panic]
    fn silu_dv_panics_through_dispatch() {
        let engine = VectorEngine::new(MathMode::Precise);
        let x: TensorRef = std::sync::Arc::new(tensor([1, 1, 1, 1, 1, 1], &[1.0]));
        let mut r = tensor([1, 1, 1, 1, 1, 1], &[0.0]);
        r.op = OpTag::SiluDv;
        r.op_inputs = [Some(x), None];
        execute_forward(&engine, 0, 1, &r);
    }
}
