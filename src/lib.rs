//! CPU execution backend for a small tensor/autograd engine: elementwise,
//! reduction, broadcast-binary and matmul kernels over dense float32
//! N-dimensional tensors, dispatched across a fixed bulk-synchronous
//! worker pool.
//!
//! The [`Device`] facade is the entry point: construct one from a
//! [`DeviceDescriptor`], allocate storage for tensors, and call
//! [`Device::execute_forward`] with a populated node.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod kernels;
pub mod pool;
pub mod simd;
pub mod storage;
pub mod tensor;

pub use config::{DeviceDescriptor, MathMode};
pub use error::DeviceError;
pub use pool::ThreadPool;
pub use simd::{SimdLevel, VectorEngine};
pub use storage::{Storage, StorageHandle};
pub use tensor::{OpParams, OpTag, Tensor, TensorRef, MAX_DIMS};

#[derive(Clone, Copy)]
struct SendPtr {
    node: *const Tensor,
    engine: *const VectorEngine,
}

// SAFETY: only ever dereferenced while `Device::execute_forward` blocks on
// the pool barrier that outlives every worker's use of these pointers.
unsafe impl Send for SendPtr {}
unsafe impl Sync for SendPtr {}

/// The CPU execution backend: owns the detected vector engine and the
/// worker pool, and is the sole entry point callers dispatch tensor
/// operations through.
pub struct Device {
    engine: VectorEngine,
    pool: ThreadPool,
}

impl Device {
    /// Builds a device from `descriptor`. `thread_count: 0` picks up
    /// `num_cpus::get()`.
    pub fn new(descriptor: DeviceDescriptor) -> Result<Device, DeviceError> {
        let thread_count = if descriptor.thread_count == 0 {
            num_cpus::get() as u32
        } else {
            descriptor.thread_count
        };
        let engine = VectorEngine::new(descriptor.math_mode);
        let pool = ThreadPool::with_workers(thread_count)?;
        tracing::info!(
            thread_count,
            level = ?engine.level(),
            math_mode = ?descriptor.math_mode,
            "device initialized"
        );
        Ok(Device { engine, pool })
    }

    pub fn worker_count(&self) -> u32 {
        self.pool.worker_count()
    }

    pub fn math_mode(&self) -> MathMode {
        self.engine.math_mode()
    }

    pub fn simd_level(&self) -> SimdLevel {
        self.engine.level()
    }

    /// Allocates a zero-initialized storage buffer of `size` bytes.
    pub fn alloc_storage(&self, size: usize) -> Storage {
        Storage::alloc(size)
    }

    /// Dispatches `node`'s operator across the worker pool's current phase.
    pub fn execute_forward(&self, node: &Tensor) {
        tracing::trace!(op = ?node.op, numel = node.numel(), "dispatching forward op");
        // SAFETY: `parallel_for` blocks until every worker has finished this
        // phase before returning, so `node`/`self.engine` outlive every use
        // the closure makes of them despite the `'static` + `Send` + `Sync`
        // bounds the pool's persistent worker threads require on stored jobs.
        let args = SendPtr {
            node: node as *const Tensor,
            engine: &self.engine as *const VectorEngine,
        };
        self.pool.parallel_for(move |worker_idx, worker_count| {
            let node = unsafe { &*args.node };
            let engine = unsafe { &*args.engine };
            dispatch::execute_forward(engine, worker_idx, worker_count, node);
        });
    }

    /// Always returns [`DeviceError::BackwardUnimplemented`]. The backward
    /// dispatch table in this crate's lineage is a verbatim duplicate of
    /// the forward table and its entry point never consults it; rather than
    /// reconstruct dead code, backward execution is simply not implemented.
    pub fn execute_backward(&self, node: &Tensor) -> Result<(), DeviceError> {
        Err(DeviceError::BackwardUnimplemented { op: node.op })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn device_reports_descriptor_thread_count() {
        let device = Device::new(DeviceDescriptor {
            thread_count: 3,
            math_mode: MathMode::Precise,
        })
        .unwrap();
        assert_eq!(device.worker_count(), 3);
    }

    #[test]
    fn zero_thread_count_falls_back_to_hardware_concurrency() {
        let device = Device::new(DeviceDescriptor {
            thread_count: 0,
            math_mode: MathMode::Precise,
        })
        .unwrap();
        assert!(device.worker_count() >= 1);
    }

    #[test]
    fn execute_forward_runs_relu_through_the_pool() {
        let device = Device::new(DeviceDescriptor {
            thread_count: 2,
            math_mode: MathMode::Precise,
        })
        .unwrap();
        let x: TensorRef = std::sync::Arc::new(tensor([4, 1, 1, 1, 1, 1], &[-1.0, 2.0, -3.0, 4.0]));
        let mut r = tensor([4, 1, 1, 1, 1, 1], &[0.0; 4]);
        r.op = OpTag::Relu;
        r.op_inputs = [Some(x), None];
        device.execute_forward(&r);
        assert_eq!(unsafe { r.as_slice() }, &[0.0, 2.0, 0.0, 4.0]);
    }

    #[test]
    fn execute_backward_always_errors() {
        let device = Device::new(DeviceDescriptor {
            thread_count: 1,
            math_mode: MathMode::Precise,
        })
        .unwrap();
        let r = tensor([1, 1, 1, 1, 1, 1], &[0.0]);
        let err = device.execute_backward(&r).unwrap_err();
        assert!(matches!(err, DeviceError::BackwardUnimplemented { op: OpTag::Nop }));
    }
}
