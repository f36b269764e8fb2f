//! Device configuration: worker count and math precision mode.

/// Selects between the portable-but-approximate polynomial transcendental
/// kernels and calling the platform libm directly.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MathMode {
    /// Exact libm calls (`f32::exp`, `f32::ln`, ...).
    Precise,
    /// Bounded polynomial/bit-trick approximations, see [`crate::simd`].
    Approximate,
}

impl Default for MathMode {
    fn default() -> MathMode {
        MathMode::Approximate
    }
}

/// Construction parameters for a [`crate::Device`].
#[derive(Clone, Copy, Debug)]
pub struct DeviceDescriptor {
    /// Number of worker threads in the pool, including the calling thread
    /// (worker 0). `0` means "use hardware concurrency": [`crate::Device::new`]
    /// resolves it via `num_cpus::get()`.
    pub thread_count: u32,
    pub math_mode: MathMode,
}

impl Default for DeviceDescriptor {
    fn default() -> DeviceDescriptor {
        DeviceDescriptor {
            thread_count: num_cpus::get() as u32,
            math_mode: MathMode::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_descriptor_uses_hardware_concurrency() {
        let d = DeviceDescriptor::default();
        assert!(d.thread_count >= 1);
        assert_eq!(d.math_mode, MathMode::Approximate);
    }
}
