//! Error types for the CPU execution backend.
//!
//! Programmer-contract violations (shape mismatch, unsupported operator,
//! allocation failure, bounds violations) are not modeled here: they panic,
//! per the fatal-error policy described in the crate's design notes. Only
//! the handful of boundaries where a caller can make a legitimate runtime
//! decision return a typed error.

use thiserror::Error;

/// Errors returned across the device facade's fallible boundaries.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// `execute_backward` was called. The backward dispatch table is a
    /// verbatim duplicate of the forward table in the source this crate is
    /// descended from; rather than silently run forward kernels under a
    /// "backward" label, this is surfaced as an explicit error.
    #[error("backward execution is not implemented for op {op:?}")]
    BackwardUnimplemented {
        /// The operator tag of the node that was submitted.
        op: crate::tensor::OpTag,
    },

    /// Spawning a worker OS thread failed during pool construction.
    #[error("failed to spawn worker thread {index}: {source}")]
    ThreadSpawn {
        /// Index of the worker whose thread failed to spawn.
        index: u32,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backward_unimplemented_message_names_op() {
        let err = DeviceError::BackwardUnimplemented {
            op: crate::tensor::OpTag::Add,
        };
        assert!(err.to_string().contains("Add"));
    }
}
