//! Data-parallel CPU backend.
//!
//! Runs Float32 elementwise layers on a private `rayon` thread pool.
//! Everything else is declined so the optimizer falls back to another
//! backend.

mod backend;
mod workloads;

pub use backend::{CpuAccBackend, CpuAccOptions};
pub use workloads::{AccActivationWorkload, AccElementwiseWorkload};
