//! Portable reference backend.
//!
//! Implements every layer kind for every data type with straightforward
//! scalar kernels. Serves as the fallback when faster backends decline a
//! layer and as the numerical baseline in tests.

mod backend;
mod workloads;

pub use backend::CpuRefBackend;
pub use workloads::{
    RefActivationWorkload, RefConstantWorkload, RefElementwiseWorkload, RefSoftmaxWorkload,
};
