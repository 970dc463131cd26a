//! Tessera Backends
//!
//! This crate defines the contract between the graph optimizer, the
//! runtime and the compute backends that execute layers:
//! - **Backend**: capability queries and the workload factory
//! - **Workload**: an executable unit bound to one layer's descriptors
//! - **Registry**: the process's table of backends and immutable
//!   [`DeviceSpec`] snapshots of it
//! - **CpuRef**: scalar reference kernels for every layer kind and type
//! - **CpuAcc**: data-parallel Float32 kernels on a `rayon` pool
//!
//! ## Example
//!
//! ```rust
//! use tessera_backends::{create_default_registry, Backend};
//! use tessera_core::{Compute, DataType, LayerKind, TensorInfo};
//!
//! let registry = create_default_registry()?;
//! let acc = registry.get(&Compute::CpuAcc.into()).expect("registered");
//!
//! let q = TensorInfo::new_quantized([4], DataType::QAsymmU8, 0.5, 0);
//! assert!(acc
//!     .is_layer_supported(&LayerKind::Addition, &[q.clone(), q.clone()], &[q])
//!     .is_err());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod accelerated;
pub mod backend;
pub mod error;
mod kernels;
pub mod reference;
pub mod registry;

pub use accelerated::{CpuAccBackend, CpuAccOptions};
pub use backend::{Backend, BackendCapabilities, Workload, WorkloadDescriptor};
pub use error::{BackendError, Result, WorkloadError};
pub use reference::CpuRefBackend;
pub use registry::{create_default_registry, BackendRegistry, DeviceSpec};
