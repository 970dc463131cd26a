use thiserror::Error;

/// Result type for the Tessera API.
pub type Result<T> = std::result::Result<T, Error>;

/// Any error raised by a Tessera component.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Graph construction or validation failed.
    #[error(transparent)]
    Graph(#[from] tessera_core::GraphError),

    /// Caller data disagrees with its descriptor.
    #[error(transparent)]
    Tensor(#[from] tessera_core::TensorError),

    /// A backend could not be registered or refused a layer.
    #[error(transparent)]
    Backend(#[from] tessera_backends::BackendError),

    /// Optimization failed.
    #[error(transparent)]
    Optimize(#[from] tessera_graph::OptimizeError),

    /// Loading or execution failed.
    #[error(transparent)]
    Runtime(#[from] tessera_runtime::RuntimeError),
}
