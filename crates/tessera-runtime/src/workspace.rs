//! Intermediate tensor storage for one loaded network.

use tessera_core::{TensorBuffer, TensorInfo};

/// Index of a region in a [`TensorWorkspace`].
pub(crate) type RegionId = usize;

/// One buffer per output slot in the network, sized exactly to its
/// descriptor and reused across calls.
#[derive(Debug, Default)]
pub(crate) struct TensorWorkspace {
    regions: Vec<TensorBuffer>,
}

impl TensorWorkspace {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Allocate a zeroed region for `info`.
    pub(crate) fn allocate(&mut self, info: &TensorInfo) -> RegionId {
        self.regions.push(TensorBuffer::zeros(info));
        self.regions.len() - 1
    }

    pub(crate) fn region(&self, id: RegionId) -> &TensorBuffer {
        &self.regions[id]
    }

    pub(crate) fn region_mut(&mut self, id: RegionId) -> &mut TensorBuffer {
        &mut self.regions[id]
    }

    /// Move a region out, leaving an empty placeholder until
    /// [`Self::restore`] puts it back.
    pub(crate) fn take(&mut self, id: RegionId) -> TensorBuffer {
        std::mem::take(&mut self.regions[id])
    }

    pub(crate) fn restore(&mut self, id: RegionId, buffer: TensorBuffer) {
        self.regions[id] = buffer;
    }

    pub(crate) fn len(&self) -> usize {
        self.regions.len()
    }

    /// Bytes held by all regions.
    pub(crate) fn total_bytes(&self) -> usize {
        self.regions.iter().map(TensorBuffer::byte_len).sum()
    }
}
