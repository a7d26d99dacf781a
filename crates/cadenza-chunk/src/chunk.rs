use std::{sync::Arc, time::Duration};

use cadenza_alloc::{AllocResult, AllocationNode, Allocator};
use cadenza_net::DataSpec;

use crate::format::{DataType, Format, SelectionReason};

/// A chunk that can be fetched but has not been loaded.
#[derive(Clone, Debug)]
pub struct ChunkDescriptor {
    pub format: Arc<Format>,
    pub track_index: usize,
    /// Segment index within the track's timeline.
    pub chunk_index: usize,
    pub start: Duration,
    pub end: Duration,
    pub data_spec: DataSpec,
    pub data_type: DataType,
    pub selection_reason: SelectionReason,
    /// Base location the data spec was resolved against.
    pub location_index: usize,
}

impl ChunkDescriptor {
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    pub fn byte_length(&self) -> Option<u64> {
        self.data_spec.length()
    }

    /// Bitrate implied by the declared length, if both length and duration
    /// are known.
    pub fn bitrate(&self) -> Option<u64> {
        bitrate_of(self.byte_length()?, self.duration())
    }
}

pub(crate) fn bitrate_of(bytes: u64, duration: Duration) -> Option<u64> {
    let secs = duration.as_secs_f64();
    (secs > 0.0).then(|| ((bytes as f64) * 8.0 / secs).round() as u64)
}

/// A loaded chunk, owning the allocation chain holding its bytes.
#[derive(Debug)]
pub struct MediaChunk {
    descriptor: ChunkDescriptor,
    data: Option<AllocationNode>,
    bytes_loaded: u64,
}

impl MediaChunk {
    pub fn new(
        descriptor: ChunkDescriptor,
        data: Option<AllocationNode>,
        bytes_loaded: u64,
    ) -> Self {
        Self {
            descriptor,
            data,
            bytes_loaded,
        }
    }

    pub fn descriptor(&self) -> &ChunkDescriptor {
        &self.descriptor
    }

    pub fn format(&self) -> &Arc<Format> {
        &self.descriptor.format
    }

    pub fn track_index(&self) -> usize {
        self.descriptor.track_index
    }

    pub fn chunk_index(&self) -> usize {
        self.descriptor.chunk_index
    }

    pub fn start_time(&self) -> Duration {
        self.descriptor.start
    }

    pub fn end_time(&self) -> Duration {
        self.descriptor.end
    }

    pub fn duration(&self) -> Duration {
        self.descriptor.duration()
    }

    pub fn bytes_loaded(&self) -> u64 {
        self.bytes_loaded
    }

    pub fn data(&self) -> Option<&AllocationNode> {
        self.data.as_ref()
    }

    /// Copy the loaded bytes out of the chain.
    pub fn read_to_vec(&self) -> Vec<u8> {
        let len = usize::try_from(self.bytes_loaded).unwrap_or(usize::MAX);
        self.data
            .as_ref()
            .map(|node| node.read_to_vec(len))
            .unwrap_or_default()
    }

    /// Return the chain to `allocator`.
    ///
    /// # Errors
    ///
    /// Propagates [`AllocError::ForeignAllocation`](cadenza_alloc::AllocError)
    /// when the chain came from another pool.
    pub fn release(mut self, allocator: &dyn Allocator) -> AllocResult<()> {
        match self.data.take() {
            Some(node) => allocator.release_node(node),
            None => Ok(()),
        }
    }
}
