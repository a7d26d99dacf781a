use std::{sync::Arc, time::Duration};

use cadenza_alloc::Allocator;
use cadenza_chunk::{ChunkDescriptor, MediaChunk};
use tracing::trace;

use crate::error::{LoaderError, LoaderResult};

/// Loaded chunks waiting to be consumed, in media-time order.
///
/// The queue owns its chunks. Removing a chunk for any reason other than
/// [`pop_front`](Self::pop_front) returns its allocations to the pool.
pub struct ChunkQueue {
    chunks: Vec<MediaChunk>,
    allocator: Arc<dyn Allocator>,
}

impl ChunkQueue {
    pub fn new(allocator: Arc<dyn Allocator>) -> Self {
        Self {
            chunks: Vec::new(),
            allocator,
        }
    }

    pub fn chunks(&self) -> &[MediaChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn first(&self) -> Option<&MediaChunk> {
        self.chunks.first()
    }

    pub fn last(&self) -> Option<&MediaChunk> {
        self.chunks.last()
    }

    /// End of the last queued chunk.
    pub fn buffered_end(&self) -> Option<Duration> {
        self.chunks.last().map(MediaChunk::end_time)
    }

    /// Media buffered ahead of `position`.
    pub fn buffered_duration(&self, position: Duration) -> Duration {
        self.buffered_end()
            .map_or(Duration::ZERO, |end| end.saturating_sub(position))
    }

    pub fn bytes_loaded(&self) -> u64 {
        self.chunks.iter().map(MediaChunk::bytes_loaded).sum()
    }

    /// Append a chunk.
    ///
    /// # Errors
    ///
    /// [`LoaderError::OutOfOrder`] if `chunk` starts before the last queued
    /// chunk. The rejected chunk is released.
    pub fn push(&mut self, chunk: MediaChunk) -> LoaderResult<()> {
        if let Some(last) = self.chunks.last()
            && chunk.start_time() < last.start_time()
        {
            let error = LoaderError::OutOfOrder {
                expected: last.start_time(),
                actual: chunk.start_time(),
            };
            chunk.release(self.allocator.as_ref())?;
            return Err(error);
        }
        trace!(
            chunk = chunk.chunk_index(),
            start = ?chunk.start_time(),
            bytes = chunk.bytes_loaded(),
            "chunk queued"
        );
        self.chunks.push(chunk);
        Ok(())
    }

    /// Hand the oldest chunk to the caller, who takes over its allocations.
    pub fn pop_front(&mut self) -> Option<MediaChunk> {
        (!self.chunks.is_empty()).then(|| self.chunks.remove(0))
    }

    /// Keep the first `retain` chunks and release the rest. Returns the
    /// descriptors of the released chunks.
    pub fn discard_upstream(&mut self, retain: usize) -> LoaderResult<Vec<ChunkDescriptor>> {
        if retain >= self.chunks.len() {
            return Ok(Vec::new());
        }
        let removed = self.chunks.split_off(retain);
        let descriptors = removed.iter().map(|c| c.descriptor().clone()).collect();
        self.release_all(removed)?;
        Ok(descriptors)
    }

    /// Release chunks that end at or before `position`. Returns how many.
    pub fn discard_played(&mut self, position: Duration) -> LoaderResult<usize> {
        let played = self.chunks.partition_point(|c| c.end_time() <= position);
        let removed: Vec<_> = self.chunks.drain(..played).collect();
        self.release_all(removed)?;
        Ok(played)
    }

    /// Release every chunk. Returns how many.
    pub fn clear(&mut self) -> LoaderResult<usize> {
        let removed = std::mem::take(&mut self.chunks);
        let count = removed.len();
        self.release_all(removed)?;
        Ok(count)
    }

    fn release_all(&self, chunks: Vec<MediaChunk>) -> LoaderResult<()> {
        let mut result = Ok(());
        for chunk in chunks {
            if let Err(e) = chunk.release(self.allocator.as_ref())
                && result.is_ok()
            {
                result = Err(e.into());
            }
        }
        result
    }
}
