use crate::{Allocation, AllocationNode};

/// Append-only writer over a growing chain of blocks.
///
/// The writer never allocates on its own: callers push blocks obtained from
/// an [`Allocator`](crate::Allocator) whenever [`remaining`](Self::remaining)
/// drops to zero. Dropping the writer returns every block to its pool.
#[derive(Debug)]
pub struct AllocationWriter {
    block_len: usize,
    blocks: Vec<Allocation>,
    written: usize,
}

impl AllocationWriter {
    #[must_use]
    pub fn new(block_len: usize) -> Self {
        Self {
            block_len,
            blocks: Vec::new(),
            written: 0,
        }
    }

    /// Number of blocks needed to hold `bytes`.
    #[must_use]
    pub fn blocks_for(&self, bytes: u64) -> usize {
        let bytes = usize::try_from(bytes).unwrap_or(usize::MAX);
        bytes.div_ceil(self.block_len.max(1))
    }

    pub fn push_block(&mut self, allocation: Allocation) {
        self.blocks.push(allocation);
    }

    /// Free bytes left in the chain.
    #[must_use]
    pub fn remaining(&self) -> usize {
        let capacity: usize = self.blocks.iter().map(Allocation::len).sum();
        capacity - self.written
    }

    /// Copy as much of `buf` as fits, returning the number of bytes taken.
    pub fn write(&mut self, buf: &[u8]) -> usize {
        let mut taken = 0;
        while taken < buf.len() {
            let block_index = self.written / self.block_len;
            let offset = self.written % self.block_len;
            let Some(block) = self.blocks.get_mut(block_index) else {
                break;
            };
            let n = (buf.len() - taken).min(self.block_len - offset);
            block.data_mut()[offset..offset + n].copy_from_slice(&buf[taken..taken + n]);
            taken += n;
            self.written += n;
        }
        taken
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.written as u64
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Hand the blocks over as a chain. `None` if no block was pushed.
    #[must_use]
    pub fn into_node(self) -> Option<AllocationNode> {
        AllocationNode::from_allocations(self.blocks)
    }
}
