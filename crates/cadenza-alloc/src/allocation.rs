use std::{fmt, sync::Arc};

use crate::pool::PoolInner;

/// Pool-assigned identity of an [`Allocation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocationId(pub(crate) u64);

impl AllocationId {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// One fixed-length block of pooled memory.
///
/// An `Allocation` is not `Clone`: exactly one owner holds it at a time.
/// Dropping it returns the block to the pool that issued it.
pub struct Allocation {
    id: AllocationId,
    data: Box<[u8]>,
    pool: Arc<PoolInner>,
}

impl Allocation {
    pub(crate) fn new(id: AllocationId, data: Box<[u8]>, pool: Arc<PoolInner>) -> Self {
        Self { id, data, pool }
    }

    #[must_use]
    pub fn id(&self) -> AllocationId {
        self.id
    }

    /// Block length. Always the pool's `individual_allocation_length`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub(crate) fn belongs_to(&self, pool: &Arc<PoolInner>) -> bool {
        Arc::ptr_eq(&self.pool, pool)
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.put(self.id, data);
    }
}

impl fmt::Debug for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocation")
            .field("id", &self.id)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Singly-linked chain of allocations backing one logical buffered region.
#[derive(Debug)]
pub struct AllocationNode {
    allocation: Allocation,
    next: Option<Box<AllocationNode>>,
}

impl AllocationNode {
    #[must_use]
    pub fn new(allocation: Allocation) -> Self {
        Self {
            allocation,
            next: None,
        }
    }

    /// Build a chain preserving iteration order. Returns `None` for no blocks.
    pub fn from_allocations<I>(allocations: I) -> Option<Self>
    where
        I: IntoIterator<Item = Allocation>,
        I::IntoIter: DoubleEndedIterator,
    {
        let mut head: Option<Box<AllocationNode>> = None;
        for allocation in allocations.into_iter().rev() {
            head = Some(Box::new(AllocationNode {
                allocation,
                next: head,
            }));
        }
        head.map(|node| *node)
    }

    #[must_use]
    pub fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    #[must_use]
    pub fn next(&self) -> Option<&AllocationNode> {
        self.next.as_deref()
    }

    #[must_use]
    pub fn iter(&self) -> NodeIter<'_> {
        NodeIter { node: Some(self) }
    }

    /// Number of blocks in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// A chain always holds at least one block.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Total capacity of the chain in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.iter().map(Allocation::len).sum()
    }

    /// Copy the first `len` bytes of the chain into a contiguous buffer.
    #[must_use]
    pub fn read_to_vec(&self, len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        for allocation in self.iter() {
            let remaining = len - out.len();
            if remaining == 0 {
                break;
            }
            let take = remaining.min(allocation.len());
            out.extend_from_slice(&allocation.data()[..take]);
        }
        out
    }

    /// Unlink the chain into its blocks, in order.
    #[must_use]
    pub fn into_allocations(self) -> Vec<Allocation> {
        let mut out = Vec::new();
        let mut cursor = Some(Box::new(self));
        while let Some(node) = cursor {
            let AllocationNode { allocation, next } = *node;
            out.push(allocation);
            cursor = next;
        }
        out
    }
}

/// Iterator over the blocks of an [`AllocationNode`].
pub struct NodeIter<'a> {
    node: Option<&'a AllocationNode>,
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = &'a Allocation;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node?;
        self.node = node.next();
        Some(&node.allocation)
    }
}
