use std::{
    pin::pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::{
    Allocation, AllocationId, AllocationNode,
    error::{AllocError, AllocResult},
    options::AllocatorOptions,
};

/// Source of fixed-length [`Allocation`]s.
///
/// Implementations are shared between load workers and the control context,
/// so every method takes `&self` and must keep critical sections short.
#[async_trait]
pub trait Allocator: Send + Sync {
    /// Obtain a block, stalling the calling thread while the pool sits at its
    /// hard ceiling.
    fn allocate(&self) -> Allocation;

    /// Obtain a block without stalling.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Exhausted`] when the hard ceiling is reached.
    fn try_allocate(&self) -> AllocResult<Allocation>;

    /// Obtain a block, awaiting capacity at the hard ceiling.
    async fn allocate_async(&self) -> Allocation;

    /// Return a block to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::ForeignAllocation`] if the block was issued by a
    /// different pool. The block still goes back to its own pool.
    fn release(&self, allocation: Allocation) -> AllocResult<()>;

    /// Return a whole chain to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::ForeignAllocation`] for the first block that was
    /// issued by a different pool.
    fn release_node(&self, node: AllocationNode) -> AllocResult<()>;

    /// Shed free blocks above the current target back to the system.
    fn trim(&self);

    /// Bytes held by outstanding blocks.
    fn total_bytes_allocated(&self) -> usize;

    fn individual_allocation_length(&self) -> usize;
}

struct PoolState {
    free: Vec<Box<[u8]>>,
    outstanding: usize,
    next_id: u64,
    target_buffer_bytes: usize,
}

pub(crate) struct PoolInner {
    individual_allocation_length: usize,
    initial_allocation_count: usize,
    max_blocks: Option<usize>,
    state: Mutex<PoolState>,
    capacity: Condvar,
    released: Notify,
    outstanding_bytes: AtomicUsize,
}

impl PoolInner {
    fn has_capacity(&self, state: &PoolState) -> bool {
        self.max_blocks.is_none_or(|max| state.outstanding < max)
    }

    /// Reserve a slot while holding the lock. Fresh memory is created by the
    /// caller after the lock is dropped.
    fn reserve(&self, state: &mut PoolState) -> (AllocationId, Option<Box<[u8]>>) {
        let id = AllocationId(state.next_id);
        state.next_id += 1;
        state.outstanding += 1;
        self.outstanding_bytes.store(
            state.outstanding * self.individual_allocation_length,
            Ordering::Release,
        );

        let outstanding_bytes = state.outstanding * self.individual_allocation_length;
        if outstanding_bytes > state.target_buffer_bytes {
            trace!(
                outstanding_bytes,
                target = state.target_buffer_bytes,
                "allocating beyond target buffer size"
            );
        }
        (id, state.free.pop())
    }

    /// Return a block. Called from [`Allocation`]'s `Drop`, so it runs exactly
    /// once per block.
    pub(crate) fn put(&self, id: AllocationId, data: Box<[u8]>) {
        {
            let mut state = self.state.lock();
            debug_assert!(state.outstanding > 0, "release without outstanding block");
            state.outstanding = state.outstanding.saturating_sub(1);
            self.outstanding_bytes.store(
                state.outstanding * self.individual_allocation_length,
                Ordering::Release,
            );
            if data.len() == self.individual_allocation_length {
                state.free.push(data);
            }
        }
        trace!(id = id.get(), "allocation returned to pool");
        self.capacity.notify_one();
        self.released.notify_waiters();
    }
}

/// Default [`Allocator`] backed by a single free list.
///
/// Cloning is cheap and yields a handle to the same pool.
#[derive(Clone)]
pub struct DefaultAllocator {
    inner: Arc<PoolInner>,
}

impl DefaultAllocator {
    /// Create a pool.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidLength`] for a zero block length.
    pub fn new(options: AllocatorOptions) -> AllocResult<Self> {
        let len = options.individual_allocation_length;
        if len == 0 {
            return Err(AllocError::InvalidLength(len));
        }

        let free = (0..options.initial_allocation_count)
            .map(|_| vec![0u8; len].into_boxed_slice())
            .collect();
        let max_blocks = options.max_total_bytes.map(|bytes| (bytes / len).max(1));

        debug!(
            individual_allocation_length = len,
            initial = options.initial_allocation_count,
            target = options.target_buffer_bytes,
            ?max_blocks,
            "allocation pool created"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                individual_allocation_length: len,
                initial_allocation_count: options.initial_allocation_count,
                max_blocks,
                state: Mutex::new(PoolState {
                    free,
                    outstanding: 0,
                    next_id: 0,
                    target_buffer_bytes: options.target_buffer_bytes,
                }),
                capacity: Condvar::new(),
                released: Notify::new(),
                outstanding_bytes: AtomicUsize::new(0),
            }),
        })
    }

    fn finish(&self, id: AllocationId, data: Option<Box<[u8]>>) -> Allocation {
        let data =
            data.unwrap_or_else(|| vec![0u8; self.inner.individual_allocation_length].into());
        Allocation::new(id, data, Arc::clone(&self.inner))
    }

    /// Change the soft target. Lowering it trims immediately.
    pub fn set_target_buffer_size(&self, bytes: usize) {
        let lowered = {
            let mut state = self.inner.state.lock();
            let lowered = bytes < state.target_buffer_bytes;
            state.target_buffer_bytes = bytes;
            lowered
        };
        if lowered {
            self.trim();
        }
    }

    /// Drop the target to zero and shed everything above the initial blocks.
    pub fn reset(&self) {
        self.set_target_buffer_size(0);
    }

    #[must_use]
    pub fn target_buffer_size(&self) -> usize {
        self.inner.state.lock().target_buffer_bytes
    }

    /// Bytes held by free blocks kept for reuse.
    #[must_use]
    pub fn retained_bytes(&self) -> usize {
        self.inner.state.lock().free.len() * self.inner.individual_allocation_length
    }

    #[must_use]
    pub fn outstanding_count(&self) -> usize {
        self.inner.state.lock().outstanding
    }
}

#[async_trait]
impl Allocator for DefaultAllocator {
    fn allocate(&self) -> Allocation {
        let (id, data) = {
            let mut state = self.inner.state.lock();
            while !self.inner.has_capacity(&state) {
                debug!(
                    outstanding = state.outstanding,
                    "allocation pool at ceiling, waiting for release"
                );
                self.inner.capacity.wait(&mut state);
            }
            self.inner.reserve(&mut state)
        };
        self.finish(id, data)
    }

    fn try_allocate(&self) -> AllocResult<Allocation> {
        let (id, data) = {
            let mut state = self.inner.state.lock();
            if !self.inner.has_capacity(&state) {
                let limit_bytes = state.outstanding * self.inner.individual_allocation_length;
                return Err(AllocError::Exhausted { limit_bytes });
            }
            self.inner.reserve(&mut state)
        };
        Ok(self.finish(id, data))
    }

    async fn allocate_async(&self) -> Allocation {
        loop {
            let mut notified = pin!(self.inner.released.notified());
            notified.as_mut().enable();
            if let Ok(allocation) = self.try_allocate() {
                return allocation;
            }
            notified.await;
        }
    }

    fn release(&self, allocation: Allocation) -> AllocResult<()> {
        if !allocation.belongs_to(&self.inner) {
            return Err(AllocError::ForeignAllocation {
                id: allocation.id(),
            });
        }
        drop(allocation);
        Ok(())
    }

    fn release_node(&self, node: AllocationNode) -> AllocResult<()> {
        let mut result = Ok(());
        for allocation in node.into_allocations() {
            if result.is_ok() && !allocation.belongs_to(&self.inner) {
                result = Err(AllocError::ForeignAllocation {
                    id: allocation.id(),
                });
            }
        }
        result
    }

    fn trim(&self) {
        let shed = {
            let mut state = self.inner.state.lock();
            let len = self.inner.individual_allocation_length;
            let target_blocks = state.target_buffer_bytes.div_ceil(len);
            let keep = target_blocks
                .saturating_sub(state.outstanding)
                .max(self.inner.initial_allocation_count);
            if state.free.len() <= keep {
                return;
            }
            state.free.split_off(keep)
        };
        debug!(shed = shed.len(), "trimmed allocation pool");
    }

    fn total_bytes_allocated(&self) -> usize {
        self.inner.outstanding_bytes.load(Ordering::Acquire)
    }

    fn individual_allocation_length(&self) -> usize {
        self.inner.individual_allocation_length
    }
}
