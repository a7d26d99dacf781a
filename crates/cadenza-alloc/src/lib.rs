//! Fixed-block allocation pool for media chunk storage.
//!
//! Every block handed out by a [`DefaultAllocator`] has the same length
//! (`individual_allocation_length`). Loads that need more room chain several
//! blocks together through an [`AllocationNode`], usually built with an
//! [`AllocationWriter`] while bytes stream in.
//!
//! ## Features
//!
//! - **Conservation**: [`Allocator::total_bytes_allocated`] always equals the
//!   number of outstanding blocks times the block length
//! - **RAII**: a block that is dropped without an explicit release still goes
//!   back to the pool that issued it, exactly once
//! - **Soft target / hard ceiling**: growth past the target buffer size is
//!   logged and tolerated; growth past `max_total_bytes` stalls the caller
//! - **Trim**: excess free blocks can be shed back to the system allocator
//!
//! ## Example
//!
//! ```
//! use cadenza_alloc::{AllocationWriter, Allocator, AllocatorOptions, DefaultAllocator};
//!
//! let allocator = DefaultAllocator::new(AllocatorOptions::default()).unwrap();
//! let mut writer = AllocationWriter::new(allocator.individual_allocation_length());
//! for _ in 0..writer.blocks_for(200 * 1024) {
//!     writer.push_block(allocator.allocate());
//! }
//! assert_eq!(allocator.total_bytes_allocated(), 256 * 1024);
//!
//! let node = writer.into_node().unwrap();
//! allocator.release_node(node).unwrap();
//! assert_eq!(allocator.total_bytes_allocated(), 0);
//! ```

#![forbid(unsafe_code)]

mod allocation;
mod error;
mod options;
mod pool;
mod writer;

pub use allocation::{Allocation, AllocationId, AllocationNode, NodeIter};
pub use error::{AllocError, AllocResult};
pub use options::AllocatorOptions;
pub use pool::{Allocator, DefaultAllocator};
pub use writer::AllocationWriter;
