/// Default block length (64 KiB).
const DEFAULT_ALLOCATION_LENGTH: usize = 64 * 1024;

/// Allocation pool configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocatorOptions {
    /// Length of every block handed out by the pool.
    pub individual_allocation_length: usize,
    /// Blocks created up front and never trimmed away.
    pub initial_allocation_count: usize,
    /// Soft target for outstanding bytes. Growth beyond it is tolerated.
    pub target_buffer_bytes: usize,
    /// Hard ceiling for outstanding bytes. `None` means unbounded.
    ///
    /// At the ceiling, `try_allocate` fails and `allocate` stalls until a
    /// block is released.
    pub max_total_bytes: Option<usize>,
}

impl Default for AllocatorOptions {
    fn default() -> Self {
        Self {
            individual_allocation_length: DEFAULT_ALLOCATION_LENGTH,
            initial_allocation_count: 0,
            target_buffer_bytes: 200 * DEFAULT_ALLOCATION_LENGTH,
            max_total_bytes: None,
        }
    }
}

impl AllocatorOptions {
    pub fn with_individual_allocation_length(mut self, len: usize) -> Self {
        self.individual_allocation_length = len;
        self
    }

    pub fn with_initial_allocation_count(mut self, count: usize) -> Self {
        self.initial_allocation_count = count;
        self
    }

    pub fn with_target_buffer_bytes(mut self, bytes: usize) -> Self {
        self.target_buffer_bytes = bytes;
        self
    }

    pub fn with_max_total_bytes(mut self, bytes: usize) -> Self {
        self.max_total_bytes = Some(bytes);
        self
    }
}
