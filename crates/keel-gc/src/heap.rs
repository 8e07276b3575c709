//! GC configuration

/// Default collection threshold (1MB)
const DEFAULT_GC_THRESHOLD: usize = 1024 * 1024;

/// GC configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcConfig {
    /// Live bytes at which [`should_gc`](crate::AllocationRegistry::should_gc)
    /// starts reporting true (default: 1MB)
    pub gc_threshold: usize,
    /// Hard cap on live bytes; allocations past it fail (default: unlimited)
    pub heap_limit: usize,
    /// Slot capacity reserved up front (default: 0)
    pub initial_slots: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            gc_threshold: DEFAULT_GC_THRESHOLD,
            heap_limit: usize::MAX,
            initial_slots: 0,
        }
    }
}

impl GcConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the collection threshold
    pub fn gc_threshold(mut self, bytes: usize) -> Self {
        self.gc_threshold = bytes;
        self
    }

    /// Set the hard heap limit
    pub fn heap_limit(mut self, bytes: usize) -> Self {
        self.heap_limit = bytes;
        self
    }

    /// Reserve slot capacity up front
    pub fn initial_slots(mut self, slots: usize) -> Self {
        self.initial_slots = slots;
        self
    }
}
