//! Runtime configuration

use keel_gc::GcConfig;

use crate::args::DEFAULT_MAX_ARGUMENT_DEPTH;
use crate::continuation::DEFAULT_MAX_DEPTH;

/// Default longest accepted type name, in bytes
pub const DEFAULT_MAX_TYPE_NAME_LEN: usize = 256;

/// Configuration for a [`Runtime`](crate::runtime::Runtime)
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Collector thresholds and heap limit
    pub gc: GcConfig,
    /// Maximum number of values on the argument stack
    pub max_argument_depth: usize,
    /// Maximum guard nesting
    pub max_continuation_depth: usize,
    /// Longest accepted type name, in bytes
    pub max_type_name_len: usize,
    /// Collect before an allocation once the heap passes the GC threshold
    pub auto_collect: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gc: GcConfig::default(),
            max_argument_depth: DEFAULT_MAX_ARGUMENT_DEPTH,
            max_continuation_depth: DEFAULT_MAX_DEPTH,
            max_type_name_len: DEFAULT_MAX_TYPE_NAME_LEN,
            auto_collect: false,
        }
    }
}

impl RuntimeConfig {
    /// Create config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set collector config
    pub fn gc(mut self, gc: GcConfig) -> Self {
        self.gc = gc;
        self
    }

    /// Set the accounted heap limit in bytes
    pub fn heap_limit(mut self, bytes: usize) -> Self {
        self.gc = self.gc.heap_limit(bytes);
        self
    }

    /// Set the automatic collection threshold in bytes
    pub fn gc_threshold(mut self, bytes: usize) -> Self {
        self.gc = self.gc.gc_threshold(bytes);
        self
    }

    /// Set maximum argument stack depth
    pub fn max_argument_depth(mut self, depth: usize) -> Self {
        self.max_argument_depth = depth;
        self
    }

    /// Set maximum guard nesting
    pub fn max_continuation_depth(mut self, depth: usize) -> Self {
        self.max_continuation_depth = depth;
        self
    }

    /// Set longest accepted type name
    pub fn max_type_name_len(mut self, len: usize) -> Self {
        self.max_type_name_len = len;
        self
    }

    /// Enable or disable collection before allocation
    pub fn auto_collect(mut self, enabled: bool) -> Self {
        self.auto_collect = enabled;
        self
    }
}
