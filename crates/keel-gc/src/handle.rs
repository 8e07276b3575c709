//! Generation-checked allocation handles

use std::fmt;

/// Handle to an allocation in an [`AllocationRegistry`](crate::AllocationRegistry).
///
/// The generation is bumped every time a slot is freed, so any handle that
/// outlives its allocation no longer matches the slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Slot generation at the time of allocation
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Pack into a single word (generation in the high half)
    #[inline]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Inverse of [`Handle::to_bits`]
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_roundtrip() {
        let handle = Handle::new(7, 3);
        assert_eq!(Handle::from_bits(handle.to_bits()), handle);
        assert_eq!(handle.to_bits(), (3u64 << 32) | 7);
    }

    #[test]
    fn test_generation_distinguishes() {
        assert_ne!(Handle::new(1, 0), Handle::new(1, 1));
    }
}
