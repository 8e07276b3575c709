//! GC object header

use std::cell::Cell;

/// Mark color for tri-color marking
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkColor {
    /// Not yet visited
    White = 0,
    /// In worklist
    Gray = 1,
    /// Fully scanned
    Black = 2,
}

/// Per-allocation bookkeeping kept beside the payload
#[derive(Debug)]
pub struct GcHeader {
    /// Mark color for the current cycle
    mark: Cell<MarkColor>,
    /// Pins held on this allocation
    pins: u32,
    /// Pins not explained by heap references (scratch for trial deletion)
    external: Cell<u32>,
    /// Accounted size in bytes
    size: usize,
}

impl GcHeader {
    /// Create a new unpinned, white header
    pub const fn new(size: usize) -> Self {
        Self {
            mark: Cell::new(MarkColor::White),
            pins: 0,
            external: Cell::new(0),
            size,
        }
    }

    /// Get mark color
    #[inline]
    pub fn mark(&self) -> MarkColor {
        self.mark.get()
    }

    /// Set mark color
    #[inline]
    pub fn set_mark(&self, color: MarkColor) {
        self.mark.set(color);
    }

    /// Current pin count
    #[inline]
    pub fn pins(&self) -> u32 {
        self.pins
    }

    /// Accounted size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn increment_pins(&mut self) -> Option<u32> {
        self.pins = self.pins.checked_add(1)?;
        Some(self.pins)
    }

    pub(crate) fn decrement_pins(&mut self) -> Option<u32> {
        self.pins = self.pins.checked_sub(1)?;
        Some(self.pins)
    }

    /// Seed the trial-deletion counter from the pin count
    pub(crate) fn reset_external(&self) {
        self.external.set(self.pins);
    }

    /// Subtract one pin that is explained by a heap reference
    pub(crate) fn discount_internal(&self) {
        self.external.set(self.external.get().saturating_sub(1));
    }

    /// True when some pin is held from outside the heap
    pub(crate) fn externally_pinned(&self) -> bool {
        self.external.get() > 0
    }
}
