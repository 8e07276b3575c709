//! Cycle-collecting mark/sweep over a handle arena
//!
//! ## Design
//!
//! - **Slot arena**: payloads live in a `Vec` of slots; freed slots are reused
//!   with a bumped generation
//! - **Pins as reference counts**: holders pin an allocation on store and unpin
//!   on overwrite, whether the holder is host code or another heap object
//! - **Trial deletion**: before marking, every pin that is explained by a
//!   reference from another heap object is discounted. Allocations left with a
//!   positive count are pinned from outside the heap and root the mark phase
//! - **Tri-color marking** from those roots plus caller-supplied roots
//! - **Two-step sweep**: [`AllocationRegistry::mark`] reports the dead set and
//!   the caller frees each handle, so finalizers may run with full access to
//!   the rest of the heap before [`AllocationRegistry::finish_cycle`]
//!
//! The trace callback must report every outgoing edge of an allocation exactly
//! once per call. Reporting an edge twice over-discounts the target and can
//! reclaim it while still externally pinned.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::{GcError, GcResult};
use crate::handle::Handle;
use crate::heap::GcConfig;
use crate::object::{GcHeader, MarkColor};

/// A slot in the arena
enum Slot<T> {
    /// Live allocation
    Occupied {
        generation: u32,
        header: GcHeader,
        value: T,
    },
    /// Free slot; `generation` is what the next occupant will carry
    Vacant { generation: u32 },
}

/// Look up a live header through a handle
fn header_of<T>(slots: &[Slot<T>], handle: Handle) -> Option<&GcHeader> {
    match slots.get(handle.index() as usize) {
        Some(Slot::Occupied {
            generation, header, ..
        }) if *generation == handle.generation() => Some(header),
        _ => None,
    }
}

/// What the tracer does with reported edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TraceMode {
    /// Subtract reported edges from the target's external pin count
    Discount,
    /// Gray reported edges and queue them for scanning
    Mark,
}

/// Edge sink handed to trace callbacks
pub struct Tracer<'a, T> {
    slots: &'a [Slot<T>],
    worklist: &'a mut VecDeque<u32>,
    mode: TraceMode,
}

impl<T> Tracer<'_, T> {
    /// Report a reference from the allocation being traced to `target`.
    ///
    /// Stale handles are ignored.
    pub fn edge(&mut self, target: Handle) {
        let Some(header) = header_of(self.slots, target) else {
            return;
        };
        match self.mode {
            TraceMode::Discount => header.discount_internal(),
            TraceMode::Mark => {
                if header.mark() == MarkColor::White {
                    header.set_mark(MarkColor::Gray);
                    self.worklist.push_back(target.index());
                }
            }
        }
    }

    /// Report the traced allocation's own header to the scanner.
    ///
    /// Returns whether the handle still names a live allocation. Never counts
    /// as an edge.
    pub fn report_header(&mut self, handle: Handle) -> bool {
        header_of(self.slots, handle).is_some()
    }

    /// True while the scanner is discounting heap references rather than marking
    pub fn is_discounting(&self) -> bool {
        self.mode == TraceMode::Discount
    }
}

/// Bookkeeping for a collection between `mark` and `finish_cycle`
struct Cycle {
    start: Instant,
    reclaimed: usize,
    freed: usize,
}

/// Central registry tracking all GC-managed allocations.
///
/// Single-threaded: every operation takes `&mut self` except tracing, which
/// only touches the headers' interior mark state.
pub struct AllocationRegistry<T> {
    slots: Vec<Slot<T>>,
    /// Reusable slot indices
    free: Vec<u32>,
    config: GcConfig,
    /// Number of live allocations
    live: usize,
    /// Total accounted bytes of live allocations
    total_bytes: usize,
    /// Number of collections performed
    collection_count: usize,
    /// Bytes reclaimed in last collection
    last_reclaimed: usize,
    /// Allocations marked reachable in last collection
    last_marked: usize,
    /// Allocations freed in last collection
    last_freed: usize,
    /// Total pause time accumulated across all collections
    total_pause: Duration,
    /// Pause time of the last collection
    last_pause: Duration,
    cycle: Option<Cycle>,
}

impl<T> AllocationRegistry<T> {
    /// Create a new allocation registry with default config
    pub fn new() -> Self {
        Self::with_config(GcConfig::default())
    }

    /// Create a new registry with a custom GC threshold
    pub fn with_threshold(threshold: usize) -> Self {
        Self::with_config(GcConfig::default().gc_threshold(threshold))
    }

    /// Create a new registry from a config
    pub fn with_config(config: GcConfig) -> Self {
        Self {
            slots: Vec::with_capacity(config.initial_slots),
            free: Vec::new(),
            config,
            live: 0,
            total_bytes: 0,
            collection_count: 0,
            last_reclaimed: 0,
            last_marked: 0,
            last_freed: 0,
            total_pause: Duration::ZERO,
            last_pause: Duration::ZERO,
            cycle: None,
        }
    }

    /// Get config
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Allocate `value`, accounting `size` bytes against the heap.
    ///
    /// The new allocation starts unpinned and white.
    pub fn allocate(&mut self, value: T, size: usize) -> GcResult<Handle> {
        self.ensure_headroom(size)?;

        let header = GcHeader::new(size);
        let handle = match self.free.pop() {
            Some(index) => {
                let generation = match &self.slots[index as usize] {
                    Slot::Vacant { generation } => *generation,
                    Slot::Occupied { generation, .. } => {
                        debug_assert!(false, "free list names an occupied slot");
                        generation.wrapping_add(1)
                    }
                };
                self.slots[index as usize] = Slot::Occupied {
                    generation,
                    header,
                    value,
                };
                Handle::new(index, generation)
            }
            None => {
                let index = u32::try_from(self.slots.len()).map_err(|_| GcError::SlotsExhausted)?;
                self.slots.push(Slot::Occupied {
                    generation: 0,
                    header,
                    value,
                });
                Handle::new(index, 0)
            }
        };

        self.live += 1;
        self.total_bytes += size;
        Ok(handle)
    }

    /// Check that `size` more bytes fit under the heap limit
    pub fn ensure_headroom(&self, size: usize) -> GcResult<()> {
        let headroom = self.config.heap_limit.saturating_sub(self.total_bytes);
        if size > headroom {
            return Err(GcError::HeapLimitExceeded {
                requested: size,
                live: self.total_bytes,
                limit: self.config.heap_limit,
            });
        }
        Ok(())
    }

    /// Free an allocation and return its payload.
    ///
    /// The slot's generation is bumped so `handle` and every copy of it go stale.
    pub fn free(&mut self, handle: Handle) -> GcResult<T> {
        let index = handle.index() as usize;
        if header_of(&self.slots, handle).is_none() {
            return Err(GcError::StaleHandle(handle));
        }

        let next_generation = handle.generation().wrapping_add(1);
        let slot = std::mem::replace(
            &mut self.slots[index],
            Slot::Vacant {
                generation: next_generation,
            },
        );
        let Slot::Occupied { header, value, .. } = slot else {
            return Err(GcError::StaleHandle(handle));
        };

        // A slot whose generation wrapped is retired rather than reused
        if next_generation != 0 {
            self.free.push(handle.index());
        }

        self.live -= 1;
        self.total_bytes -= header.size();
        if let Some(cycle) = self.cycle.as_mut() {
            cycle.reclaimed += header.size();
            cycle.freed += 1;
        }
        Ok(value)
    }

    /// True if `handle` names a live allocation
    pub fn contains(&self, handle: Handle) -> bool {
        header_of(&self.slots, handle).is_some()
    }

    /// Borrow a live payload
    pub fn get(&self, handle: Handle) -> GcResult<&T> {
        match self.slots.get(handle.index() as usize) {
            Some(Slot::Occupied {
                generation, value, ..
            }) if *generation == handle.generation() => Ok(value),
            _ => Err(GcError::StaleHandle(handle)),
        }
    }

    /// Mutably borrow a live payload
    pub fn get_mut(&mut self, handle: Handle) -> GcResult<&mut T> {
        match self.slots.get_mut(handle.index() as usize) {
            Some(Slot::Occupied {
                generation, value, ..
            }) if *generation == handle.generation() => Ok(value),
            _ => Err(GcError::StaleHandle(handle)),
        }
    }

    /// Borrow a live header
    pub fn header(&self, handle: Handle) -> GcResult<&GcHeader> {
        header_of(&self.slots, handle).ok_or(GcError::StaleHandle(handle))
    }

    fn header_mut(&mut self, handle: Handle) -> GcResult<&mut GcHeader> {
        match self.slots.get_mut(handle.index() as usize) {
            Some(Slot::Occupied {
                generation, header, ..
            }) if *generation == handle.generation() => Ok(header),
            _ => Err(GcError::StaleHandle(handle)),
        }
    }

    /// Add a pin; returns the new count
    pub fn pin(&mut self, handle: Handle) -> GcResult<u32> {
        self.header_mut(handle)?
            .increment_pins()
            .ok_or(GcError::PinOverflow(handle))
    }

    /// Drop a pin; returns the new count.
    ///
    /// Reaching zero does not free the allocation; it only stops rooting it.
    pub fn unpin(&mut self, handle: Handle) -> GcResult<u32> {
        self.header_mut(handle)?
            .decrement_pins()
            .ok_or(GcError::PinUnderflow(handle))
    }

    /// Current pin count
    pub fn pins(&self, handle: Handle) -> GcResult<u32> {
        Ok(self.header(handle)?.pins())
    }

    /// Handles of every live allocation, in slot order
    pub fn handles(&self) -> Vec<Handle> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, .. } => Some(Handle::new(index as u32, *generation)),
                Slot::Vacant { .. } => None,
            })
            .collect()
    }

    /// Number of live allocations
    pub fn allocation_count(&self) -> usize {
        self.live
    }

    /// Get total allocated bytes
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Get GC threshold
    pub fn gc_threshold(&self) -> usize {
        self.config.gc_threshold
    }

    /// Set GC threshold
    pub fn set_gc_threshold(&mut self, threshold: usize) {
        self.config.gc_threshold = threshold;
    }

    /// Check if GC should be triggered
    pub fn should_gc(&self) -> bool {
        self.total_bytes >= self.config.gc_threshold
    }

    /// Get collection statistics
    pub fn stats(&self) -> GcStats {
        GcStats {
            total_bytes: self.total_bytes,
            allocation_count: self.live,
            collection_count: self.collection_count,
            last_reclaimed: self.last_reclaimed,
            last_marked: self.last_marked,
            last_freed: self.last_freed,
            total_pause_time: self.total_pause,
            last_pause_time: self.last_pause,
        }
    }

    /// Run the mark phase and return the unreachable allocations.
    ///
    /// `trace` is called with each allocation's handle, payload and a tracer,
    /// and must report every outgoing edge exactly once. It runs twice per
    /// allocation: once while discounting heap references, once while marking.
    ///
    /// The caller frees the returned handles (possibly after finalizing them)
    /// and then calls [`finish_cycle`](Self::finish_cycle).
    pub fn mark<F>(&mut self, roots: &[Handle], mut trace: F) -> Vec<Handle>
    where
        F: FnMut(Handle, &T, &mut Tracer<'_, T>),
    {
        let start = Instant::now();

        #[cfg(feature = "gc_logging")]
        tracing::debug!(
            target: "keel::gc",
            roots = roots.len(),
            heap_bytes = self.total_bytes,
            objects = self.live,
            "GC cycle starting"
        );

        let slots = self.slots.as_slice();
        let mut worklist: VecDeque<u32> = VecDeque::new();

        // Phase 1: reset marks and seed external counts from pins
        for slot in slots {
            if let Slot::Occupied { header, .. } = slot {
                header.set_mark(MarkColor::White);
                header.reset_external();
            }
        }

        // Phase 2: discount pins held by other heap allocations
        for (index, slot) in slots.iter().enumerate() {
            if let Slot::Occupied {
                generation, value, ..
            } = slot
            {
                let mut tracer = Tracer {
                    slots,
                    worklist: &mut worklist,
                    mode: TraceMode::Discount,
                };
                trace(Handle::new(index as u32, *generation), value, &mut tracer);
            }
        }

        // Phase 3: gray the caller's roots and everything pinned from outside
        for &root in roots {
            if let Some(header) = header_of(slots, root)
                && header.mark() == MarkColor::White
            {
                header.set_mark(MarkColor::Gray);
                worklist.push_back(root.index());
            }
        }
        for (index, slot) in slots.iter().enumerate() {
            if let Slot::Occupied { header, .. } = slot
                && header.externally_pinned()
                && header.mark() == MarkColor::White
            {
                header.set_mark(MarkColor::Gray);
                worklist.push_back(index as u32);
            }
        }

        // Phase 4: drain the worklist
        let mut marked = 0;
        while let Some(index) = worklist.pop_front() {
            let Some(Slot::Occupied {
                generation,
                header,
                value,
            }) = slots.get(index as usize)
            else {
                continue;
            };

            // Skip if already black (fully processed)
            if header.mark() == MarkColor::Black {
                continue;
            }

            let mut tracer = Tracer {
                slots,
                worklist: &mut worklist,
                mode: TraceMode::Mark,
            };
            trace(Handle::new(index, *generation), value, &mut tracer);

            header.set_mark(MarkColor::Black);
            marked += 1;
        }

        let dead: Vec<Handle> = slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied {
                    generation, header, ..
                } if header.mark() == MarkColor::White => {
                    Some(Handle::new(index as u32, *generation))
                }
                _ => None,
            })
            .collect();

        self.last_marked = marked;
        self.cycle = Some(Cycle {
            start,
            reclaimed: 0,
            freed: 0,
        });
        dead
    }

    /// Close the cycle opened by [`mark`](Self::mark); returns bytes reclaimed.
    pub fn finish_cycle(&mut self) -> usize {
        let Some(cycle) = self.cycle.take() else {
            return 0;
        };

        let elapsed = cycle.start.elapsed();
        self.collection_count += 1;
        self.last_reclaimed = cycle.reclaimed;
        self.last_freed = cycle.freed;
        self.last_pause = elapsed;
        self.total_pause += elapsed;

        #[cfg(feature = "gc_logging")]
        tracing::info!(
            target: "keel::gc",
            collection = self.collection_count,
            reclaimed_bytes = cycle.reclaimed,
            pause_us = elapsed.as_micros() as u64,
            live_bytes = self.total_bytes,
            live_objects = self.live,
            freed_objects = cycle.freed,
            "GC cycle complete"
        );

        cycle.reclaimed
    }

    /// Perform a full collection, handing each dead payload to `finalize`
    /// after it has been unlinked. Returns bytes reclaimed.
    pub fn collect<F, D>(&mut self, roots: &[Handle], trace: F, mut finalize: D) -> usize
    where
        F: FnMut(Handle, &T, &mut Tracer<'_, T>),
        D: FnMut(Handle, T),
    {
        let dead = self.mark(roots, trace);
        for handle in dead {
            if let Ok(value) = self.free(handle) {
                finalize(handle, value);
            }
        }
        self.finish_cycle()
    }

    /// Unlink every allocation without marking.
    ///
    /// Use this when tearing down a runtime; payloads are returned in slot
    /// order so the caller can finalize them.
    pub fn drain_all(&mut self) -> Vec<(Handle, T)> {
        let handles = self.handles();
        let mut drained = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(value) = self.free(handle) {
                drained.push((handle, value));
            }
        }
        drained
    }
}

impl<T> Default for AllocationRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics from the allocation registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    /// Total bytes currently allocated
    pub total_bytes: usize,
    /// Number of live allocations
    pub allocation_count: usize,
    /// Total number of collections performed
    pub collection_count: usize,
    /// Bytes reclaimed in last collection
    pub last_reclaimed: usize,
    /// Allocations found reachable in last collection
    pub last_marked: usize,
    /// Allocations freed between `mark` and `finish_cycle` of the last collection
    pub last_freed: usize,
    /// Total pause time accumulated across all collections
    pub total_pause_time: Duration,
    /// Pause time of the last collection
    pub last_pause_time: Duration,
}
