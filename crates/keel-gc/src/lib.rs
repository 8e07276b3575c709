//! # Keel Garbage Collector
//!
//! Handle-based arena with pin counting and a cycle-collecting mark/sweep.
//!
//! ## Design
//!
//! - **Generation-checked handles**: objects are addressed by `(index, generation)`,
//!   so a handle to a reclaimed slot is detected instead of aliasing a new object
//! - **Pins**: every allocation carries an explicit pin count
//! - **Trial deletion**: pins that are fully explained by references from other
//!   heap objects do not root; cycles with no external pin are reclaimed
//! - **Tri-color marking** from the externally pinned set and caller roots

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod handle;
pub mod heap;
pub mod mark_sweep;
pub mod object;

pub use error::{GcError, GcResult};
pub use handle::Handle;
pub use heap::GcConfig;
pub use mark_sweep::{AllocationRegistry, GcStats, Tracer};
pub use object::{GcHeader, MarkColor};
