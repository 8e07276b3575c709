//! Baseline collections used by the runtime and its consumers
//!
//! Growth is fallible: exceeding a collection's maximum fails with
//! `AllocationFailed` and leaves it unchanged.

mod array;
mod map;
mod stack;

pub use array::{DynamicArray, MIN_CAPACITY};
pub use map::ChainedMap;
pub use stack::Stack;
