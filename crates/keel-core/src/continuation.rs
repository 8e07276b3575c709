//! Guarded regions and the status channel
//!
//! A [`ContinuationStack`] brackets fallible regions. [`guard`] pushes a
//! record, runs the region and pops the record on both exits, so the depth
//! after a guarded call always equals the depth before it. A failure inside the
//! region is an ordinary `Err` that `?` carries to the nearest guard; the guard
//! records its kind as the current status.
//!
//! ```
//! use keel_core::continuation::{guard, ContinuationStack};
//! use keel_core::error::StatusKind;
//!
//! let mut stack = ContinuationStack::new();
//! let result: Result<(), _> = guard(&mut stack, "parse", |stack| {
//!     stack.set_status(StatusKind::Syntactic);
//!     stack.jump()
//! });
//! assert!(result.is_err());
//! assert_eq!(stack.status(), StatusKind::Syntactic);
//! assert_eq!(stack.depth(), 0);
//! ```

use crate::error::{CoreResult, Status, StatusKind};

/// Default maximum guard nesting
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// Identifies one pushed record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetId(u64);

/// A saved resumption point
#[derive(Debug, Clone)]
struct JumpTarget {
    id: TargetId,
    label: &'static str,
}

/// Per-context stack of continuation records plus the last status
#[derive(Debug)]
pub struct ContinuationStack {
    records: Vec<JumpTarget>,
    status: StatusKind,
    max_depth: usize,
    next_id: u64,
}

impl ContinuationStack {
    /// Create an empty stack with the default depth limit
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    /// Create an empty stack with a custom depth limit
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            records: Vec::new(),
            status: StatusKind::Success,
            max_depth,
            next_id: 0,
        }
    }

    /// Number of records currently pushed
    pub fn depth(&self) -> usize {
        self.records.len()
    }

    /// Label of the innermost record
    pub fn current_label(&self) -> Option<&'static str> {
        self.records.last().map(|record| record.label)
    }

    /// Push a record before entering a fallible region
    pub fn push(&mut self, label: &'static str) -> CoreResult<TargetId> {
        if self.records.len() >= self.max_depth {
            return Err(Status::allocation_failed(format!(
                "guard nesting exceeds {}",
                self.max_depth
            )));
        }
        let id = TargetId(self.next_id);
        self.next_id += 1;
        self.records.push(JumpTarget { id, label });
        Ok(id)
    }

    /// Pop the innermost record; it must be `id`
    pub fn pop(&mut self, id: TargetId) -> CoreResult<()> {
        match self.records.last() {
            Some(top) if top.id == id => {
                self.records.pop();
                Ok(())
            }
            Some(top) => Err(Status::invalid_state(format!(
                "guard `{}` popped out of order",
                top.label
            ))),
            None => Err(Status::invalid_state("pop on an empty continuation stack")),
        }
    }

    /// Set the status a following [`jump`](Self::jump) carries
    pub fn set_status(&mut self, kind: StatusKind) {
        self.status = kind;
    }

    /// The last status set or recorded by a guard
    pub fn status(&self) -> StatusKind {
        self.status
    }

    /// Escape to the nearest guard with the current status.
    ///
    /// Jumping with a success status is itself an invalid-state failure.
    pub fn jump<T>(&self) -> CoreResult<T> {
        if self.status.is_success() {
            return Err(Status::invalid_state("jump without a failure status"));
        }
        Err(Status::new(self.status))
    }

    /// Record `status` and escape with it
    pub fn fail<T>(&mut self, status: Status) -> CoreResult<T> {
        self.status = status.kind();
        Err(status)
    }

    /// Restore the records to `depth` after a region left extra records behind
    fn unwind_to(&mut self, depth: usize) {
        if self.records.len() > depth {
            tracing::warn!(
                target: "keel::runtime",
                leaked = self.records.len() - depth,
                "guarded region left continuation records behind"
            );
            self.records.truncate(depth);
        }
    }
}

impl Default for ContinuationStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Anything that owns a continuation stack
pub trait Continuations {
    /// Borrow the continuation stack
    fn continuations(&mut self) -> &mut ContinuationStack;
}

impl Continuations for ContinuationStack {
    fn continuations(&mut self) -> &mut ContinuationStack {
        self
    }
}

/// Run `region` inside a guarded region labelled `label`.
///
/// The record is popped on both success and failure. On success the status is
/// reset to [`StatusKind::Success`]; on failure it is set to the error's kind
/// and the error is returned.
pub fn guard<C, T, F>(cx: &mut C, label: &'static str, region: F) -> CoreResult<T>
where
    C: Continuations + ?Sized,
    F: FnOnce(&mut C) -> CoreResult<T>,
{
    let depth = cx.continuations().depth();
    let id = cx.continuations().push(label)?;

    let result = region(cx);

    let stack = cx.continuations();
    stack.unwind_to(depth + 1);
    if let Err(err) = stack.pop(id) {
        stack.records.truncate(depth);
        stack.status = err.kind();
        return Err(err);
    }

    match &result {
        Ok(_) => stack.status = StatusKind::Success,
        Err(err) => {
            tracing::trace!(target: "keel::runtime", label, status = %err, "guard caught failure");
            stack.status = err.kind();
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_balances() {
        let mut stack = ContinuationStack::new();
        let value = guard(&mut stack, "outer", |stack| {
            assert_eq!(stack.depth(), 1);
            assert_eq!(stack.current_label(), Some("outer"));
            Ok(7)
        });
        assert_eq!(value, Ok(7));
        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.status(), StatusKind::Success);
    }

    #[test]
    fn test_failure_balances() {
        let mut stack = ContinuationStack::new();
        let result: CoreResult<()> = guard(&mut stack, "outer", |stack| {
            stack.set_status(StatusKind::ArgumentValueInvalid);
            stack.jump()
        });
        assert_eq!(result.unwrap_err().kind(), StatusKind::ArgumentValueInvalid);
        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.status(), StatusKind::ArgumentValueInvalid);
    }

    #[test]
    fn test_nested_failure_reaches_nearest_guard() {
        let mut stack = ContinuationStack::new();
        let outer = guard(&mut stack, "outer", |stack| {
            let inner: CoreResult<()> = guard(stack, "inner", |stack| {
                assert_eq!(stack.depth(), 2);
                stack.fail(Status::not_exists("missing"))
            });
            assert_eq!(stack.depth(), 1);
            assert_eq!(inner.unwrap_err().kind(), StatusKind::NotExists);
            // Recovered locally; the outer region succeeds
            Ok(())
        });
        assert!(outer.is_ok());
        assert_eq!(stack.status(), StatusKind::Success);
    }

    #[test]
    fn test_unguarded_jump_propagates() {
        fn deep(stack: &mut ContinuationStack) -> CoreResult<u32> {
            stack.set_status(StatusKind::Environment);
            stack.jump()
        }
        let mut stack = ContinuationStack::new();
        assert_eq!(deep(&mut stack).unwrap_err().kind(), StatusKind::Environment);
    }

    #[test]
    fn test_jump_without_status() {
        let stack = ContinuationStack::new();
        let err = stack.jump::<()>().unwrap_err();
        assert_eq!(err.kind(), StatusKind::InvalidState);
    }

    #[test]
    fn test_out_of_order_pop() {
        let mut stack = ContinuationStack::new();
        let first = stack.push("first").unwrap();
        let _second = stack.push("second").unwrap();
        assert_eq!(stack.pop(first).unwrap_err().kind(), StatusKind::InvalidState);
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn test_leaked_record_unwound() {
        let mut stack = ContinuationStack::new();
        let result = guard(&mut stack, "outer", |stack| {
            stack.push("leaked")?;
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_depth_limit() {
        let mut stack = ContinuationStack::with_max_depth(1);
        let result = guard(&mut stack, "outer", |stack| guard(stack, "inner", |_| Ok(())));
        assert_eq!(result.unwrap_err().kind(), StatusKind::AllocationFailed);
        assert_eq!(stack.depth(), 0);
    }
}
