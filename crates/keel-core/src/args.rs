//! Argument stack and frames
//!
//! Callers marshal arguments by pushing values and then a count marker
//! (`Value::Size(n)`). Each consumer pops the marker, takes the values that
//! belong to it from the top and leaves the rest for the next level.

use smallvec::SmallVec;

use crate::error::{CoreResult, Status};
use crate::object::ObjectRef;
use crate::types::TypeRef;
use crate::value::{Value, ValueTag};

/// Default maximum argument stack depth
pub const DEFAULT_MAX_ARGUMENT_DEPTH: usize = 64 * 1024;

/// Per-context stack of tagged values
#[derive(Debug)]
pub struct ArgumentStack {
    values: Vec<Value>,
    limit: usize,
}

impl ArgumentStack {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_ARGUMENT_DEPTH)
    }

    /// Create a stack that refuses to grow past `limit` values
    pub fn with_limit(limit: usize) -> Self {
        Self {
            values: Vec::new(),
            limit,
        }
    }

    /// Push a value
    pub fn push(&mut self, value: Value) -> CoreResult<()> {
        if self.values.len() >= self.limit {
            return Err(Status::allocation_failed(format!(
                "argument stack exceeds {} values",
                self.limit
            )));
        }
        self.values.push(value);
        Ok(())
    }

    /// Push a frame's values followed by its count marker
    pub fn push_frame(&mut self, values: &[Value]) -> CoreResult<()> {
        if self.values.len() + values.len() + 1 > self.limit {
            return Err(Status::allocation_failed(format!(
                "argument stack exceeds {} values",
                self.limit
            )));
        }
        self.values.extend_from_slice(values);
        self.values.push(Value::Size(values.len()));
        Ok(())
    }

    /// Push a count marker
    pub fn push_count(&mut self, count: usize) -> CoreResult<()> {
        self.push(Value::Size(count))
    }

    /// Pop the top value
    pub fn pop(&mut self) -> CoreResult<Value> {
        self.values
            .pop()
            .ok_or_else(|| Status::argument_count("argument stack is empty"))
    }

    /// The top value, if any
    pub fn peek(&self) -> Option<&Value> {
        self.values.last()
    }

    /// Read the count marker on top without popping it
    pub fn peek_count(&self) -> CoreResult<usize> {
        match self.values.last() {
            Some(Value::Size(count)) => Ok(*count),
            Some(other) => Err(Status::argument_type(format!(
                "expected a count marker, found {:?}",
                other.tag()
            ))),
            None => Err(Status::argument_count("missing count marker")),
        }
    }

    /// Pop the count marker on top
    pub fn pop_count(&mut self) -> CoreResult<usize> {
        let count = self.peek_count()?;
        self.values.pop();
        Ok(count)
    }

    /// Remove the top `n` values, keeping their order
    pub fn take_top(&mut self, n: usize) -> CoreResult<Arguments> {
        if n > self.values.len() {
            return Err(Status::argument_count(format!(
                "expected {n} arguments, stack holds {}",
                self.values.len()
            )));
        }
        let start = self.values.len() - n;
        Ok(Arguments {
            values: self.values.drain(start..).collect(),
        })
    }

    /// Current depth
    pub fn depth(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drop everything above `depth`
    pub fn truncate(&mut self, depth: usize) {
        self.values.truncate(depth);
    }

    /// Values currently on the stack, bottom first
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Mark the depth below the frame on top, count marker included
    pub fn frame_mark(&self) -> CoreResult<StackMark> {
        let count = self.peek_count()?;
        self.values
            .len()
            .checked_sub(count.saturating_add(1))
            .map(StackMark)
            .ok_or_else(|| {
                Status::argument_count(format!(
                    "count marker claims {count} arguments, stack holds {}",
                    self.values.len() - 1
                ))
            })
    }

    /// Remember the current depth
    pub fn mark(&self) -> StackMark {
        StackMark(self.values.len())
    }

    /// Restore the depth remembered by `mark`
    pub fn restore(&mut self, mark: StackMark) {
        self.values.truncate(mark.0);
    }
}

impl Default for ArgumentStack {
    fn default() -> Self {
        Self::new()
    }
}

/// A remembered argument stack depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StackMark(usize);

impl StackMark {
    /// The remembered depth
    pub fn depth(self) -> usize {
        self.0
    }
}

/// The arguments belonging to one construct level or procedure call
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    values: SmallVec<[Value; 4]>,
}

impl Arguments {
    /// Build an argument list directly
    pub fn from_slice(values: &[Value]) -> Self {
        Self {
            values: SmallVec::from_slice(values),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Argument at `index`, in push order
    pub fn get(&self, index: usize) -> CoreResult<Value> {
        self.values.get(index).copied().ok_or_else(|| {
            Status::argument_count(format!(
                "argument {index} requested, {} supplied",
                self.values.len()
            ))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    /// Fail unless exactly `n` arguments were supplied
    pub fn expect_count(&self, n: usize) -> CoreResult<()> {
        if self.values.len() != n {
            return Err(Status::argument_count(format!(
                "expected {n} arguments, got {}",
                self.values.len()
            )));
        }
        Ok(())
    }

    pub fn boolean(&self, index: usize) -> CoreResult<bool> {
        match self.get(index)? {
            Value::Boolean(b) => Ok(b),
            other => Err(mismatch(index, ValueTag::Boolean, &other)),
        }
    }

    pub fn size(&self, index: usize) -> CoreResult<usize> {
        match self.get(index)? {
            Value::Size(n) => Ok(n),
            other => Err(mismatch(index, ValueTag::Size, &other)),
        }
    }

    pub fn int64(&self, index: usize) -> CoreResult<i64> {
        match self.get(index)? {
            Value::Int64(v) => Ok(v),
            other => Err(mismatch(index, ValueTag::Int64, &other)),
        }
    }

    pub fn object(&self, index: usize) -> CoreResult<ObjectRef> {
        match self.get(index)? {
            Value::Object(object) => Ok(object),
            other => Err(mismatch(index, ValueTag::Object, &other)),
        }
    }

    pub fn type_ref(&self, index: usize) -> CoreResult<TypeRef> {
        match self.get(index)? {
            Value::Type(ty) => Ok(ty),
            other => Err(mismatch(index, ValueTag::Type, &other)),
        }
    }
}

fn mismatch(index: usize, expected: ValueTag, found: &Value) -> Status {
    Status::argument_type(format!(
        "argument {index}: expected {expected:?}, found {:?}",
        found.tag()
    ))
}
