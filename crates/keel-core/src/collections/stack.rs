//! LIFO stack over [`DynamicArray`]

use super::DynamicArray;
use crate::error::{CoreResult, Status};

#[derive(Debug, Clone)]
pub struct Stack<T> {
    items: DynamicArray<T>,
}

impl<T> Stack<T> {
    pub fn new() -> Self {
        Self {
            items: DynamicArray::new(),
        }
    }

    /// Create a stack holding at most `max_depth` items
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            items: DynamicArray::with_max_capacity(max_depth),
        }
    }

    pub fn push(&mut self, item: T) -> CoreResult<()> {
        self.items.push(item)
    }

    /// Pop the top item; an empty stack is an invalid-state failure
    pub fn pop(&mut self) -> CoreResult<T> {
        self.items
            .pop()
            .ok_or_else(|| Status::invalid_state("pop on an empty stack"))
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items bottom first
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self::new()
    }
}
