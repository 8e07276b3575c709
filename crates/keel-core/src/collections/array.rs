//! Growable array with an explicit capacity policy

use crate::error::{CoreResult, Status};

/// First capacity reserved on growth from empty
pub const MIN_CAPACITY: usize = 4;

/// Array whose capacity doubles on growth and saturates at a maximum
#[derive(Debug, Clone)]
pub struct DynamicArray<T> {
    items: Vec<T>,
    capacity: usize,
    max_capacity: usize,
}

impl<T> DynamicArray<T> {
    pub fn new() -> Self {
        Self::with_max_capacity(Self::address_limit())
    }

    /// Create an empty array that never grows past `max_capacity` items
    pub fn with_max_capacity(max_capacity: usize) -> Self {
        Self {
            items: Vec::new(),
            capacity: 0,
            max_capacity: max_capacity.min(Self::address_limit()),
        }
    }

    fn address_limit() -> usize {
        isize::MAX as usize / std::mem::size_of::<T>().max(1)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Reserved item slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Make room for one more item: double, or saturate at the maximum
    fn grow(&mut self) -> CoreResult<()> {
        if self.capacity >= self.max_capacity {
            return Err(Status::allocation_failed(format!(
                "array is at its maximum capacity of {}",
                self.max_capacity
            )));
        }
        let target = if self.capacity == 0 {
            MIN_CAPACITY
        } else {
            self.capacity.saturating_mul(2)
        }
        .min(self.max_capacity);

        self.items
            .try_reserve_exact(target - self.items.len())
            .map_err(|err| Status::allocation_failed(err.to_string()))?;
        self.capacity = target;
        Ok(())
    }

    /// Append an item
    pub fn push(&mut self, item: T) -> CoreResult<()> {
        if self.items.len() == self.capacity {
            self.grow()?;
        }
        self.items.push(item);
        Ok(())
    }

    /// Insert at `index`, shifting later items up
    pub fn insert(&mut self, index: usize, item: T) -> CoreResult<()> {
        if index > self.items.len() {
            return Err(out_of_range(index, self.items.len()));
        }
        if self.items.len() == self.capacity {
            self.grow()?;
        }
        self.items.insert(index, item);
        Ok(())
    }

    /// Remove and return the item at `index`
    pub fn remove(&mut self, index: usize) -> CoreResult<T> {
        if index >= self.items.len() {
            return Err(out_of_range(index, self.items.len()));
        }
        Ok(self.items.remove(index))
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    /// Replace the item at `index`, returning the old one
    pub fn set(&mut self, index: usize, item: T) -> CoreResult<T> {
        let len = self.items.len();
        let slot = self
            .items
            .get_mut(index)
            .ok_or_else(|| out_of_range(index, len))?;
        Ok(std::mem::replace(slot, item))
    }

    /// Drop every item; capacity is kept
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Remove and return every item; capacity is kept
    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.items.drain(..)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T> Default for DynamicArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> IntoIterator for &'a DynamicArray<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

fn out_of_range(index: usize, len: usize) -> Status {
    Status::argument_value(format!("index {index} out of range for length {len}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusKind;

    #[test]
    fn test_capacity_doubles() {
        let mut array = DynamicArray::new();
        let mut seen = vec![array.capacity()];
        for i in 0..100 {
            array.push(i).unwrap();
            assert!(array.capacity() >= array.len());
            if *seen.last().unwrap() != array.capacity() {
                seen.push(array.capacity());
            }
        }
        assert_eq!(seen, vec![0, 4, 8, 16, 32, 64, 128]);
    }

    #[test]
    fn test_saturates_at_max() {
        let mut array = DynamicArray::with_max_capacity(10);
        for i in 0..10 {
            array.push(i).unwrap();
        }
        // 4 -> 8 -> 10 (saturated)
        assert_eq!(array.capacity(), 10);

        let err = array.push(10).unwrap_err();
        assert_eq!(err.kind(), StatusKind::AllocationFailed);
        assert_eq!(array.len(), 10);
        assert_eq!(array.insert(0, 99).unwrap_err().kind(), StatusKind::AllocationFailed);
        assert_eq!(array.get(0), Some(&0));
    }

    #[test]
    fn test_insert_remove_set() {
        let mut array = DynamicArray::new();
        array.push('a').unwrap();
        array.push('c').unwrap();
        array.insert(1, 'b').unwrap();
        assert_eq!(array.as_slice(), &['a', 'b', 'c']);

        assert_eq!(array.set(0, 'z').unwrap(), 'a');
        assert_eq!(array.remove(1).unwrap(), 'b');
        assert_eq!(array.as_slice(), &['z', 'c']);

        assert_eq!(array.remove(5).unwrap_err().kind(), StatusKind::ArgumentValueInvalid);
        assert_eq!(array.insert(3, 'x').unwrap_err().kind(), StatusKind::ArgumentValueInvalid);
    }

    #[test]
    fn test_zero_max() {
        let mut array: DynamicArray<u8> = DynamicArray::with_max_capacity(0);
        assert!(array.push(1).is_err());
        assert!(array.is_empty());
    }
}
