//! Heap objects
//!
//! An object is a handle into the collector's arena. The arena slot holds an
//! [`ObjectCell`]: the object's current type plus its [`ObjectData`]. The mark
//! color and pin count live in the collector's header and are never exposed.

use std::any::Any;
use std::fmt;

use keel_gc::Handle;

use crate::types::TypeRef;
use crate::value::Value;

/// Bytes accounted per object on top of its declared value size
pub const OBJECT_HEADER_SIZE: usize = 32;

/// Reference to a heap object.
///
/// Copying a reference does not keep the object alive; pin it with
/// [`Runtime::lock`](crate::runtime::Runtime::lock) or store it into a pinned
/// object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(pub(crate) Handle);

impl ObjectRef {
    /// Underlying arena handle
    pub fn handle(self) -> Handle {
        self.0
    }

    /// Packed handle bits, stable for the object's lifetime
    pub fn to_bits(self) -> u64 {
        self.0.to_bits()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({})", self.0)
    }
}

/// Arena payload of one object
#[derive(Debug)]
pub struct ObjectCell {
    pub(crate) ty: TypeRef,
    pub(crate) data: ObjectData,
}

impl ObjectCell {
    pub(crate) fn new(ty: TypeRef, data: ObjectData) -> Self {
        Self { ty, data }
    }

    /// Current most-derived type
    pub fn ty(&self) -> TypeRef {
        self.ty
    }

    pub fn data(&self) -> &ObjectData {
        &self.data
    }
}

/// An object's storage.
///
/// `bytes` is the declared value size, zero-initialized. `fields` is a generic
/// slot vector whose reference values are pinned by the object and visited by
/// the base level. `natives` carries typed per-level state owned by the
/// consumer's behaviors.
#[derive(Default)]
pub struct ObjectData {
    bytes: Box<[u8]>,
    fields: Vec<Value>,
    natives: Vec<Box<dyn Any>>,
}

impl ObjectData {
    pub(crate) fn with_bytes(bytes: Box<[u8]>) -> Self {
        Self {
            bytes,
            fields: Vec::new(),
            natives: Vec::new(),
        }
    }

    /// Declared-size value storage
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Generic reference fields
    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut Vec<Value> {
        &mut self.fields
    }

    pub(crate) fn take_fields(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.fields)
    }

    /// Borrow the first native of type `N`
    pub fn native<N: Any>(&self) -> Option<&N> {
        self.natives.iter().find_map(|native| native.downcast_ref())
    }

    /// Mutably borrow the first native of type `N`
    pub fn native_mut<N: Any>(&mut self) -> Option<&mut N> {
        self.natives.iter_mut().find_map(|native| native.downcast_mut())
    }

    /// Attach native state, replacing an existing native of the same type
    pub fn insert_native<N: Any>(&mut self, native: N) {
        if let Some(slot) = self.native_mut::<N>() {
            *slot = native;
            return;
        }
        self.natives.push(Box::new(native));
    }

    /// Detach and return the native of type `N`
    pub fn take_native<N: Any>(&mut self) -> Option<N> {
        let position = self.natives.iter().position(|native| native.is::<N>())?;
        let native = self.natives.swap_remove(position);
        native.downcast::<N>().ok().map(|boxed| *boxed)
    }
}

impl fmt::Debug for ObjectData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectData")
            .field("bytes", &self.bytes.len())
            .field("fields", &self.fields)
            .field("natives", &self.natives.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natives() {
        let mut data = ObjectData::with_bytes(vec![0; 4].into_boxed_slice());
        data.insert_native(7u32);
        data.insert_native(String::from("seven"));
        assert_eq!(data.native::<u32>(), Some(&7));

        data.insert_native(8u32);
        assert_eq!(data.native::<u32>(), Some(&8));
        assert_eq!(data.take_native::<String>().as_deref(), Some("seven"));
        assert!(data.native::<String>().is_none());
        assert_eq!(data.bytes().len(), 4);
    }
}
