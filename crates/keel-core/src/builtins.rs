//! Example object types built on the substrate
//!
//! - `Bytes`: an owned byte string with content equality, hashing and ordering
//! - `BooleanNode`: a one-byte node built from a boolean or from a `Bytes`
//!   holding exactly `true` or `false`
//! - `Array`: a growable array of values that pins what it holds
//! - `Map`: a hash map of values keyed through [`Runtime::equals`] and
//!   [`Runtime::hash`]

use std::cmp::Ordering;
use std::hash::Hasher;
use std::rc::Rc;

use rustc_hash::FxHasher;

use crate::args::Arguments;
use crate::collections::{ChainedMap, DynamicArray};
use crate::error::{CoreResult, Status};
use crate::object::{ObjectData, ObjectRef};
use crate::runtime::{ConstructContext, DestructContext, Runtime};
use crate::trace::Visitor;
use crate::types::{TypeBehavior, TypeRef};
use crate::value::Value;

/// Content of a `Bytes` object
#[derive(Debug, Default)]
struct ByteContent(Vec<u8>);

/// Elements of an `Array` object
#[derive(Debug, Default)]
struct ArrayItems(DynamicArray<Value>);

/// Entries of a `Map` object
#[derive(Debug, Default)]
struct MapEntries(ChainedMap<Value, Value>);

fn bytes_in(data: &ObjectData) -> Option<&[u8]> {
    data.native::<ByteContent>().map(|content| content.0.as_slice())
}

struct BytesBehavior;

impl TypeBehavior for BytesBehavior {
    fn construct(&self, cx: &mut ConstructContext<'_>, _args: Arguments) -> CoreResult<()> {
        cx.data_mut()?.insert_native(ByteContent::default());
        Ok(())
    }

    fn equals(&self, rt: &Runtime, this: ObjectRef, other: &Value) -> Option<CoreResult<bool>> {
        let Value::Object(other) = other else {
            return Some(Ok(false));
        };
        Some(content_pair(rt, this, *other).map(|(mine, theirs)| theirs == Some(mine)))
    }

    fn hash(&self, rt: &Runtime, this: ObjectRef) -> Option<CoreResult<u64>> {
        Some(rt.data(this).map(|data| {
            let mut hasher = FxHasher::default();
            hasher.write(bytes_in(data).unwrap_or_default());
            hasher.finish()
        }))
    }

    fn compare(&self, rt: &Runtime, this: ObjectRef, other: &Value) -> Option<CoreResult<Ordering>> {
        let Value::Object(other) = other else {
            return None;
        };
        match content_pair(rt, this, *other) {
            Ok((mine, Some(theirs))) => Some(Ok(mine.cmp(theirs))),
            Ok((_, None)) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

fn content_pair(rt: &Runtime, this: ObjectRef, other: ObjectRef) -> CoreResult<(&[u8], Option<&[u8]>)> {
    let mine = bytes_in(rt.data(this)?).unwrap_or_default();
    let theirs = bytes_in(rt.data(other)?);
    Ok((mine, theirs))
}

struct BooleanNodeBehavior;

impl TypeBehavior for BooleanNodeBehavior {
    fn arity(&self) -> usize {
        1
    }

    fn construct(&self, cx: &mut ConstructContext<'_>, args: Arguments) -> CoreResult<()> {
        let value = match args.get(0)? {
            Value::Boolean(b) => b,
            Value::Object(source) => {
                let data = cx.runtime().data(source)?;
                match bytes_in(data) {
                    Some(b"true") => true,
                    Some(b"false") => false,
                    _ => {
                        return Err(Status::argument_value(
                            "boolean source must read exactly `true` or `false`",
                        ));
                    }
                }
            }
            other => {
                return Err(Status::argument_type(format!(
                    "boolean node takes a Boolean or a reference, found {:?}",
                    other.tag()
                )));
            }
        };
        let slot = cx
            .data_mut()?
            .bytes_mut()
            .first_mut()
            .ok_or_else(|| Status::argument_type("boolean node storage is empty"))?;
        *slot = u8::from(value);
        Ok(())
    }
}

struct ArrayBehavior;

impl TypeBehavior for ArrayBehavior {
    fn construct(&self, cx: &mut ConstructContext<'_>, _args: Arguments) -> CoreResult<()> {
        cx.data_mut()?.insert_native(ArrayItems::default());
        Ok(())
    }

    fn destruct(&self, cx: &mut DestructContext<'_>) {
        let Some(ArrayItems(mut items)) = cx.data_mut().take_native::<ArrayItems>() else {
            return;
        };
        for value in items.drain() {
            cx.release(&value);
        }
    }

    fn visit(&self, data: &ObjectData, visitor: &mut Visitor<'_>) {
        if let Some(items) = data.native::<ArrayItems>() {
            visitor.visit_values(&items.0);
        }
    }
}

struct MapBehavior;

impl TypeBehavior for MapBehavior {
    fn construct(&self, cx: &mut ConstructContext<'_>, _args: Arguments) -> CoreResult<()> {
        cx.data_mut()?.insert_native(MapEntries::default());
        Ok(())
    }

    fn destruct(&self, cx: &mut DestructContext<'_>) {
        let Some(MapEntries(mut entries)) = cx.data_mut().take_native::<MapEntries>() else {
            return;
        };
        for (key, value) in entries.drain() {
            cx.release(&key);
            cx.release(&value);
        }
    }

    fn visit(&self, data: &ObjectData, visitor: &mut Visitor<'_>) {
        if let Some(entries) = data.native::<MapEntries>() {
            for (key, value) in entries.0.iter() {
                visitor.visit_value(key);
                visitor.visit_value(value);
            }
        }
    }
}

/// Handles of the example types
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    pub bytes: TypeRef,
    pub boolean_node: TypeRef,
    pub array: TypeRef,
    pub map: TypeRef,
}

impl Builtins {
    /// Register the example types
    pub fn install(rt: &mut Runtime) -> CoreResult<Self> {
        Ok(Self {
            bytes: rt.register_type("Bytes", None, 0, Rc::new(BytesBehavior))?,
            boolean_node: rt.register_type("BooleanNode", None, 1, Rc::new(BooleanNodeBehavior))?,
            array: rt.register_type("Array", None, 0, Rc::new(ArrayBehavior))?,
            map: rt.register_type("Map", None, 0, Rc::new(MapBehavior))?,
        })
    }

    /// Allocate a `Bytes` object holding `content`
    pub fn new_bytes(&self, rt: &mut Runtime, content: &[u8]) -> CoreResult<ObjectRef> {
        let object = rt.allocate_with(self.bytes, &[])?;
        let native = rt
            .data_mut(object)?
            .native_mut::<ByteContent>()
            .ok_or_else(|| Status::invalid_state("bytes object lost its content"))?;
        native.0.extend_from_slice(content);
        Ok(object)
    }

    /// Allocate a `BooleanNode` from a boolean or a `Bytes` reference
    pub fn new_boolean_node(&self, rt: &mut Runtime, source: Value) -> CoreResult<ObjectRef> {
        rt.allocate_with(self.boolean_node, &[source])
    }

    pub fn new_array(&self, rt: &mut Runtime) -> CoreResult<ObjectRef> {
        rt.allocate_with(self.array, &[])
    }

    pub fn new_map(&self, rt: &mut Runtime) -> CoreResult<ObjectRef> {
        rt.allocate_with(self.map, &[])
    }
}

/// Content of a `Bytes` object
pub fn bytes_of(rt: &Runtime, object: ObjectRef) -> CoreResult<&[u8]> {
    bytes_in(rt.data(object)?).ok_or_else(|| Status::argument_type("not a Bytes object"))
}

/// Value held by a `BooleanNode`
pub fn boolean_of(rt: &Runtime, node: ObjectRef) -> CoreResult<bool> {
    match rt.data(node)?.bytes().first() {
        Some(byte) => Ok(*byte != 0),
        None => Err(Status::argument_type("not a BooleanNode")),
    }
}

fn array_items(rt: &mut Runtime, array: ObjectRef) -> CoreResult<&mut DynamicArray<Value>> {
    rt.data_mut(array)?
        .native_mut::<ArrayItems>()
        .map(|items| &mut items.0)
        .ok_or_else(|| Status::argument_type("not an Array object"))
}

/// Append to an `Array`, pinning the value
pub fn array_push(rt: &mut Runtime, array: ObjectRef, value: Value) -> CoreResult<()> {
    array_items(rt, array)?;
    rt.retain(&value)?;
    if let Err(err) = array_items(rt, array)?.push(value) {
        rt.release(&value);
        return Err(err);
    }
    Ok(())
}

/// Replace an `Array` element, pinning the new value before releasing the old
pub fn array_set(rt: &mut Runtime, array: ObjectRef, index: usize, value: Value) -> CoreResult<()> {
    array_items(rt, array)?;
    rt.retain(&value)?;
    match array_items(rt, array)?.set(index, value) {
        Ok(old) => {
            rt.release(&old);
            Ok(())
        }
        Err(err) => {
            rt.release(&value);
            Err(err)
        }
    }
}

pub fn array_get(rt: &Runtime, array: ObjectRef, index: usize) -> CoreResult<Option<Value>> {
    let items = rt
        .data(array)?
        .native::<ArrayItems>()
        .ok_or_else(|| Status::argument_type("not an Array object"))?;
    Ok(items.0.get(index).copied())
}

pub fn array_len(rt: &Runtime, array: ObjectRef) -> CoreResult<usize> {
    let items = rt
        .data(array)?
        .native::<ArrayItems>()
        .ok_or_else(|| Status::argument_type("not an Array object"))?;
    Ok(items.0.len())
}

/// Insert into a `Map`; returns the previous value for an equal key.
///
/// The map pins its keys and values. When the key was already present the
/// stored key is kept and the previous value is released.
pub fn map_insert(rt: &mut Runtime, map: ObjectRef, key: Value, value: Value) -> CoreResult<Option<Value>> {
    let hash = rt.hash(&key)?;
    rt.retain(&key)?;
    if let Err(err) = rt.retain(&value) {
        rt.release(&key);
        return Err(err);
    }

    let taken = rt
        .data_mut(map)
        .ok()
        .and_then(|data| data.take_native::<MapEntries>());
    let Some(MapEntries(mut entries)) = taken else {
        rt.release(&key);
        rt.release(&value);
        return Err(Status::argument_type("not a Map object"));
    };
    let inserted = entries.insert_hashed(hash, key, value, |stored, new| rt.equals(stored, new));
    rt.data_mut(map)?.insert_native(MapEntries(entries));

    match inserted {
        Ok(Some(old)) => {
            rt.release(&key);
            rt.release(&old);
            Ok(Some(old))
        }
        Ok(None) => Ok(None),
        Err(err) => {
            rt.release(&key);
            rt.release(&value);
            Err(err)
        }
    }
}

/// Look up a `Map` entry by an equal key
pub fn map_get(rt: &Runtime, map: ObjectRef, key: &Value) -> CoreResult<Option<Value>> {
    let hash = rt.hash(key)?;
    let entries = rt
        .data(map)?
        .native::<MapEntries>()
        .ok_or_else(|| Status::argument_type("not a Map object"))?;
    Ok(entries
        .0
        .get_hashed(hash, |stored| rt.equals(stored, key))?
        .copied())
}

pub fn map_len(rt: &Runtime, map: ObjectRef) -> CoreResult<usize> {
    let entries = rt
        .data(map)?
        .native::<MapEntries>()
        .ok_or_else(|| Status::argument_type("not a Map object"))?;
    Ok(entries.0.len())
}
