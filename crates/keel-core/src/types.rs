//! Type registry
//!
//! Types are named, single-inheritance records rooted at the base type
//! `Object`. Each record owns its [`TypeBehavior`] and an immutable leaf-to-root
//! ancestor list computed when it is registered.
//!
//! ## Pins
//!
//! A type is pinned by every live object whose current type it is, by every
//! registered child type, and by every stored `Value::Type` that names it. A
//! pinned type cannot be unregistered.
//!
//! ## Epochs
//!
//! Tearing the registry down bumps its epoch and every slot generation, so
//! stale [`TypeRef`]s are detected and [`TypeSlot`] caches re-register.

use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use smallvec::{SmallVec, smallvec};

use crate::args::Arguments;
use crate::error::{CoreResult, Status};
use crate::object::{ObjectData, ObjectRef};
use crate::runtime::{ConstructContext, DestructContext, Runtime};
use crate::trace::Visitor;
use crate::value::{Value, ValueTag};

/// Name of the universal base type
pub const BASE_TYPE_NAME: &str = "Object";

/// Name of the sentinel type carried by objects under construction
pub const RAW_MEMORY_TYPE_NAME: &str = "RawMemory";

/// Reference to a registered type
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef {
    index: u32,
    generation: u32,
}

impl TypeRef {
    /// Packed bits, stable while the type is registered
    pub fn to_bits(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef(#{}v{})", self.index, self.generation)
    }
}

/// Per-type lifecycle callbacks and operator overloads.
///
/// Lifecycle callbacks (`construct`, `destruct`, `visit`) run once per
/// ancestor level. Operator overloads (`equals`, `hash`, `compare`) resolve to
/// the nearest level returning `Some`; the base falls back to identity.
pub trait TypeBehavior {
    /// Number of arguments this level consumes
    fn arity(&self) -> usize {
        0
    }

    /// Initialize this level's state.
    ///
    /// Called after every ancestor level has been constructed, with exactly
    /// [`arity`](Self::arity) arguments.
    fn construct(&self, cx: &mut ConstructContext<'_>, args: Arguments) -> CoreResult<()> {
        let _ = (cx, args);
        Ok(())
    }

    /// Release this level's state. Runs leaf level first.
    fn destruct(&self, cx: &mut DestructContext<'_>) {
        let _ = cx;
    }

    /// Report every reference held by this level's state
    fn visit(&self, data: &ObjectData, visitor: &mut Visitor<'_>) {
        let _ = (data, visitor);
    }

    /// Equality overload for objects of this type
    fn equals(&self, rt: &Runtime, this: ObjectRef, other: &Value) -> Option<CoreResult<bool>> {
        let _ = (rt, this, other);
        None
    }

    /// Hash overload; must agree with `equals`
    fn hash(&self, rt: &Runtime, this: ObjectRef) -> Option<CoreResult<u64>> {
        let _ = (rt, this);
        None
    }

    /// Ordering overload
    fn compare(
        &self,
        rt: &Runtime,
        this: ObjectRef,
        other: &Value,
    ) -> Option<CoreResult<Ordering>> {
        let _ = (rt, this, other);
        None
    }
}

/// Behavior of the base type: owns the generic reference fields
struct BaseBehavior;

impl TypeBehavior for BaseBehavior {
    fn destruct(&self, cx: &mut DestructContext<'_>) {
        cx.release_fields();
    }

    fn visit(&self, data: &ObjectData, visitor: &mut Visitor<'_>) {
        visitor.visit_values(data.fields());
    }
}

/// Behavior of builtin types that carry no state
struct InertBehavior;

impl TypeBehavior for InertBehavior {}

/// What kind of values a type describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Heap object type; allocatable
    Object,
    /// Singleton type of a scalar tag
    Scalar(ValueTag),
    /// Placeholder type of objects under construction
    Sentinel,
}

/// A registered type
pub struct TypeRecord {
    name: Box<str>,
    parent: Option<TypeRef>,
    size: usize,
    behavior: Rc<dyn TypeBehavior>,
    ancestors: SmallVec<[TypeRef; 8]>,
    pins: u32,
    kind: TypeKind,
    builtin: bool,
}

impl TypeRecord {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<TypeRef> {
        self.parent
    }

    /// Declared value size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Leaf-to-root ancestor list, starting with this type
    pub fn ancestors(&self) -> &[TypeRef] {
        &self.ancestors
    }

    pub fn pins(&self) -> u32 {
        self.pins
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn is_builtin(&self) -> bool {
        self.builtin
    }

    pub(crate) fn behavior(&self) -> Rc<dyn TypeBehavior> {
        Rc::clone(&self.behavior)
    }

    pub(crate) fn dispatch(&self) -> &dyn TypeBehavior {
        &*self.behavior
    }
}

impl fmt::Debug for TypeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRecord")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("size", &self.size)
            .field("pins", &self.pins)
            .field("kind", &self.kind)
            .finish()
    }
}

struct Entry {
    generation: u32,
    record: Option<TypeRecord>,
}

/// Handles of the builtin types
#[derive(Debug, Clone, Copy)]
pub struct CoreTypes {
    /// The universal base type
    pub object: TypeRef,
    /// Sentinel carried during construction
    pub raw_memory: TypeRef,
    scalars: [TypeRef; ValueTag::ALL.len()],
}

impl CoreTypes {
    /// Singleton type of a scalar tag; the base type for [`ValueTag::Object`]
    pub fn scalar(&self, tag: ValueTag) -> TypeRef {
        self.scalars[tag as usize]
    }
}

/// Named type records
pub struct TypeRegistry {
    entries: Vec<Entry>,
    free: Vec<u32>,
    by_name: FxHashMap<Box<str>, TypeRef>,
    epoch: u64,
    max_name_len: usize,
    core: CoreTypes,
}

impl TypeRegistry {
    /// Create a registry holding only the builtin types
    pub fn new(max_name_len: usize) -> Self {
        let placeholder = TypeRef {
            index: 0,
            generation: 0,
        };
        let mut registry = Self {
            entries: Vec::new(),
            free: Vec::new(),
            by_name: FxHashMap::default(),
            epoch: 0,
            max_name_len,
            core: CoreTypes {
                object: placeholder,
                raw_memory: placeholder,
                scalars: [placeholder; ValueTag::ALL.len()],
            },
        };
        registry.install_core();
        registry
    }

    fn install_core(&mut self) {
        let object = self.insert(
            BASE_TYPE_NAME,
            None,
            0,
            Rc::new(BaseBehavior),
            TypeKind::Object,
            true,
        );
        let raw_memory = self.insert(
            RAW_MEMORY_TYPE_NAME,
            Some(object),
            0,
            Rc::new(InertBehavior),
            TypeKind::Sentinel,
            true,
        );

        let mut scalars = [object; ValueTag::ALL.len()];
        for tag in ValueTag::ALL {
            if tag == ValueTag::Object {
                continue;
            }
            scalars[tag as usize] = self.insert(
                tag.type_name(),
                None,
                0,
                Rc::new(InertBehavior),
                TypeKind::Scalar(tag),
                true,
            );
        }

        self.core = CoreTypes {
            object,
            raw_memory,
            scalars,
        };
    }

    /// Insert a record without validation; pins the parent
    fn insert(
        &mut self,
        name: &str,
        parent: Option<TypeRef>,
        size: usize,
        behavior: Rc<dyn TypeBehavior>,
        kind: TypeKind,
        builtin: bool,
    ) -> TypeRef {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    record: None,
                });
                (self.entries.len() - 1) as u32
            }
        };
        let ty = TypeRef {
            index,
            generation: self.entries[index as usize].generation,
        };

        let mut ancestors: SmallVec<[TypeRef; 8]> = smallvec![ty];
        if let Some(parent) = parent
            && let Some(record) = self.record_mut(parent)
        {
            record.pins += 1;
            ancestors.extend_from_slice(&record.ancestors);
        }

        self.entries[index as usize].record = Some(TypeRecord {
            name: name.into(),
            parent,
            size,
            behavior,
            ancestors,
            pins: 0,
            kind,
            builtin,
        });
        self.by_name.insert(name.into(), ty);
        ty
    }

    fn record_mut(&mut self, ty: TypeRef) -> Option<&mut TypeRecord> {
        let entry = self.entries.get_mut(ty.index as usize)?;
        if entry.generation != ty.generation {
            return None;
        }
        entry.record.as_mut()
    }

    /// Register a child of `parent` (the base type when `None`)
    pub fn register(
        &mut self,
        name: &str,
        parent: Option<&str>,
        size: usize,
        behavior: Rc<dyn TypeBehavior>,
    ) -> CoreResult<TypeRef> {
        if name.is_empty() || name.len() > self.max_name_len {
            return Err(Status::allocation_failed(format!(
                "type name must be 1..={} bytes, got {}",
                self.max_name_len,
                name.len()
            )));
        }
        if self.by_name.contains_key(name) {
            return Err(Status::type_exists(name));
        }

        let parent = match parent {
            Some(parent) => self.lookup(parent)?,
            None => self.core.object,
        };
        let parent_record = self.record(parent)?;
        let (parent_kind, parent_size) = (parent_record.kind, parent_record.size);
        if parent_kind != TypeKind::Object {
            return Err(Status::invalid_state(format!(
                "type `{name}` cannot derive from a {parent_kind:?} type"
            )));
        }
        // Ancestor levels write into the same native bytes
        if size < parent_size {
            return Err(Status::argument_value(format!(
                "type `{name}` needs at least the {parent_size} bytes of its parent, got {size}"
            )));
        }

        let ty = self.insert(name, Some(parent), size, behavior, TypeKind::Object, false);
        tracing::debug!(target: "keel::runtime", name, size, "registered type");
        Ok(ty)
    }

    /// Look a type up by name
    pub fn lookup(&self, name: &str) -> CoreResult<TypeRef> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Status::not_exists(format!("type `{name}` is not registered")))
    }

    /// Remove an unpinned, non-builtin type
    pub fn unregister(&mut self, name: &str) -> CoreResult<()> {
        let ty = self.lookup(name)?;
        let record = self.record(ty)?;
        if record.builtin {
            return Err(Status::invalid_state(format!(
                "builtin type `{name}` cannot be unregistered"
            )));
        }
        if record.pins > 0 {
            return Err(Status::invalid_state(format!(
                "type `{name}` is pinned {} times",
                record.pins
            )));
        }
        let parent = record.parent;

        self.by_name.remove(name);
        let entry = &mut self.entries[ty.index as usize];
        entry.record = None;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(ty.index);
        if let Some(parent) = parent {
            self.unpin(parent)?;
        }

        tracing::debug!(target: "keel::runtime", name, "unregistered type");
        Ok(())
    }

    /// Borrow a live record
    pub fn record(&self, ty: TypeRef) -> CoreResult<&TypeRecord> {
        self.entries
            .get(ty.index as usize)
            .filter(|entry| entry.generation == ty.generation)
            .and_then(|entry| entry.record.as_ref())
            .ok_or_else(|| Status::not_exists(format!("{ty:?} is not registered")))
    }

    /// True if `ty` names a registered type
    pub fn contains(&self, ty: TypeRef) -> bool {
        self.record(ty).is_ok()
    }

    /// Walk `candidate`'s parent chain looking for `ancestor`
    pub fn is_subtype_of(&self, candidate: TypeRef, ancestor: TypeRef) -> CoreResult<bool> {
        self.record(ancestor)?;
        let mut current = Some(candidate);
        while let Some(ty) = current {
            if ty == ancestor {
                return Ok(true);
            }
            current = self.record(ty)?.parent;
        }
        Ok(false)
    }

    /// Leaf-to-root ancestors of `ty`, including `ty`
    pub fn ancestors(&self, ty: TypeRef) -> CoreResult<&[TypeRef]> {
        Ok(self.record(ty)?.ancestors())
    }

    /// Add a pin; returns the new count
    pub fn pin(&mut self, ty: TypeRef) -> CoreResult<u32> {
        let record = self
            .record_mut(ty)
            .ok_or_else(|| Status::not_exists(format!("{ty:?} is not registered")))?;
        record.pins = record
            .pins
            .checked_add(1)
            .ok_or_else(|| Status::invalid_state("type pin count overflow"))?;
        Ok(record.pins)
    }

    /// Drop a pin; returns the new count
    pub fn unpin(&mut self, ty: TypeRef) -> CoreResult<u32> {
        let record = self
            .record_mut(ty)
            .ok_or_else(|| Status::not_exists(format!("{ty:?} is not registered")))?;
        record.pins = record.pins.checked_sub(1).ok_or_else(|| {
            Status::invalid_state(format!("type `{}` is not pinned", record.name))
        })?;
        Ok(record.pins)
    }

    /// Builtin type handles
    pub fn core(&self) -> &CoreTypes {
        &self.core
    }

    /// Teardown counter; advances on every [`teardown`](Self::teardown)
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of registered types, builtins included
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Names of every registered type, in no particular order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(|name| &**name)
    }

    /// Drop every type and reinstall the builtins under a new epoch.
    ///
    /// Returns the number of non-builtin types removed.
    pub fn teardown(&mut self) -> usize {
        let mut removed = 0;
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if let Some(record) = entry.record.take() {
                if !record.builtin {
                    removed += 1;
                }
                entry.generation = entry.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        // Lowest indices first, matching a fresh registry's layout
        self.free.sort_unstable_by(|a, b| b.cmp(a));
        self.by_name.clear();
        self.epoch += 1;
        self.install_core();
        removed
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.by_name.len())
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// Memoized registration owned by a call site.
///
/// The first [`get`](Self::get) registers the type (or finds it already
/// registered) and caches the handle. The cache is keyed by the registry epoch,
/// so it re-registers after [`Runtime::shutdown`].
pub struct TypeSlot {
    name: &'static str,
    parent: Option<&'static str>,
    size: usize,
    make: fn() -> Rc<dyn TypeBehavior>,
    cached: Cell<Option<(u64, TypeRef)>>,
}

impl TypeSlot {
    pub const fn new(
        name: &'static str,
        parent: Option<&'static str>,
        size: usize,
        make: fn() -> Rc<dyn TypeBehavior>,
    ) -> Self {
        Self {
            name,
            parent,
            size,
            make,
            cached: Cell::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Resolve the type, registering it on first use in this epoch
    pub fn get(&self, rt: &mut Runtime) -> CoreResult<TypeRef> {
        let epoch = rt.types().epoch();
        if let Some((cached_epoch, ty)) = self.cached.get()
            && cached_epoch == epoch
            && rt.types().contains(ty)
        {
            return Ok(ty);
        }

        let ty = match rt.types().lookup(self.name) {
            Ok(ty) => ty,
            Err(_) => rt.register_type(self.name, self.parent, self.size, (self.make)())?,
        };
        self.cached.set(Some((epoch, ty)));
        Ok(ty)
    }

    /// Forget the cached handle
    pub fn reset(&self) {
        self.cached.set(None);
    }
}

impl fmt::Debug for TypeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeSlot")
            .field("name", &self.name)
            .field("cached", &self.cached.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusKind;

    fn registry() -> TypeRegistry {
        TypeRegistry::new(64)
    }

    #[test]
    fn test_core_types() {
        let types = registry();
        let core = *types.core();
        assert_eq!(types.lookup("Object").unwrap(), core.object);
        assert_eq!(types.lookup("RawMemory").unwrap(), core.raw_memory);
        assert_eq!(
            types.record(core.scalar(ValueTag::Int32)).unwrap().kind(),
            TypeKind::Scalar(ValueTag::Int32)
        );
        assert_eq!(core.scalar(ValueTag::Object), core.object);
        assert!(types.record(core.object).unwrap().is_builtin());
        assert!(types.is_subtype_of(core.raw_memory, core.object).unwrap());
    }

    #[test]
    fn test_register_and_ancestors() {
        let mut types = registry();
        let object = types.core().object;
        let a = types.register("A", None, 8, Rc::new(InertBehavior)).unwrap();
        let b = types.register("B", Some("A"), 4, Rc::new(InertBehavior)).unwrap();

        assert_eq!(types.ancestors(b).unwrap(), &[b, a, object]);
        assert!(types.is_subtype_of(b, a).unwrap());
        assert!(types.is_subtype_of(b, b).unwrap());
        assert!(!types.is_subtype_of(a, b).unwrap());
        assert_eq!(types.record(a).unwrap().pins(), 1);
        assert!(!types.record(a).unwrap().is_builtin());
    }

    #[test]
    fn test_register_failures() {
        let mut types = registry();
        types.register("A", None, 0, Rc::new(InertBehavior)).unwrap();

        let dup = types.register("A", None, 0, Rc::new(InertBehavior));
        assert_eq!(dup.unwrap_err().kind(), StatusKind::TypeExists);

        let orphan = types.register("B", Some("Missing"), 0, Rc::new(InertBehavior));
        assert_eq!(orphan.unwrap_err().kind(), StatusKind::NotExists);

        let empty = types.register("", None, 0, Rc::new(InertBehavior));
        assert_eq!(empty.unwrap_err().kind(), StatusKind::AllocationFailed);

        let long = "x".repeat(65);
        let long = types.register(&long, None, 0, Rc::new(InertBehavior));
        assert_eq!(long.unwrap_err().kind(), StatusKind::AllocationFailed);

        let scalar_child = types.register("C", Some("Int32"), 0, Rc::new(InertBehavior));
        assert_eq!(scalar_child.unwrap_err().kind(), StatusKind::InvalidState);
    }

    #[test]
    fn test_unregister() {
        let mut types = registry();
        let a = types.register("A", None, 0, Rc::new(InertBehavior)).unwrap();
        types.register("B", Some("A"), 0, Rc::new(InertBehavior)).unwrap();

        assert_eq!(
            types.unregister("A").unwrap_err().kind(),
            StatusKind::InvalidState
        );
        types.unregister("B").unwrap();
        assert_eq!(types.record(a).unwrap().pins(), 0);
        types.unregister("A").unwrap();

        assert_eq!(types.record(a).unwrap_err().kind(), StatusKind::NotExists);
        assert_eq!(
            types.unregister("A").unwrap_err().kind(),
            StatusKind::NotExists
        );
        assert_eq!(
            types.unregister("Object").unwrap_err().kind(),
            StatusKind::InvalidState
        );

        // Reused slot gets a fresh generation
        let again = types.register("A", None, 0, Rc::new(InertBehavior)).unwrap();
        assert_ne!(again, a);
    }

    #[test]
    fn test_unpin_at_zero() {
        let mut types = registry();
        let a = types.register("A", None, 0, Rc::new(InertBehavior)).unwrap();
        assert_eq!(types.pin(a).unwrap(), 1);
        assert_eq!(types.unpin(a).unwrap(), 0);
        assert_eq!(types.unpin(a).unwrap_err().kind(), StatusKind::InvalidState);
    }

    #[test]
    fn test_teardown() {
        let mut types = registry();
        let before = types.len();
        let a = types.register("A", None, 0, Rc::new(InertBehavior)).unwrap();
        let object = types.core().object;

        assert_eq!(types.teardown(), 1);
        assert_eq!(types.epoch(), 1);
        assert_eq!(types.len(), before);
        assert!(!types.contains(a));
        assert!(!types.contains(object));
        assert!(types.lookup("A").is_err());
        assert_ne!(types.core().object, object);
    }
}
