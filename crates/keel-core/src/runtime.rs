//! The execution context
//!
//! A [`Runtime`] owns one type registry, one object heap, one argument stack
//! and one continuation stack. It is single-threaded (`!Send`, `!Sync`).
//!
//! ## Allocation
//!
//! `allocate` consumes a frame from the argument stack: the root-most level's
//! arguments deepest, the leaf's on top, then a `Value::Size(n)` marker. Fresh
//! storage is tagged with the `RawMemory` sentinel while the construct chain
//! runs; the real type is installed with [`Runtime::set_type`] once every
//! level has succeeded. If any level fails, the levels already constructed are
//! destructed leaf first and the storage is released, so pins and the live
//! object count are as they were before the call. Either way the argument
//! stack is restored to its depth before the frame was pushed.
//!
//! ## Collection
//!
//! Roots are pinned objects not explained by heap references, objects on the
//! argument stack, arguments held by running constructors and procedures, and
//! objects under construction.

use std::cmp::Ordering;
use std::rc::Rc;

use keel_gc::{AllocationRegistry, GcStats, Handle};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::args::{ArgumentStack, Arguments};
use crate::atom::{Atom, AtomTable};
use crate::config::RuntimeConfig;
use crate::continuation::{ContinuationStack, Continuations, guard};
use crate::error::{CoreResult, Status, StatusKind};
use crate::object::{OBJECT_HEADER_SIZE, ObjectCell, ObjectData, ObjectRef};
use crate::trace::{CollectorSink, Edges, VisitSink, Visitor};
use crate::types::{TypeBehavior, TypeKind, TypeRecord, TypeRef, TypeRegistry};
use crate::value::{ForeignProc, Value, mix64};

type Levels = SmallVec<[TypeRef; 8]>;

/// What [`Runtime::shutdown`] found and released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownReport {
    /// Objects reclaimed by the final collection
    pub collected: usize,
    /// Objects still pinned from outside the heap, finalized anyway
    pub still_pinned: usize,
    /// Objects created by destructors during shutdown, freed afterwards
    pub allocated_by_destructors: usize,
    /// Non-builtin types removed from the registry
    pub types_removed: usize,
}

/// One execution context
pub struct Runtime {
    config: RuntimeConfig,
    types: TypeRegistry,
    heap: AllocationRegistry<ObjectCell>,
    args: ArgumentStack,
    continuations: ContinuationStack,
    atoms: AtomTable,
    /// Objects whose construct chain is running
    constructing: Vec<ObjectRef>,
    /// Arguments taken off the stack by running levels and procedures
    held: Vec<Value>,
    collecting: bool,
}

impl Runtime {
    /// Create a runtime with default config
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime from a config
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            types: TypeRegistry::new(config.max_type_name_len),
            heap: AllocationRegistry::with_config(config.gc.clone()),
            args: ArgumentStack::with_limit(config.max_argument_depth),
            continuations: ContinuationStack::with_max_depth(config.max_continuation_depth),
            atoms: AtomTable::new(),
            constructing: Vec::new(),
            held: Vec::new(),
            collecting: false,
            config,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The type registry
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// The shared argument stack
    pub fn arguments(&self) -> &ArgumentStack {
        &self.args
    }

    pub fn arguments_mut(&mut self) -> &mut ArgumentStack {
        &mut self.args
    }

    /// Push one value onto the argument stack
    pub fn push(&mut self, value: Value) -> CoreResult<()> {
        self.args.push(value)
    }

    /// Push a frame and its count marker
    pub fn push_frame(&mut self, values: &[Value]) -> CoreResult<()> {
        self.args.push_frame(values)
    }

    // ---------------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------------

    /// Register a type under `parent` (the base type when `None`)
    pub fn register_type(
        &mut self,
        name: &str,
        parent: Option<&str>,
        size: usize,
        behavior: Rc<dyn TypeBehavior>,
    ) -> CoreResult<TypeRef> {
        self.types.register(name, parent, size, behavior)
    }

    pub fn lookup_type(&self, name: &str) -> CoreResult<TypeRef> {
        self.types.lookup(name)
    }

    /// Remove a type that has no objects, children or stored references
    pub fn unregister_type(&mut self, name: &str) -> CoreResult<()> {
        self.types.unregister(name)
    }

    pub fn type_record(&self, ty: TypeRef) -> CoreResult<&TypeRecord> {
        self.types.record(ty)
    }

    pub fn type_name(&self, ty: TypeRef) -> CoreResult<&str> {
        Ok(self.types.record(ty)?.name())
    }

    /// True when `ancestor` is `candidate` or one of its ancestors
    pub fn is_subtype_of(&self, candidate: TypeRef, ancestor: TypeRef) -> CoreResult<bool> {
        self.types.is_subtype_of(candidate, ancestor)
    }

    /// Leaf-to-root ancestor list of `ty`, including `ty`
    pub fn ancestors(&self, ty: TypeRef) -> CoreResult<&[TypeRef]> {
        self.types.ancestors(ty)
    }

    /// Current pin count of a type
    pub fn type_pins(&self, ty: TypeRef) -> CoreResult<u32> {
        Ok(self.types.record(ty)?.pins())
    }

    /// Runtime type of any value
    pub fn type_of(&self, value: &Value) -> CoreResult<TypeRef> {
        match value {
            Value::Object(object) => self.object_type(*object),
            scalar => Ok(self.types.core().scalar(scalar.tag())),
        }
    }

    // ---------------------------------------------------------------------
    // Objects
    // ---------------------------------------------------------------------

    /// Allocate and construct an object of type `ty`, consuming the frame on
    /// top of the argument stack.
    ///
    /// The new object is unpinned; lock it or store it before the next
    /// collection.
    pub fn allocate(&mut self, ty: TypeRef) -> CoreResult<ObjectRef> {
        let mark = self.args.frame_mark()?;
        let result = self.allocate_frame(ty);
        self.args.restore(mark);
        result
    }

    /// Push `args` as a frame and allocate
    pub fn allocate_with(&mut self, ty: TypeRef, args: &[Value]) -> CoreResult<ObjectRef> {
        self.args.push_frame(args)?;
        self.allocate(ty)
    }

    fn allocate_frame(&mut self, ty: TypeRef) -> CoreResult<ObjectRef> {
        let record = self.types.record(ty)?;
        if record.kind() != TypeKind::Object {
            return Err(Status::invalid_state(format!(
                "`{}` is not an object type",
                record.name()
            )));
        }
        let levels: Levels = record.ancestors().iter().copied().collect();
        let size = record.size();
        let total = OBJECT_HEADER_SIZE
            .checked_add(size)
            .ok_or_else(|| Status::allocation_failed(format!("object size {size} overflows")))?;

        if self.config.auto_collect && !self.collecting && self.heap.should_gc() {
            self.collect()?;
        }
        self.heap.ensure_headroom(total)?;

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|err| Status::allocation_failed(err.to_string()))?;
        bytes.resize(size, 0);

        // Memory pin, held for the object's lifetime
        let raw = self.types.core().raw_memory;
        self.types.pin(raw)?;
        let cell = ObjectCell::new(raw, ObjectData::with_bytes(bytes.into_boxed_slice()));
        let handle = match self.heap.allocate(cell, total) {
            Ok(handle) => handle,
            Err(err) => {
                self.release_type(raw);
                return Err(err.into());
            }
        };
        let object = ObjectRef(handle);
        // Type pin, moved to the real type once construction completes
        if let Err(err) = self.types.pin(raw) {
            let _ = self.heap.free(handle);
            self.release_type(raw);
            return Err(err);
        }

        let constructing = self.constructing.len();
        self.constructing.push(object);
        let mut completed = Levels::new();
        let result = self.construct_level(object, &levels, 0, &mut completed);
        self.constructing.truncate(constructing);

        match result {
            Ok(()) => {
                self.set_type(object, ty)?;
                Ok(object)
            }
            Err(err) => {
                tracing::debug!(
                    target: "keel::runtime",
                    ty = ?ty,
                    completed = completed.len(),
                    status = %err,
                    "construction failed, rolling back"
                );
                self.roll_back(object, &completed);
                Err(err)
            }
        }
    }

    /// Run level `index` of the chain: take its arguments, delegate to the
    /// ancestor, then construct this level
    fn construct_level(
        &mut self,
        object: ObjectRef,
        levels: &[TypeRef],
        index: usize,
        completed: &mut Levels,
    ) -> CoreResult<()> {
        let level = levels[index];
        let behavior = self.types.record(level)?.behavior();
        let arity = behavior.arity();

        let available = self.args.pop_count()?;
        if available < arity {
            return Err(Status::argument_count(format!(
                "`{}` takes {arity} arguments, {available} supplied",
                self.types.record(level)?.name()
            )));
        }
        let own = self.args.take_top(arity)?;
        self.args.push_count(available - arity)?;

        let held = self.held.len();
        self.held.extend_from_slice(own.as_slice());
        let result = self.construct_rest(object, levels, index, &*behavior, own, completed);
        self.held.truncate(held);
        result
    }

    fn construct_rest(
        &mut self,
        object: ObjectRef,
        levels: &[TypeRef],
        index: usize,
        behavior: &dyn TypeBehavior,
        own: Arguments,
        completed: &mut Levels,
    ) -> CoreResult<()> {
        if index + 1 < levels.len() {
            self.construct_level(object, levels, index + 1, completed)?;
        } else {
            let leftover = self.args.pop_count()?;
            if leftover != 0 {
                return Err(Status::argument_count(format!(
                    "{leftover} arguments left over after the base level"
                )));
            }
        }

        let level = levels[index];
        let mut cx = ConstructContext {
            rt: self,
            object,
            level,
        };
        behavior.construct(&mut cx, own)?;
        completed.push(level);
        Ok(())
    }

    /// Undo a failed construction: destruct completed levels leaf first, free
    /// the storage and drop both sentinel pins
    fn roll_back(&mut self, object: ObjectRef, completed: &[TypeRef]) {
        let raw = self.types.core().raw_memory;
        match self.heap.free(object.0) {
            Ok(cell) => {
                let mut data = cell.data;
                for level in completed.iter().rev() {
                    let Ok(record) = self.types.record(*level) else {
                        continue;
                    };
                    let behavior = record.behavior();
                    behavior.destruct(&mut DestructContext {
                        rt: self,
                        object,
                        data: &mut data,
                    });
                }
                self.release_fields(&mut data);
            }
            Err(err) => {
                tracing::warn!(target: "keel::runtime", ?object, %err, "object vanished during construction");
            }
        }
        self.release_type(raw);
        self.release_type(raw);
    }

    /// Replace an object's type, pinning the new type before unpinning the old
    pub fn set_type(&mut self, object: ObjectRef, ty: TypeRef) -> CoreResult<()> {
        let record = self.types.record(ty)?;
        if record.kind() != TypeKind::Object {
            return Err(Status::invalid_state(format!(
                "objects cannot take the {:?} type `{}`",
                record.kind(),
                record.name()
            )));
        }
        let old = self.heap.get(object.0)?.ty;
        if old == ty {
            return Ok(());
        }
        self.types.pin(ty)?;
        match self.heap.get_mut(object.0) {
            Ok(cell) => cell.ty = ty,
            Err(err) => {
                self.release_type(ty);
                return Err(err.into());
            }
        }
        self.types.unpin(old)?;
        Ok(())
    }

    /// Current most-derived type of an object
    pub fn object_type(&self, object: ObjectRef) -> CoreResult<TypeRef> {
        Ok(self.heap.get(object.0)?.ty)
    }

    /// True if `object` is live
    pub fn is_live(&self, object: ObjectRef) -> bool {
        self.heap.contains(object.0)
    }

    /// Pin an object; returns the new pin count
    pub fn lock(&mut self, object: ObjectRef) -> CoreResult<u32> {
        Ok(self.heap.pin(object.0)?)
    }

    /// Drop a pin; fails with `InvalidState` when the object is not pinned
    pub fn unlock(&mut self, object: ObjectRef) -> CoreResult<u32> {
        Ok(self.heap.unpin(object.0)?)
    }

    /// Current pin count of an object
    pub fn pins(&self, object: ObjectRef) -> CoreResult<u32> {
        Ok(self.heap.pins(object.0)?)
    }

    pub fn data(&self, object: ObjectRef) -> CoreResult<&ObjectData> {
        Ok(&self.heap.get(object.0)?.data)
    }

    pub fn data_mut(&mut self, object: ObjectRef) -> CoreResult<&mut ObjectData> {
        Ok(&mut self.heap.get_mut(object.0)?.data)
    }

    /// Store `value` into generic field `index`, growing the fields with
    /// `Void` as needed. The new value is pinned before the old one is
    /// released.
    pub fn store(&mut self, object: ObjectRef, index: usize, value: Value) -> CoreResult<()> {
        self.heap.get(object.0)?;
        self.retain(&value)?;
        match self.write_field(object, index, value) {
            Ok(old) => {
                self.release(&old);
                Ok(())
            }
            Err(err) => {
                self.release(&value);
                Err(err)
            }
        }
    }

    fn write_field(&mut self, object: ObjectRef, index: usize, value: Value) -> CoreResult<Value> {
        let fields = self.heap.get_mut(object.0)?.data.fields_mut();
        if fields.len() <= index {
            let len = index
                .checked_add(1)
                .ok_or_else(|| Status::allocation_failed("field index out of range"))?;
            fields
                .try_reserve_exact(len - fields.len())
                .map_err(|err| Status::allocation_failed(format!("cannot grow fields: {err}")))?;
            fields.resize(len, Value::Void);
        }
        Ok(std::mem::replace(&mut fields[index], value))
    }

    /// Load generic field `index`; unset fields read as `Void`
    pub fn load(&self, object: ObjectRef, index: usize) -> CoreResult<Value> {
        let fields = self.heap.get(object.0)?.data.fields();
        Ok(fields.get(index).copied().unwrap_or(Value::Void))
    }

    /// Pin whatever `value` references
    pub fn retain(&mut self, value: &Value) -> CoreResult<()> {
        match value {
            Value::Object(object) => {
                self.heap.pin(object.0)?;
            }
            Value::Type(ty) => {
                self.types.pin(*ty)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Drop the pin held through `value`.
    ///
    /// Targets that are already gone are skipped; when a dead cycle is
    /// finalized, members release peers that were freed first.
    pub fn release(&mut self, value: &Value) {
        match value {
            Value::Object(object) => {
                if let Err(err) = self.heap.unpin(object.0) {
                    tracing::trace!(target: "keel::runtime", ?object, %err, "release skipped");
                }
            }
            Value::Type(ty) => self.release_type(*ty),
            _ => {}
        }
    }

    fn release_type(&mut self, ty: TypeRef) {
        if let Err(err) = self.types.unpin(ty) {
            tracing::warn!(target: "keel::runtime", ?ty, %err, "type unpin failed");
        }
    }

    fn release_fields(&mut self, data: &mut ObjectData) {
        for value in data.take_fields() {
            self.release(&value);
        }
    }

    /// Visit an object: its type, then every level's references
    pub fn visit(&self, object: ObjectRef, sink: &mut dyn VisitSink) -> CoreResult<()> {
        let cell = self.heap.get(object.0)?;
        visit_cell(&self.types, cell, sink);
        Ok(())
    }

    /// Collect the edges of one object
    pub fn edges(&self, object: ObjectRef) -> CoreResult<Edges> {
        let mut edges = Edges::default();
        self.visit(object, &mut edges)?;
        Ok(edges)
    }

    /// Finalize an unpinned object immediately
    pub fn dispose(&mut self, object: ObjectRef) -> CoreResult<()> {
        if self.heap.pins(object.0)? > 0 {
            return Err(Status::invalid_state(format!("{object:?} is pinned")));
        }
        if self.constructing.contains(&object) {
            return Err(Status::invalid_state(format!("{object:?} is under construction")));
        }
        let cell = self.heap.free(object.0)?;
        self.finalize(object, cell);
        Ok(())
    }

    /// Run the destruct chain of an unlinked object and drop its pins
    fn finalize(&mut self, object: ObjectRef, cell: ObjectCell) {
        let ObjectCell { ty, mut data } = cell;
        let raw = self.types.core().raw_memory;
        self.release_type(raw);

        let behaviors: SmallVec<[Rc<dyn TypeBehavior>; 8]> = match self.types.ancestors(ty) {
            Ok(levels) => levels
                .iter()
                .filter_map(|level| self.types.record(*level).ok())
                .map(TypeRecord::behavior)
                .collect(),
            Err(err) => {
                tracing::warn!(target: "keel::runtime", ?object, %err, "finalizing object of a vanished type");
                SmallVec::new()
            }
        };
        for behavior in behaviors {
            behavior.destruct(&mut DestructContext {
                rt: self,
                object,
                data: &mut data,
            });
        }
        self.release_fields(&mut data);
        self.release_type(ty);
    }

    /// Number of live objects
    pub fn live_objects(&self) -> usize {
        self.heap.allocation_count()
    }

    // ---------------------------------------------------------------------
    // Collection
    // ---------------------------------------------------------------------

    /// Run a full collection; returns bytes reclaimed
    pub fn collect(&mut self) -> CoreResult<usize> {
        if self.collecting {
            return Err(Status::invalid_state("collection already in progress"));
        }
        self.collecting = true;

        let roots: Vec<Handle> = self
            .args
            .values()
            .iter()
            .chain(self.held.iter())
            .filter_map(Value::as_object)
            .chain(self.constructing.iter().copied())
            .map(ObjectRef::handle)
            .collect();

        let types = &self.types;
        let dead = self.heap.mark(&roots, |handle, cell, tracer| {
            tracer.report_header(handle);
            visit_cell(types, cell, &mut CollectorSink(tracer));
        });

        let count = dead.len();
        for handle in dead {
            if let Ok(cell) = self.heap.free(handle) {
                self.finalize(ObjectRef(handle), cell);
            }
        }
        let reclaimed = self.heap.finish_cycle();
        self.collecting = false;

        tracing::debug!(
            target: "keel::runtime",
            objects = count,
            bytes = reclaimed,
            live = self.heap.allocation_count(),
            "collection finished"
        );
        Ok(reclaimed)
    }

    /// True once live bytes pass the GC threshold
    pub fn should_collect(&self) -> bool {
        self.heap.should_gc()
    }

    pub fn gc_stats(&self) -> GcStats {
        self.heap.stats()
    }

    /// Finalize every object and reset the registry to its builtins.
    ///
    /// Stacks are cleared first, so only pins keep objects alive through the
    /// final collection; whatever survives is reported and finalized anyway.
    pub fn shutdown(&mut self) -> CoreResult<ShutdownReport> {
        if self.collecting {
            return Err(Status::invalid_state("shutdown during collection"));
        }
        self.args.truncate(0);
        self.held.clear();
        self.constructing.clear();

        let existing: FxHashSet<Handle> = self.heap.handles().into_iter().collect();
        self.collect()?;
        let collected = self.heap.stats().last_freed;

        let mut still_pinned = 0;
        let mut allocated_by_destructors = 0;
        // Destructors may allocate; a second pass frees anything they left
        for _ in 0..2 {
            let drained = self.heap.drain_all();
            if drained.is_empty() {
                break;
            }
            for (handle, cell) in drained {
                if existing.contains(&handle) {
                    still_pinned += 1;
                } else {
                    allocated_by_destructors += 1;
                }
                self.finalize(ObjectRef(handle), cell);
            }
        }
        if self.heap.allocation_count() > 0 {
            tracing::warn!(
                target: "keel::runtime",
                remaining = self.heap.allocation_count(),
                "destructors kept allocating during shutdown"
            );
            allocated_by_destructors += self.heap.drain_all().len();
        }

        let types_removed = self.types.teardown();
        self.args.truncate(0);
        self.continuations = ContinuationStack::with_max_depth(self.config.max_continuation_depth);

        let report = ShutdownReport {
            collected,
            still_pinned,
            allocated_by_destructors,
            types_removed,
        };
        if still_pinned > 0 {
            tracing::warn!(target: "keel::runtime", ?report, "objects still pinned at shutdown");
        } else {
            tracing::info!(target: "keel::runtime", ?report, "runtime shut down");
        }
        Ok(report)
    }

    // ---------------------------------------------------------------------
    // Values
    // ---------------------------------------------------------------------

    /// Equality over any two values.
    ///
    /// Objects use the nearest equality overload of either operand, falling
    /// back to identity.
    pub fn equals(&self, a: &Value, b: &Value) -> CoreResult<bool> {
        match (a, b) {
            (Value::Object(object), other) | (other, Value::Object(object)) => {
                if let Some(result) = self.resolve(*object, |behavior| {
                    behavior.equals(self, *object, other)
                })? {
                    return result;
                }
                if let (Value::Object(a), Value::Object(b)) = (a, b)
                    && a != b
                    && let Some(result) =
                        self.resolve(*b, |behavior| behavior.equals(self, *b, &Value::Object(*a)))?
                {
                    return result;
                }
                Ok(matches!((a, b), (Value::Object(a), Value::Object(b)) if a == b))
            }
            _ => Ok(a.scalar_eq(b).unwrap_or(false)),
        }
    }

    /// Hash consistent with [`equals`](Self::equals)
    pub fn hash(&self, value: &Value) -> CoreResult<u64> {
        match value {
            Value::Object(object) => {
                if let Some(result) =
                    self.resolve(*object, |behavior| behavior.hash(self, *object))?
                {
                    return result;
                }
                Ok(mix64(object.to_bits()))
            }
            scalar => Ok(scalar.scalar_hash().unwrap_or_default()),
        }
    }

    /// Ordering; fails with `ArgumentTypeInvalid` when neither side defines one
    pub fn compare(&self, a: &Value, b: &Value) -> CoreResult<Ordering> {
        if let Value::Object(object) = a
            && let Some(result) =
                self.resolve(*object, |behavior| behavior.compare(self, *object, b))?
        {
            return result;
        }
        if let Value::Object(object) = b
            && let Some(result) =
                self.resolve(*object, |behavior| behavior.compare(self, *object, a))?
        {
            return result.map(Ordering::reverse);
        }
        a.scalar_cmp(b).ok_or_else(|| {
            Status::argument_type(format!(
                "values of {:?} and {:?} are not ordered",
                a.tag(),
                b.tag()
            ))
        })
    }

    /// First `Some` from the object's levels, leaf first
    fn resolve<R>(
        &self,
        object: ObjectRef,
        mut overload: impl FnMut(&dyn TypeBehavior) -> Option<R>,
    ) -> CoreResult<Option<R>> {
        let ty = self.object_type(object)?;
        for level in self.types.ancestors(ty)? {
            if let Some(result) = overload(self.types.record(*level)?.dispatch()) {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// Intern an atom
    pub fn intern(&mut self, name: &str) -> Atom {
        self.atoms.intern(name)
    }

    pub fn atom_name(&self, atom: Atom) -> Option<&str> {
        self.atoms.resolve(atom)
    }

    // ---------------------------------------------------------------------
    // Procedures and the status channel
    // ---------------------------------------------------------------------

    /// Call a foreign procedure with the frame on top of the argument stack.
    ///
    /// The frame is consumed; values the procedure pushes stay on the stack.
    /// On failure the stack is restored to its depth before the frame.
    pub fn call(&mut self, proc: ForeignProc) -> CoreResult<()> {
        let mark = self.args.frame_mark()?;
        let argc = self.args.pop_count()?;
        if argc != proc.arity() {
            self.args.restore(mark);
            return Err(Status::argument_count(format!(
                "`{}` takes {} arguments, {argc} supplied",
                proc.name(),
                proc.arity()
            )));
        }
        let args = self.args.take_top(argc)?;

        let held = self.held.len();
        self.held.extend_from_slice(args.as_slice());
        let result = (proc.func())(self, args);
        self.held.truncate(held);

        if result.is_err() {
            self.args.restore(mark);
        }
        result
    }

    /// Run `region` in a guarded region; see [`guard`]
    pub fn guarded<T>(
        &mut self,
        label: &'static str,
        region: impl FnOnce(&mut Runtime) -> CoreResult<T>,
    ) -> CoreResult<T> {
        guard(self, label, region)
    }

    pub fn set_status(&mut self, kind: StatusKind) {
        self.continuations.set_status(kind);
    }

    pub fn status(&self) -> StatusKind {
        self.continuations.status()
    }

    /// Escape to the nearest guard with the current status
    pub fn jump<T>(&self) -> CoreResult<T> {
        self.continuations.jump()
    }

    /// Current guard nesting
    pub fn guard_depth(&self) -> usize {
        self.continuations.depth()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Continuations for Runtime {
    fn continuations(&mut self) -> &mut ContinuationStack {
        &mut self.continuations
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("types", &self.types)
            .field("objects", &self.heap.allocation_count())
            .field("bytes", &self.heap.total_bytes())
            .field("arguments", &self.args.depth())
            .finish()
    }
}

fn visit_cell(types: &TypeRegistry, cell: &ObjectCell, sink: &mut dyn VisitSink) {
    sink.ty(cell.ty);
    let Ok(levels) = types.ancestors(cell.ty) else {
        return;
    };
    let mut visitor = Visitor::new(sink);
    for level in levels {
        if let Ok(record) = types.record(*level) {
            record.dispatch().visit(&cell.data, &mut visitor);
        }
    }
}

/// Handed to [`TypeBehavior::construct`]
pub struct ConstructContext<'a> {
    rt: &'a mut Runtime,
    object: ObjectRef,
    level: TypeRef,
}

impl ConstructContext<'_> {
    /// The object under construction
    pub fn object(&self) -> ObjectRef {
        self.object
    }

    /// The level being constructed
    pub fn level(&self) -> TypeRef {
        self.level
    }

    pub fn runtime(&mut self) -> &mut Runtime {
        &mut *self.rt
    }

    pub fn data(&self) -> CoreResult<&ObjectData> {
        self.rt.data(self.object)
    }

    pub fn data_mut(&mut self) -> CoreResult<&mut ObjectData> {
        self.rt.data_mut(self.object)
    }

    /// Store into a generic field of the object under construction
    pub fn store(&mut self, index: usize, value: Value) -> CoreResult<()> {
        self.rt.store(self.object, index, value)
    }
}

/// Handed to [`TypeBehavior::destruct`].
///
/// The object is already unlinked from the heap; its storage is reachable only
/// through this context.
pub struct DestructContext<'a> {
    rt: &'a mut Runtime,
    object: ObjectRef,
    data: &'a mut ObjectData,
}

impl DestructContext<'_> {
    /// The (now stale) object being destructed
    pub fn object(&self) -> ObjectRef {
        self.object
    }

    pub fn runtime(&mut self) -> &mut Runtime {
        &mut *self.rt
    }

    pub fn data(&self) -> &ObjectData {
        &*self.data
    }

    pub fn data_mut(&mut self) -> &mut ObjectData {
        &mut *self.data
    }

    /// Drop the pin held through `value`
    pub fn release(&mut self, value: &Value) {
        self.rt.release(value);
    }

    /// Release and clear the generic fields
    pub fn release_fields(&mut self) {
        self.rt.release_fields(&mut *self.data);
    }
}
