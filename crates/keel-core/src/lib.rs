//! # Keel Core
//!
//! Object/type runtime substrate:
//!
//! - Type registry with single inheritance and per-type behaviors
//! - Object allocation with a two-phase allocate-then-construct protocol
//! - Pin counting plus a cycle-collecting tracer (via `keel-gc`)
//! - A tagged [`Value`] model with polymorphic equality, hashing and ordering
//! - A shared argument stack used as the calling convention for constructors
//!   and foreign procedures
//! - Guarded regions and a status channel for error propagation
//!
//! ```
//! use std::rc::Rc;
//! use keel_core::{Runtime, TypeBehavior, Value};
//!
//! struct Point;
//! impl TypeBehavior for Point {}
//!
//! let mut rt = Runtime::new();
//! let point = rt.register_type("Point", None, 16, Rc::new(Point)).unwrap();
//! let object = rt.allocate_with(point, &[]).unwrap();
//! assert_eq!(rt.object_type(object).unwrap(), point);
//! assert!(rt.is_subtype_of(point, rt.lookup_type("Object").unwrap()).unwrap());
//! assert!(rt.equals(&Value::Object(object), &Value::Object(object)).unwrap());
//! ```

#![warn(clippy::all)]

pub mod args;
pub mod atom;
pub mod builtins;
pub mod collections;
pub mod config;
pub mod continuation;
pub mod error;
pub mod object;
pub mod runtime;
pub mod trace;
pub mod types;
pub mod value;

pub use args::{ArgumentStack, Arguments, StackMark};
pub use atom::{Atom, AtomTable};
pub use config::RuntimeConfig;
pub use continuation::{ContinuationStack, Continuations, guard};
pub use error::{CoreResult, Status, StatusKind};
pub use keel_gc::GcStats;
pub use object::{ObjectData, ObjectRef};
pub use runtime::{ConstructContext, DestructContext, Runtime, ShutdownReport};
pub use trace::{Edges, VisitSink, Visitor};
pub use types::{TypeBehavior, TypeKind, TypeRecord, TypeRef, TypeRegistry, TypeSlot};
pub use value::{ForeignProc, NativeFn, Value, ValueTag};
