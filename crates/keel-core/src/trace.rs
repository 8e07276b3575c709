//! Reachability visiting

use keel_gc::Tracer;

use crate::object::{ObjectCell, ObjectRef};
use crate::types::TypeRef;
use crate::value::Value;

/// Receiver of reachability edges
pub trait VisitSink {
    /// An object-valued edge
    fn object(&mut self, object: ObjectRef);

    /// A type-valued edge
    fn ty(&mut self, ty: TypeRef);
}

/// Edge reporter handed to [`TypeBehavior::visit`](crate::types::TypeBehavior::visit).
///
/// A visit callback must report each object-valued field exactly once; the
/// collector discounts one pin per reported edge.
pub struct Visitor<'a> {
    sink: &'a mut dyn VisitSink,
}

impl<'a> Visitor<'a> {
    pub fn new(sink: &'a mut dyn VisitSink) -> Self {
        Self { sink }
    }

    /// Report a value; scalars are ignored
    pub fn visit_value(&mut self, value: &Value) {
        match value {
            Value::Object(object) => self.sink.object(*object),
            Value::Type(ty) => self.sink.ty(*ty),
            _ => {}
        }
    }

    /// Report every value in `values`
    pub fn visit_values<'v>(&mut self, values: impl IntoIterator<Item = &'v Value>) {
        for value in values {
            self.visit_value(value);
        }
    }

    pub fn visit_object(&mut self, object: ObjectRef) {
        self.sink.object(object);
    }

    pub fn visit_type(&mut self, ty: TypeRef) {
        self.sink.ty(ty);
    }
}

/// Forwards object edges to the collector's tracer.
///
/// Types are not arena allocations, so type edges stop here.
pub(crate) struct CollectorSink<'t, 'a>(pub(crate) &'t mut Tracer<'a, ObjectCell>);

impl VisitSink for CollectorSink<'_, '_> {
    fn object(&mut self, object: ObjectRef) {
        self.0.edge(object.handle());
    }

    fn ty(&mut self, _ty: TypeRef) {}
}

/// Edges of one object, in report order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Edges {
    /// Object-valued edges
    pub objects: Vec<ObjectRef>,
    /// Type-valued edges, starting with the object's own type
    pub types: Vec<TypeRef>,
}

impl VisitSink for Edges {
    fn object(&mut self, object: ObjectRef) {
        self.objects.push(object);
    }

    fn ty(&mut self, ty: TypeRef) {
        self.types.push(ty);
    }
}
