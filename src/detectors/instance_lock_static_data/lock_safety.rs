use std::collections::BTreeSet;

use crate::ir::{InstanceKey, Procedure, ProcedureId, ValueNumber};
use crate::model::{ProgramModel, StaticField};

/// Abstract objects reachable by reading any non-ignored static field.
#[derive(Clone, Debug, Default)]
pub(crate) struct GlobalObjectSet {
    instances: BTreeSet<InstanceKey>,
}

impl GlobalObjectSet {
    pub(crate) fn collect(model: &ProgramModel, static_fields: &[StaticField]) -> Self {
        let mut instances = BTreeSet::new();
        for field in static_fields {
            let pointed = model.points_to_static(field);
            tracing::debug!(
                "static field {}.{} (final: {}) points to {} instances",
                field.class,
                field.name,
                field.is_final,
                pointed.len()
            );
            instances.extend(pointed.iter().copied());
        }
        Self { instances }
    }

    pub(crate) fn contains_all(&self, instances: &BTreeSet<InstanceKey>) -> bool {
        instances.is_subset(&self.instances)
    }

    pub(crate) fn intersects(&self, instances: &BTreeSet<InstanceKey>) -> bool {
        !instances.is_disjoint(&self.instances)
    }

    pub(crate) fn len(&self) -> usize {
        self.instances.len()
    }
}

/// Decides whether a lock guards only global state.
#[derive(Clone, Copy)]
pub(crate) struct LockSafety<'a> {
    model: &'a ProgramModel,
    globals: &'a GlobalObjectSet,
}

impl<'a> LockSafety<'a> {
    pub(crate) fn new(model: &'a ProgramModel, globals: &'a GlobalObjectSet) -> Self {
        Self { model, globals }
    }

    /// A lock is safe iff its points-to set is known and wholly global.
    ///
    /// An empty set means the oracle knows nothing, which cannot prove safety.
    pub(crate) fn is_safe_lock(&self, procedure: ProcedureId, lock: ValueNumber) -> bool {
        let pointed = self.model.points_to_local(procedure, lock);
        !pointed.is_empty() && self.globals.contains_all(pointed)
    }

    /// Static methods have no instance lock; instance methods need a safe `this`.
    pub(crate) fn is_safe_method(&self, id: ProcedureId, procedure: &Procedure) -> bool {
        match procedure.receiver() {
            None => true,
            Some(this) => self.is_safe_lock(id, this),
        }
    }

    pub(crate) fn is_safe_synchronized(&self, id: ProcedureId, procedure: &Procedure) -> bool {
        procedure.is_synchronized && self.is_safe_method(id, procedure)
    }

    pub(crate) fn is_unsafe_synchronized(&self, id: ProcedureId, procedure: &Procedure) -> bool {
        procedure.is_synchronized && !self.is_safe_method(id, procedure)
    }
}
