use std::collections::BTreeSet;

use crate::dataflow::bitvector::BitVector;
use crate::dataflow::ordinal::OrdinalMapping;
use crate::descriptor::qualified_field_name;
use crate::detectors::instance_lock_static_data::lock_safety::{GlobalObjectSet, LockSafety};
use crate::detectors::instance_lock_static_data::regions::{
    BlockKind, InstructionRef, RegionClassification, SynchronizedBlock, is_protected_by_any,
    synchronized_blocks,
};
use crate::error::AnalysisError;
use crate::ir::{FieldRef, InstructionKind, Procedure, ProcedureId, ValueNumber};
use crate::model::{ProgramModel, StaticField};

/// Per-procedure seeding result.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct ProcedureFacts {
    pub(crate) safe_blocks: Vec<SynchronizedBlock>,
    pub(crate) local: BitVector,
}

/// Ordinal registry plus one fact record per procedure, indexed by procedure id.
#[derive(Debug)]
pub(crate) struct SeedTable {
    pub(crate) ordinals: OrdinalMapping<InstructionRef>,
    pub(crate) facts: Vec<ProcedureFacts>,
}

/// The target of a field write, once resolved against the class hierarchy.
enum WriteTarget<'a> {
    Static {
        class: &'a str,
        name: &'a str,
        is_final: bool,
    },
    Instance { receiver: ValueNumber },
}

fn write_target<'a>(
    model: &'a ProgramModel,
    procedure: &Procedure,
    field: &FieldRef,
    receiver: Option<ValueNumber>,
) -> Result<WriteTarget<'a>, AnalysisError> {
    let resolved = model
        .resolve_field(field)
        .ok_or_else(|| AnalysisError::UnresolvedField {
            field: field.clone(),
            procedure: procedure.signature(),
        })?;
    if resolved.field.is_static {
        return Ok(WriteTarget::Static {
            class: resolved.declaring_class,
            name: &resolved.field.name,
            is_final: resolved.field.is_final,
        });
    }
    match receiver {
        Some(receiver) => Ok(WriteTarget::Instance { receiver }),
        None => Err(AnalysisError::MissingReceiver {
            field: field.clone(),
            procedure: procedure.signature(),
        }),
    }
}

/// Whether an instruction writes global state.
///
/// Non-final static writes qualify directly. Instance writes qualify when the
/// receiver may alias an object held by a static field. Invocations never
/// qualify here; their effect arrives through propagation.
pub(crate) fn is_unsafe_mutation(
    model: &ProgramModel,
    globals: &GlobalObjectSet,
    id: ProcedureId,
    procedure: &Procedure,
    kind: &InstructionKind,
) -> Result<bool, AnalysisError> {
    let InstructionKind::FieldWrite { field, receiver } = kind else {
        return Ok(false);
    };
    match write_target(model, procedure, field, *receiver)? {
        WriteTarget::Static {
            class, is_final, ..
        } => Ok(!is_final && !model.is_ignored_class(class)),
        WriteTarget::Instance { receiver } => {
            Ok(globals.intersects(model.points_to_local(id, receiver)))
        }
    }
}

/// Qualified names of the static fields an unsafe instruction writes or aliases.
pub(crate) fn modified_static_fields(
    model: &ProgramModel,
    static_fields: &[StaticField],
    instruction: InstructionRef,
) -> Result<BTreeSet<String>, AnalysisError> {
    let procedure = model
        .procedure(instruction.procedure)
        .ok_or(AnalysisError::UnknownProcedure(instruction.procedure))?;
    let mut names = BTreeSet::new();
    let Some(InstructionKind::FieldWrite { field, receiver }) = procedure
        .instructions()
        .get(instruction.index)
        .map(|instruction| &instruction.kind)
    else {
        return Ok(names);
    };
    match write_target(model, procedure, field, *receiver)? {
        WriteTarget::Static { class, name, .. } => {
            names.insert(qualified_field_name(class, name));
        }
        WriteTarget::Instance { receiver } => {
            let aliases = model.points_to_local(instruction.procedure, receiver);
            for candidate in static_fields {
                if !model.points_to_static(candidate).is_disjoint(aliases) {
                    names.insert(qualified_field_name(&candidate.class, &candidate.name));
                }
            }
        }
    }
    Ok(names)
}

/// Unsafe mutations of one procedure that no safe block protects.
pub(crate) fn local_unsafe_mutations(
    model: &ProgramModel,
    globals: &GlobalObjectSet,
    id: ProcedureId,
    procedure: &Procedure,
    safe_blocks: &[SynchronizedBlock],
) -> Result<Vec<InstructionRef>, AnalysisError> {
    let mut unsafe_instructions = Vec::new();
    for (index, instruction) in procedure.instructions().iter().enumerate() {
        let reference = InstructionRef {
            procedure: id,
            index,
        };
        if is_protected_by_any(safe_blocks, reference) {
            continue;
        }
        if is_unsafe_mutation(model, globals, id, procedure, &instruction.kind)? {
            unsafe_instructions.push(reference);
        }
    }
    Ok(unsafe_instructions)
}

/// Seed local bit vectors for every procedure outside the ignored set that
/// is not already guarded by a safe synchronized method.
pub(crate) fn seed(
    model: &ProgramModel,
    regions: &RegionClassification,
) -> Result<SeedTable, AnalysisError> {
    let mut ordinals = OrdinalMapping::new();
    let facts = seed_into(model, regions, &mut ordinals)?;
    Ok(SeedTable { ordinals, facts })
}

/// Seed against an existing ordinal registry; instructions already known keep
/// their ordinals.
pub(crate) fn seed_into(
    model: &ProgramModel,
    regions: &RegionClassification,
    ordinals: &mut OrdinalMapping<InstructionRef>,
) -> Result<Vec<ProcedureFacts>, AnalysisError> {
    let safety = regions.lock_safety(model);
    let mut facts = vec![ProcedureFacts::default(); model.procedure_count()];
    for (id, procedure) in model.procedures() {
        if !should_seed(model, &safety, id, procedure) {
            continue;
        }
        let safe_blocks = synchronized_blocks(&safety, id, procedure, BlockKind::Safe);
        let mut local = BitVector::new();
        for reference in
            local_unsafe_mutations(model, &regions.globals, id, procedure, &safe_blocks)?
        {
            local.set(ordinals.add(reference));
        }
        if !local.is_empty() {
            tracing::debug!(
                "{} seeds {} unsafe mutations",
                procedure.signature(),
                local.len()
            );
        }
        facts[id] = ProcedureFacts { safe_blocks, local };
    }
    Ok(facts)
}

fn should_seed(
    model: &ProgramModel,
    safety: &LockSafety<'_>,
    id: ProcedureId,
    procedure: &Procedure,
) -> bool {
    !model.is_ignored_procedure(procedure) && !safety.is_safe_synchronized(id, procedure)
}
