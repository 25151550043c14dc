use crate::detectors::instance_lock_static_data::lock_safety::{GlobalObjectSet, LockSafety};
use crate::ir::{Instruction, InstructionKind, Procedure, ProcedureId};
use crate::model::{ProgramModel, StaticField};

/// Addressable instruction: (procedure, index in its instruction sequence).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub(crate) struct InstructionRef {
    pub(crate) procedure: ProcedureId,
    pub(crate) index: usize,
}

/// Safety label of a synchronized region.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum BlockKind {
    Safe,
    Unsafe,
}

/// Synchronized block: its monitor-enter plus the index of the matching exit.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct SynchronizedBlock {
    pub(crate) enter: InstructionRef,
    pub(crate) end: usize,
}

impl SynchronizedBlock {
    pub(crate) fn procedure(&self) -> ProcedureId {
        self.enter.procedure
    }

    /// Same procedure and an index between the monitor-enter and its exit.
    pub(crate) fn contains(&self, instruction: InstructionRef) -> bool {
        instruction.procedure == self.enter.procedure
            && instruction.index >= self.enter.index
            && instruction.index <= self.end
    }
}

pub(crate) fn is_protected_by_any(
    blocks: &[SynchronizedBlock],
    instruction: InstructionRef,
) -> bool {
    blocks.iter().any(|block| block.contains(instruction))
}

/// Index of the monitor-exit closing the monitor-enter at `enter`.
///
/// Nesting is balanced structurally; an unclosed block runs to the last instruction.
pub(crate) fn matching_exit(instructions: &[Instruction], enter: usize) -> usize {
    let mut depth = 0usize;
    for (index, instruction) in instructions.iter().enumerate().skip(enter) {
        match instruction.kind {
            InstructionKind::MonitorEnter { .. } => depth += 1,
            InstructionKind::MonitorExit { .. } => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return index;
                }
            }
            _ => {}
        }
    }
    instructions.len().saturating_sub(1)
}

/// Synchronized blocks of one procedure carrying the requested label.
pub(crate) fn synchronized_blocks(
    safety: &LockSafety<'_>,
    id: ProcedureId,
    procedure: &Procedure,
    kind: BlockKind,
) -> Vec<SynchronizedBlock> {
    let instructions = procedure.instructions();
    let mut blocks = Vec::new();
    for (index, instruction) in instructions.iter().enumerate() {
        let InstructionKind::MonitorEnter { lock } = instruction.kind else {
            continue;
        };
        let label = if safety.is_safe_lock(id, lock) {
            BlockKind::Safe
        } else {
            BlockKind::Unsafe
        };
        if label == kind {
            blocks.push(SynchronizedBlock {
                enter: InstructionRef {
                    procedure: id,
                    index,
                },
                end: matching_exit(instructions, index),
            });
        }
    }
    blocks
}

/// Whole-program region classification, computed once before propagation.
#[derive(Debug)]
pub(crate) struct RegionClassification {
    pub(crate) static_fields: Vec<StaticField>,
    pub(crate) globals: GlobalObjectSet,
    pub(crate) unsafe_blocks: Vec<SynchronizedBlock>,
    pub(crate) unsafe_methods: Vec<ProcedureId>,
}

impl RegionClassification {
    pub(crate) fn lock_safety<'a>(&'a self, model: &'a ProgramModel) -> LockSafety<'a> {
        LockSafety::new(model, &self.globals)
    }

    pub(crate) fn has_unsafe_regions(&self) -> bool {
        !self.unsafe_blocks.is_empty() || !self.unsafe_methods.is_empty()
    }
}

/// Collect unsafe synchronized blocks and methods in scan order.
///
/// A safe block nested inside an unsafe one is still labelled on its own; the
/// outer block keeps its unsafe label.
pub(crate) fn discover(model: &ProgramModel) -> RegionClassification {
    let static_fields = model.static_fields();
    let globals = GlobalObjectSet::collect(model, &static_fields);
    let mut unsafe_blocks = Vec::new();
    let mut unsafe_methods = Vec::new();
    {
        let safety = LockSafety::new(model, &globals);
        for (id, procedure) in model.procedures() {
            if model.is_ignored_procedure(procedure) {
                continue;
            }
            unsafe_blocks.extend(synchronized_blocks(
                &safety,
                id,
                procedure,
                BlockKind::Unsafe,
            ));
            if safety.is_unsafe_synchronized(id, procedure) {
                unsafe_methods.push(id);
            }
        }
    }
    tracing::debug!(
        "classified {} unsafe blocks and {} unsafe methods over {} static fields",
        unsafe_blocks.len(),
        unsafe_methods.len(),
        static_fields.len()
    );
    RegionClassification {
        static_fields,
        globals,
        unsafe_blocks,
        unsafe_methods,
    }
}
