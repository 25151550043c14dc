use std::collections::BTreeSet;

use crate::callgraph::CallGraph;
use crate::detectors::instance_lock_static_data::mutation::modified_static_fields;
use crate::detectors::instance_lock_static_data::propagation::Propagation;
use crate::detectors::instance_lock_static_data::regions::{
    InstructionRef, RegionClassification, SynchronizedBlock, is_protected_by_any,
};
use crate::error::AnalysisError;
use crate::finding::{CodePosition, Finding, FixInformation, RegionKind};
use crate::ir::InstructionKind;
use crate::model::ProgramModel;

/// Inputs shared by block and method reporting.
pub(crate) struct Reporter<'a> {
    pub(crate) pattern_id: &'static str,
    pub(crate) model: &'a ProgramModel,
    pub(crate) call_graph: &'a CallGraph,
    pub(crate) regions: &'a RegionClassification,
    pub(crate) propagation: &'a Propagation,
}

impl Reporter<'_> {
    /// Findings for unsafe blocks in scan order, then unsafe methods.
    pub(crate) fn report(&self) -> Result<Vec<Finding>, AnalysisError> {
        let safety = self.regions.lock_safety(self.model);
        let mut findings = Vec::new();
        for block in &self.regions.unsafe_blocks {
            let id = block.procedure();
            let procedure = self
                .model
                .procedure(id)
                .ok_or(AnalysisError::UnknownProcedure(id))?;
            // Method-level guard covers every block inside it.
            if safety.is_safe_synchronized(id, procedure) {
                continue;
            }
            let unsafe_instructions = self.block_unsafe_instructions(block);
            if unsafe_instructions.is_empty() {
                continue;
            }
            let position = self
                .model
                .instruction_position(id, block.enter.index)
                .ok_or(AnalysisError::UnknownProcedure(id))?;
            findings.push(self.finding(
                RegionKind::SynchronizedBlock,
                position,
                &unsafe_instructions,
            )?);
        }
        for &id in &self.regions.unsafe_methods {
            let position = self
                .model
                .procedure_position(id)
                .ok_or(AnalysisError::UnknownProcedure(id))?;
            let unsafe_instructions = self.propagation.propagated(id);
            if unsafe_instructions.is_empty() {
                continue;
            }
            findings.push(self.finding(
                RegionKind::SynchronizedMethod,
                position,
                &unsafe_instructions,
            )?);
        }
        Ok(findings)
    }

    /// Local unsafe writes inside the block plus everything its unprotected
    /// call sites can reach.
    pub(crate) fn block_unsafe_instructions(
        &self,
        block: &SynchronizedBlock,
    ) -> BTreeSet<InstructionRef> {
        let id = block.procedure();
        let mut unsafe_instructions: BTreeSet<InstructionRef> = self
            .propagation
            .local(id)
            .into_iter()
            .filter(|instruction| block.contains(*instruction))
            .collect();
        let Some(procedure) = self.model.procedure(id) else {
            return unsafe_instructions;
        };
        let safe_blocks = self
            .propagation
            .facts(id)
            .map(|facts| facts.safe_blocks.as_slice())
            .unwrap_or(&[]);
        let span = block.end.saturating_sub(block.enter.index) + 1;
        for (index, instruction) in procedure
            .instructions()
            .iter()
            .enumerate()
            .skip(block.enter.index)
            .take(span)
        {
            let InstructionKind::Invoke { call_site } = instruction.kind else {
                continue;
            };
            if is_protected_by_any(safe_blocks, InstructionRef { procedure: id, index }) {
                continue;
            }
            for &target in self.call_graph.possible_targets(id, call_site) {
                unsafe_instructions.extend(self.propagation.propagated(target));
            }
        }
        unsafe_instructions
    }

    fn finding(
        &self,
        region: RegionKind,
        position: CodePosition,
        unsafe_instructions: &BTreeSet<InstructionRef>,
    ) -> Result<Finding, AnalysisError> {
        let mut static_fields = BTreeSet::new();
        for &instruction in unsafe_instructions {
            static_fields.extend(modified_static_fields(
                self.model,
                &self.regions.static_fields,
                instruction,
            )?);
        }
        tracing::debug!(
            "{} {:?} touches {:?}",
            position.method_label(),
            region,
            static_fields
        );
        Ok(Finding {
            pattern_id: self.pattern_id,
            region,
            position,
            fix: FixInformation { static_fields },
        })
    }
}
