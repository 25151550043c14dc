use std::collections::BTreeSet;

use crate::callgraph::CallGraph;
use crate::dataflow::bitvector::BitVector;
use crate::dataflow::cancel::CancellationToken;
use crate::dataflow::ordinal::FrozenOrdinals;
use crate::dataflow::worklist::{BitVectorFramework, BitVectorSolution, solve};
use crate::detectors::instance_lock_static_data::mutation::{ProcedureFacts, SeedTable};
use crate::detectors::instance_lock_static_data::regions::InstructionRef;
use crate::error::AnalysisError;
use crate::ir::ProcedureId;

/// Solved "reachable unsafe mutations" per procedure.
#[derive(Debug)]
pub(crate) struct Propagation {
    ordinals: FrozenOrdinals<InstructionRef>,
    facts: Vec<ProcedureFacts>,
    solution: BitVectorSolution,
}

impl Propagation {
    pub(crate) fn facts(&self, id: ProcedureId) -> Option<&ProcedureFacts> {
        self.facts.get(id)
    }

    pub(crate) fn domain_size(&self) -> usize {
        self.ordinals.domain_size()
    }

    pub(crate) fn steps(&self) -> usize {
        self.solution.steps()
    }

    /// Local unsafe mutations of a procedure, outside its safe blocks.
    pub(crate) fn local(&self, id: ProcedureId) -> BTreeSet<InstructionRef> {
        self.facts
            .get(id)
            .map(|facts| self.instructions_of(&facts.local))
            .unwrap_or_default()
    }

    /// Every unsafe mutation a procedure may perform, directly or via callees.
    pub(crate) fn propagated(&self, id: ProcedureId) -> BTreeSet<InstructionRef> {
        self.solution
            .out(id)
            .map(|bits| self.instructions_of(bits))
            .unwrap_or_default()
    }

    fn instructions_of(&self, bits: &BitVector) -> BTreeSet<InstructionRef> {
        bits.iter()
            .filter_map(|ordinal| self.ordinals.mapped_object(ordinal).copied())
            .collect()
    }
}

/// Propagate seeded facts from callees to callers until nothing changes.
pub(crate) fn propagate(
    call_graph: &CallGraph,
    seeds: SeedTable,
    cancellation: &CancellationToken,
) -> Result<Propagation, AnalysisError> {
    let ordinals = seeds.ordinals.freeze();
    let initial: Vec<BitVector> = seeds.facts.iter().map(|facts| facts.local.clone()).collect();
    let framework = BitVectorFramework::new(call_graph.invert(), initial, ordinals.domain_size());
    let solution = solve(&framework, cancellation)?;
    let propagation = Propagation {
        ordinals,
        facts: seeds.facts,
        solution,
    };
    if tracing::enabled!(tracing::Level::DEBUG) {
        for id in 0..framework.node_count() {
            let reached = propagation.propagated(id);
            if !reached.is_empty() {
                tracing::debug!("procedure {id} reaches unsafe mutations {reached:?}");
            }
        }
    }
    tracing::info!(
        "propagated {} unsafe mutations over {} procedures in {} steps",
        propagation.domain_size(),
        framework.node_count(),
        propagation.steps()
    );
    Ok(propagation)
}
