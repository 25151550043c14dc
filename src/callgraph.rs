use std::collections::{BTreeMap, BTreeSet};

use crate::ir::ProcedureId;
use crate::model::ProgramModel;

/// Directed call edge between caller and callee nodes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct CallEdge {
    pub(crate) caller: ProcedureId,
    pub(crate) call_site: u32,
    pub(crate) callee: ProcedureId,
}

/// Call graph over the procedures of the program model.
#[derive(Clone, Debug, Default)]
pub(crate) struct CallGraph {
    node_count: usize,
    targets: BTreeMap<(ProcedureId, u32), Vec<ProcedureId>>,
    callees: Vec<Vec<ProcedureId>>,
}

impl CallGraph {
    pub(crate) fn node_count(&self) -> usize {
        self.node_count
    }

    /// Possible callees of one call site; empty when the site is unresolved.
    pub(crate) fn possible_targets(&self, caller: ProcedureId, call_site: u32) -> &[ProcedureId] {
        self.targets
            .get(&(caller, call_site))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Distinct callees of a node across all of its call sites.
    pub(crate) fn callees(&self, caller: ProcedureId) -> &[ProcedureId] {
        self.callees.get(caller).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn edges(&self) -> BTreeSet<CallEdge> {
        self.targets
            .iter()
            .flat_map(|(&(caller, call_site), callees)| {
                callees.iter().map(move |&callee| CallEdge {
                    caller,
                    call_site,
                    callee,
                })
            })
            .collect()
    }

    /// Adjacency from each callee to its distinct callers.
    pub(crate) fn invert(&self) -> Vec<Vec<ProcedureId>> {
        let mut callers = vec![BTreeSet::new(); self.node_count];
        for caller in 0..self.node_count {
            for &callee in self.callees(caller) {
                callers[callee].insert(caller);
            }
        }
        callers
            .into_iter()
            .map(|set| set.into_iter().collect())
            .collect()
    }
}

/// Build the call graph from the resolved call sites of every procedure.
pub(crate) fn build_call_graph(model: &ProgramModel) -> CallGraph {
    let node_count = model.procedure_count();
    let mut targets: BTreeMap<(ProcedureId, u32), Vec<ProcedureId>> = BTreeMap::new();
    let mut callees = vec![BTreeSet::new(); node_count];
    for (caller, procedure) in model.procedures() {
        for call in &procedure.calls {
            let entry = targets.entry((caller, call.call_site)).or_default();
            for &callee in &call.targets {
                if callee >= node_count {
                    continue;
                }
                entry.push(callee);
                callees[caller].insert(callee);
            }
        }
    }
    for list in targets.values_mut() {
        list.sort();
        list.dedup();
    }
    CallGraph {
        node_count,
        targets,
        callees: callees
            .into_iter()
            .map(|set| set.into_iter().collect())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::ProgramBuilder;

    #[test]
    fn call_graph_includes_virtual_targets() {
        let mut builder = ProgramBuilder::new();
        builder.class("p/Base");
        builder.class("p/Sub").extends("p/Base");
        let caller = builder.procedure("p/Caller", "caller").id();
        let base = builder.procedure("p/Base", "target").id();
        let sub = builder.procedure("p/Sub", "target").id();
        builder.class("p/Caller");
        builder.procedure_mut(caller).invoke(&[sub, base]);
        let model = builder.build();

        let graph = build_call_graph(&model);

        assert_eq!(graph.possible_targets(caller, 0), &[base, sub]);
        assert_eq!(graph.edges().len(), 2);
        assert!(graph.possible_targets(caller, 7).is_empty());
    }

    #[test]
    fn inverted_graph_maps_callees_to_callers() {
        let mut builder = ProgramBuilder::new();
        builder.class("p/A");
        let helper = builder.procedure("p/A", "helper").id();
        let first = builder.procedure("p/A", "first").invoke(&[helper]).id();
        let second = builder
            .procedure("p/A", "second")
            .invoke(&[helper])
            .invoke(&[helper])
            .id();
        let model = builder.build();

        let inverted = build_call_graph(&model).invert();

        assert_eq!(inverted[helper], vec![first, second]);
        assert!(inverted[first].is_empty());
    }
}
