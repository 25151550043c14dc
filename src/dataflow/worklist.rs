use std::collections::VecDeque;

use crate::dataflow::bitvector::BitVector;
use crate::dataflow::cancel::CancellationToken;
use crate::error::AnalysisError;

/// Monotone bit-vector problem over a directed flow graph.
///
/// `flows_into[m]` lists the nodes whose value absorbs the value of `m`. The
/// solved value of a node is its initial vector unioned with the solved values
/// of every node flowing into it.
pub(crate) struct BitVectorFramework {
    flows_into: Vec<Vec<usize>>,
    initial: Vec<BitVector>,
    domain_size: usize,
}

impl BitVectorFramework {
    pub(crate) fn new(
        flows_into: Vec<Vec<usize>>,
        initial: Vec<BitVector>,
        domain_size: usize,
    ) -> Self {
        debug_assert_eq!(flows_into.len(), initial.len());
        debug_assert!(initial.iter().all(|bits| bits.max_bit() <= domain_size));
        Self {
            flows_into,
            initial,
            domain_size,
        }
    }

    pub(crate) fn node_count(&self) -> usize {
        self.initial.len()
    }

    pub(crate) fn domain_size(&self) -> usize {
        self.domain_size
    }
}

/// Least fixpoint of a [`BitVectorFramework`].
#[derive(Clone, Debug)]
pub(crate) struct BitVectorSolution {
    values: Vec<BitVector>,
    steps: usize,
}

impl BitVectorSolution {
    pub(crate) fn out(&self, node: usize) -> Option<&BitVector> {
        self.values.get(node)
    }

    pub(crate) fn steps(&self) -> usize {
        self.steps
    }
}

/// Deterministic FIFO worklist solver.
///
/// Union is idempotent, commutative and associative, so the result does not
/// depend on visiting order and cycles converge. A tripped cancellation token
/// aborts the solve without a partial solution.
pub(crate) fn solve(
    framework: &BitVectorFramework,
    cancellation: &CancellationToken,
) -> Result<BitVectorSolution, AnalysisError> {
    let node_count = framework.node_count();
    let mut values = framework.initial.clone();
    let mut queue: VecDeque<usize> = (0..node_count).collect();
    let mut queued = vec![true; node_count];
    let mut steps = 0;

    while let Some(node) = queue.pop_front() {
        queued[node] = false;
        steps += 1;
        cancellation.check(steps)?;

        let source = values[node].clone();
        for &dependent in &framework.flows_into[node] {
            if dependent == node {
                continue;
            }
            if values[dependent].union_with(&source) && !queued[dependent] {
                queued[dependent] = true;
                queue.push_back(dependent);
            }
        }
    }

    debug_assert!(
        values
            .iter()
            .all(|bits| bits.max_bit() <= framework.domain_size())
    );
    Ok(BitVectorSolution { values, steps })
}
