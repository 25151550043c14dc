use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::AnalysisError;

/// Cooperative stop signal checked by long-running solvers.
#[derive(Clone, Debug, Default)]
pub(crate) struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    step_limit: Option<usize>,
}

impl CancellationToken {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Token that trips once a solver has taken `limit` steps.
    pub(crate) fn with_step_limit(limit: usize) -> Self {
        Self {
            cancelled: Arc::default(),
            step_limit: Some(limit),
        }
    }

    #[allow(dead_code)]
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self, steps: usize) -> Result<(), AnalysisError> {
        let over_budget = self.step_limit.is_some_and(|limit| steps > limit);
        if over_budget || self.is_cancelled() {
            return Err(AnalysisError::Cancelled { steps });
        }
        Ok(())
    }
}
