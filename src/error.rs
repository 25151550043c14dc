use thiserror::Error;

use crate::ir::{FieldRef, ProcedureId};

/// Fatal conditions that abort an analysis run without findings.
#[derive(Debug, Error)]
pub(crate) enum AnalysisError {
    #[error("bit-vector solver was stopped after {steps} steps")]
    Cancelled { steps: usize },

    #[error("cannot resolve field {field} written in {procedure}")]
    UnresolvedField { field: FieldRef, procedure: String },

    #[error("instance field {field} written in {procedure} has no receiver")]
    MissingReceiver { field: FieldRef, procedure: String },

    #[error("unknown procedure id {0}")]
    UnknownProcedure(ProcedureId),
}
