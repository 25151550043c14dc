use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use opentelemetry::KeyValue;
use serde_json::json;
use serde_sarif::sarif::{
    MultiformatMessageString, PropertyBag, ReportingDescriptor, Result as SarifResult,
};

use crate::callgraph::{CallGraph, build_call_graph};
use crate::dataflow::cancel::CancellationToken;
use crate::detectors::{Detector, DetectorMetadata, all_detectors};
use crate::finding::Finding;
use crate::model::ProgramModel;
use crate::telemetry::{Telemetry, with_span};

/// Inputs shared by detectors.
pub(crate) struct AnalysisContext {
    model: ProgramModel,
    call_graph: CallGraph,
    cancellation: CancellationToken,
    telemetry: Option<Arc<Telemetry>>,
}

/// Timing breakdown for context construction.
pub(crate) struct ContextTimings {
    pub(crate) call_graph_duration_ms: u128,
    pub(crate) call_graph_edges: usize,
}

/// Analysis engine that executes registered detectors.
pub(crate) struct Engine {
    detectors: Vec<Box<dyn Detector + Sync>>,
}

impl Engine {
    pub(crate) fn new() -> Self {
        let mut detectors = all_detectors();
        detectors.sort_by(|a, b| a.metadata().id.cmp(b.metadata().id));
        Self { detectors }
    }

    pub(crate) fn analyze(&self, context: &AnalysisContext) -> Result<EngineOutput> {
        let mut rules = Vec::new();
        let mut findings = Vec::new();

        for detector in &self.detectors {
            let metadata = detector.metadata();
            rules.push(rule_descriptor(&metadata));
            let span_attributes = [KeyValue::new("lockscope.detector_id", metadata.id)];
            let detector_findings = context.with_span(
                &format!("detector:{}", metadata.id),
                &span_attributes,
                || detector.run(context),
            )?;
            findings.extend(detector_findings);
        }

        // Stable: findings of one detector keep their scan order.
        findings.sort_by(|left, right| left.pattern_id.cmp(right.pattern_id));
        let results = findings.iter().map(Finding::to_sarif).collect();

        Ok(EngineOutput {
            rules,
            results,
            findings,
        })
    }
}

/// Aggregated SARIF payload from detector execution.
pub(crate) struct EngineOutput {
    pub(crate) rules: Vec<ReportingDescriptor>,
    pub(crate) results: Vec<SarifResult>,
    pub(crate) findings: Vec<Finding>,
}

#[cfg(test)]
pub(crate) fn build_context(
    model: ProgramModel,
    cancellation: CancellationToken,
) -> AnalysisContext {
    let (context, _) = build_context_with_timings(model, cancellation, None);
    context
}

pub(crate) fn build_context_with_timings(
    model: ProgramModel,
    cancellation: CancellationToken,
    telemetry: Option<Arc<Telemetry>>,
) -> (AnalysisContext, ContextTimings) {
    let call_graph_started_at = Instant::now();
    let call_graph = with_span(
        telemetry.as_deref(),
        "call_graph",
        &[KeyValue::new("lockscope.phase", "call_graph")],
        || build_call_graph(&model),
    );
    let timings = ContextTimings {
        call_graph_duration_ms: call_graph_started_at.elapsed().as_millis(),
        call_graph_edges: call_graph.edges().len(),
    };
    tracing::info!(
        "call graph: {} procedures, {} edges",
        call_graph.node_count(),
        timings.call_graph_edges
    );
    let context = AnalysisContext {
        model,
        call_graph,
        cancellation,
        telemetry,
    };
    (context, timings)
}

fn rule_descriptor(metadata: &DetectorMetadata) -> ReportingDescriptor {
    let mut properties = BTreeMap::new();
    properties.insert("lockscope.hasFixer".to_string(), json!(metadata.has_fixer));
    ReportingDescriptor::builder()
        .id(metadata.id)
        .name(metadata.name)
        .short_description(
            MultiformatMessageString::builder()
                .text(metadata.description)
                .build(),
        )
        .properties(PropertyBag::builder().additional_properties(properties).build())
        .build()
}

impl AnalysisContext {
    pub(crate) fn model(&self) -> &ProgramModel {
        &self.model
    }

    pub(crate) fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub(crate) fn telemetry(&self) -> Option<&Telemetry> {
        self.telemetry.as_deref()
    }

    pub(crate) fn with_span<T, F>(&self, name: &str, attributes: &[KeyValue], f: F) -> T
    where
        F: FnOnce() -> T,
    {
        with_span(self.telemetry(), name, attributes, f)
    }
}
