use anyhow::Result;
use opentelemetry::KeyValue;

use crate::engine::AnalysisContext;
use crate::finding::Finding;

// Detector modules are auto-discovered by build.rs.
include!(concat!(env!("OUT_DIR"), "/detector_modules.rs"));

/// Metadata describing a bug pattern detector.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DetectorMetadata {
    pub(crate) id: &'static str,
    pub(crate) name: &'static str,
    pub(crate) description: &'static str,
    pub(crate) has_fixer: bool,
}

/// Object-safe detector interface used by the engine.
pub(crate) trait Detector {
    fn metadata(&self) -> DetectorMetadata;
    fn run(&self, context: &AnalysisContext) -> Result<Vec<Finding>>;
}

/// Everything one detector run produced, kept for diagnostics and tests.
#[derive(Debug)]
pub(crate) struct PatternRun<R, S> {
    #[allow(dead_code)]
    pub(crate) regions: R,
    /// `None` when classification found nothing worth propagating.
    pub(crate) solution: Option<S>,
    pub(crate) findings: Vec<Finding>,
}

/// A bug pattern split into whole-program phases.
///
/// `classify` labels regions once, `seed` collects per-procedure facts,
/// `propagate` solves them over the call graph and `report` turns the
/// solution into findings. Phases run in that order and never revisit an
/// earlier phase's result.
pub(crate) trait BugPattern {
    type Regions;
    type Seeds;
    type Solution;

    const METADATA: DetectorMetadata;

    fn classify(&self, context: &AnalysisContext) -> Result<Self::Regions>;

    /// Whether the classified regions can produce any finding at all.
    fn has_candidates(&self, regions: &Self::Regions) -> bool;

    fn seed(&self, context: &AnalysisContext, regions: &Self::Regions) -> Result<Self::Seeds>;

    fn propagate(&self, context: &AnalysisContext, seeds: Self::Seeds) -> Result<Self::Solution>;

    fn report(
        &self,
        context: &AnalysisContext,
        regions: &Self::Regions,
        solution: &Self::Solution,
    ) -> Result<Vec<Finding>>;

    fn run_phases(
        &self,
        context: &AnalysisContext,
    ) -> Result<PatternRun<Self::Regions, Self::Solution>> {
        let attributes = [KeyValue::new("lockscope.detector_id", Self::METADATA.id)];
        let regions = context.with_span("classify", &attributes, || self.classify(context))?;
        if !self.has_candidates(&regions) {
            tracing::info!("{}: no unsafe regions, skipping propagation", Self::METADATA.id);
            return Ok(PatternRun {
                regions,
                solution: None,
                findings: Vec::new(),
            });
        }
        let seeds = context.with_span("seed", &attributes, || self.seed(context, &regions))?;
        let solution =
            context.with_span("propagate", &attributes, || self.propagate(context, seeds))?;
        let findings = context.with_span("report", &attributes, || {
            self.report(context, &regions, &solution)
        })?;
        tracing::info!("{}: {} findings", Self::METADATA.id, findings.len());
        Ok(PatternRun {
            regions,
            solution: Some(solution),
            findings,
        })
    }
}

impl<P: BugPattern> Detector for P {
    fn metadata(&self) -> DetectorMetadata {
        P::METADATA
    }

    fn run(&self, context: &AnalysisContext) -> Result<Vec<Finding>> {
        let run = self.run_phases(context)?;
        tracing::debug!(
            "{}: propagation {}",
            P::METADATA.id,
            if run.solution.is_some() { "ran" } else { "skipped" }
        );
        Ok(run.findings)
    }
}

/// Wrapper struct for detector factory functions to enable inventory collection.
pub(crate) struct DetectorFactory(pub fn() -> Box<dyn Detector + Sync>);

inventory::collect!(DetectorFactory);

/// Register a detector implementation.
///
/// Usage: `register_detector!(DetectorName);`
#[macro_export]
macro_rules! register_detector {
    ($detector_type:ty) => {
        inventory::submit! {
            $crate::detectors::DetectorFactory(|| Box::new(<$detector_type>::default()))
        }
    };
}

/// Returns all registered detectors as boxed trait objects.
pub(crate) fn all_detectors() -> Vec<Box<dyn Detector + Sync>> {
    inventory::iter::<DetectorFactory>
        .into_iter()
        .map(|factory| (factory.0)())
        .collect()
}
