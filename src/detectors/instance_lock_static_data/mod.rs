mod lock_safety;
mod mutation;
mod propagation;
mod regions;
mod report;

use anyhow::Result;

use crate::detectors::{BugPattern, DetectorMetadata};
use crate::engine::AnalysisContext;
use crate::finding::Finding;

use self::mutation::SeedTable;
use self::propagation::Propagation;
use self::regions::RegionClassification;
use self::report::Reporter;

/// Detects synchronized regions whose instance lock guards writes to static state.
///
/// A lock is only trusted when everything it may point to is reachable from a
/// static field. Any other lock, including one with no alias information, is
/// treated as instance-local, and the region is reported when it can mutate a
/// non-final static field directly or through a call.
#[derive(Default)]
pub(crate) struct InstanceLockStaticDataDetector;

crate::register_detector!(InstanceLockStaticDataDetector);

impl BugPattern for InstanceLockStaticDataDetector {
    type Regions = RegionClassification;
    type Seeds = SeedTable;
    type Solution = Propagation;

    const METADATA: DetectorMetadata = DetectorMetadata {
        id: "LCK06J",
        name: "Do not use an instance lock to protect shared static data",
        description: "Synchronized regions locking on instance-local objects while writing static fields",
        has_fixer: false,
    };

    fn classify(&self, context: &AnalysisContext) -> Result<RegionClassification> {
        let regions = regions::discover(context.model());
        tracing::info!(
            "{} static fields, {} global objects, {} unsafe blocks, {} unsafe methods",
            regions.static_fields.len(),
            regions.globals.len(),
            regions.unsafe_blocks.len(),
            regions.unsafe_methods.len()
        );
        Ok(regions)
    }

    fn has_candidates(&self, regions: &RegionClassification) -> bool {
        regions.has_unsafe_regions()
    }

    fn seed(
        &self,
        context: &AnalysisContext,
        regions: &RegionClassification,
    ) -> Result<SeedTable> {
        Ok(mutation::seed(context.model(), regions)?)
    }

    fn propagate(&self, context: &AnalysisContext, seeds: SeedTable) -> Result<Propagation> {
        Ok(propagation::propagate(
            context.call_graph(),
            seeds,
            context.cancellation(),
        )?)
    }

    fn report(
        &self,
        context: &AnalysisContext,
        regions: &RegionClassification,
        solution: &Propagation,
    ) -> Result<Vec<Finding>> {
        let reporter = Reporter {
            pattern_id: Self::METADATA.id,
            model: context.model(),
            call_graph: context.call_graph(),
            regions,
            propagation: solution,
        };
        Ok(reporter.report()?)
    }
}
