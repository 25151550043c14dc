mod callgraph;
mod dataflow;
mod descriptor;
mod detectors;
mod engine;
mod error;
mod finding;
mod ir;
mod model;
mod telemetry;
#[cfg(test)]
mod test_harness;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use opentelemetry::KeyValue;
use serde_json::json;
use serde_sarif::sarif::{
    Invocation, PropertyBag, ReportingDescriptor, Result as SarifResult, Run, SCHEMA_URL, Sarif,
    Tool, ToolComponent,
};

use crate::dataflow::cancel::CancellationToken;
use crate::engine::{Engine, build_context_with_timings};
use crate::model::ProgramModel;
use crate::telemetry::{Telemetry, init_logging, with_span};

/// CLI arguments for lockscope execution.
#[derive(Parser, Debug)]
#[command(
    name = "lockscope",
    about = "Whole-program detector for instance locks guarding static data, with SARIF output.",
    version
)]
struct Cli {
    /// Program model JSON written by the analysis front end.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// SARIF destination; `-` or omitted writes to stdout.
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// OTLP/HTTP collector endpoint for phase spans.
    #[arg(long, value_name = "URL", env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otel: Option<String>,
    /// Abort propagation after this many solver steps.
    #[arg(long, value_name = "STEPS")]
    solver_step_limit: Option<usize>,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet);
    let telemetry = match cli.otel.as_deref() {
        Some(endpoint) => Some(Arc::new(Telemetry::new(endpoint)?)),
        None => None,
    };
    let result = with_span(telemetry.as_deref(), "lockscope", &[], || {
        run(&cli, telemetry.clone())
    });
    if let Some(telemetry) = telemetry {
        telemetry.shutdown()?;
    }
    result
}

fn run(cli: &Cli, telemetry: Option<Arc<Telemetry>>) -> Result<()> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }

    let started_at = Instant::now();
    let load_started_at = Instant::now();
    let model = with_span(
        telemetry.as_deref(),
        "load_model",
        &[KeyValue::new("lockscope.phase", "load_model")],
        || ProgramModel::load(&cli.input),
    )?;
    let load_duration_ms = load_started_at.elapsed().as_millis();
    let class_count = model.class_count();
    let procedure_count = model.procedure_count();
    tracing::info!(
        "loaded {} classes and {} procedures from {}",
        class_count,
        procedure_count,
        cli.input.display()
    );

    let cancellation = match cli.solver_step_limit {
        Some(limit) => CancellationToken::with_step_limit(limit),
        None => CancellationToken::new(),
    };
    let (context, context_timings) = build_context_with_timings(model, cancellation, telemetry);
    let analysis_started_at = Instant::now();
    let output = Engine::new().analyze(&context)?;
    let analysis_duration_ms = analysis_started_at.elapsed().as_millis();

    let invocation_stats = InvocationStats {
        load_duration_ms,
        call_graph_duration_ms: context_timings.call_graph_duration_ms,
        analysis_duration_ms,
        class_count,
        procedure_count,
        call_edge_count: context_timings.call_graph_edges,
        finding_count: output.findings.len(),
    };
    let invocation = build_invocation(&invocation_stats);
    let sarif = build_sarif(invocation, output.rules, output.results);

    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &sarif)
        .context("failed to serialize SARIF output")?;
    writer
        .write_all(b"\n")
        .context("failed to write SARIF output")?;

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} load_ms={} call_graph_ms={} analysis_ms={} procedures={} findings={}",
            started_at.elapsed().as_millis(),
            load_duration_ms,
            context_timings.call_graph_duration_ms,
            analysis_duration_ms,
            procedure_count,
            output.findings.len()
        );
    }

    Ok(())
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

/// Metadata captured for SARIF invocation properties.
struct InvocationStats {
    load_duration_ms: u128,
    call_graph_duration_ms: u128,
    analysis_duration_ms: u128,
    class_count: usize,
    procedure_count: usize,
    call_edge_count: usize,
    finding_count: usize,
}

fn build_invocation(stats: &InvocationStats) -> Invocation {
    let arguments: Vec<String> = std::env::args().collect();
    let command_line = arguments.join(" ");
    let mut properties = BTreeMap::new();
    properties.insert("lockscope.load_ms".to_string(), json!(stats.load_duration_ms));
    properties.insert(
        "lockscope.call_graph_ms".to_string(),
        json!(stats.call_graph_duration_ms),
    );
    properties.insert(
        "lockscope.analysis_ms".to_string(),
        json!(stats.analysis_duration_ms),
    );
    properties.insert("lockscope.class_count".to_string(), json!(stats.class_count));
    properties.insert(
        "lockscope.procedure_count".to_string(),
        json!(stats.procedure_count),
    );
    properties.insert(
        "lockscope.call_edge_count".to_string(),
        json!(stats.call_edge_count),
    );
    properties.insert(
        "lockscope.finding_count".to_string(),
        json!(stats.finding_count),
    );

    Invocation::builder()
        .execution_successful(true)
        .arguments(arguments)
        .command_line(command_line)
        .properties(PropertyBag::builder().additional_properties(properties).build())
        .build()
}

fn build_sarif(
    invocation: Invocation,
    rules: Vec<ReportingDescriptor>,
    results: Vec<SarifResult>,
) -> Sarif {
    let driver = if rules.is_empty() {
        ToolComponent::builder().name("lockscope").build()
    } else {
        ToolComponent::builder().name("lockscope").rules(rules).build()
    };
    let tool = Tool {
        driver,
        extensions: None,
        properties: None,
    };
    let run = Run::builder()
        .tool(tool)
        .invocations(vec![invocation])
        .results(results)
        .build();

    Sarif::builder()
        .schema(SCHEMA_URL)
        .runs(vec![run])
        .version(json!("2.1.0"))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::ProgramBuilder;

    fn stats() -> InvocationStats {
        InvocationStats {
            load_duration_ms: 0,
            call_graph_duration_ms: 0,
            analysis_duration_ms: 0,
            class_count: 0,
            procedure_count: 0,
            call_edge_count: 0,
            finding_count: 0,
        }
    }

    #[test]
    fn sarif_is_minimal_and_valid_shape() {
        let sarif = build_sarif(build_invocation(&stats()), Vec::new(), Vec::new());
        let value = serde_json::to_value(&sarif).expect("serialize SARIF");

        assert_eq!(value["version"], "2.1.0");
        assert_eq!(value["$schema"], SCHEMA_URL);
        assert_eq!(value["runs"][0]["tool"]["driver"]["name"], "lockscope");
        assert!(
            value["runs"][0]["results"]
                .as_array()
                .expect("results array")
                .is_empty()
        );
        assert_eq!(
            value["runs"][0]["invocations"][0]["executionSuccessful"],
            true
        );
        assert_eq!(
            value["runs"][0]["invocations"][0]["properties"]["lockscope.finding_count"],
            0
        );
    }

    #[test]
    fn sarif_carries_findings_with_fix_information() {
        let mut builder = ProgramBuilder::new();
        builder
            .class("p/Outer$1")
            .source_file("p/Outer.java")
            .static_field("count");
        builder
            .procedure("p/Outer$1", "run")
            .descriptor("(I)V")
            .line(12)
            .monitor_enter(1)
            .field_write_static("p/Outer$1", "count")
            .monitor_exit(1);
        let output = Engine::new()
            .analyze(&builder.context())
            .expect("analyze");

        let sarif = build_sarif(build_invocation(&stats()), output.rules, output.results);
        let value = serde_json::to_value(&sarif).expect("serialize SARIF");
        let result = &value["runs"][0]["results"][0];

        assert_eq!(result["ruleId"], "LCK06J");
        assert_eq!(
            result["properties"]["lockscope.staticFields"],
            json!(["p.Outer.1.count"])
        );
        assert_eq!(result["properties"]["lockscope.enclosingClass"], "p.Outer");
        assert_eq!(
            result["locations"][0]["logicalLocations"][0]["name"],
            "p/Outer$1.run(I)V"
        );
        assert_eq!(
            result["locations"][0]["physicalLocation"]["region"]["startLine"],
            12
        );
        assert_eq!(
            value["runs"][0]["tool"]["driver"]["rules"][0]["id"],
            "LCK06J"
        );
    }
}
