//! flowlens CLI - behavior-centric static analysis.
//!
//! Usage:
//!   flowlens analyze                  # Summary of the project
//!   flowlens entries                  # Entry points and their triggers
//!   flowlens hotspots --limit 5       # Most connected declarations
//!   flowlens impact <target>          # Who is affected by a change
//!   flowlens errors [target]          # Error handling and propagation
//!   flowlens dataflow <file> <name>   # Where a value comes from and goes
//!   flowlens journey [entry]          # Step-by-step behavior
//!   flowlens features <identifier>    # Feature names for a path or name
//!   flowlens graph --json             # Full call graph
//!   flowlens cycles                   # Call cycles

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use flowlens::cli::{collect_sources, load_config, Cli, Commands};
use flowlens::impact::{merge_features, Identifier};
use flowlens::journey::SequenceFlow;
use flowlens::parser::normalize_path;
use flowlens::progress::TracingProgress;
use flowlens::{
    DataFlowQuery, DataFlowTrace, ErrorProfile, ErrorPropagation, ErrorRisk, ImpactReport,
    Pipeline, PipelineOutput,
};

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let root = cli.root.canonicalize().unwrap_or(cli.root);
    let config = load_config(&root, cli.config.as_deref())
        .with_context(|| format!("loading config for {}", root.display()))?;
    let pipeline = Pipeline::new(config)?.with_progress(Arc::new(TracingProgress));

    if let Commands::Features { identifier } = &cli.command {
        let source = pipeline.features();
        let features = merge_features([
            source.features_for(Identifier::Path(identifier)),
            source.features_for(Identifier::Name(identifier)),
        ]);
        if cli.json {
            return print_json(&features);
        }
        if features.is_empty() {
            println!("No features for '{identifier}'");
        }
        for feature in &features {
            println!("{:<16} via {}", feature.name, feature.matched_via.join(", "));
        }
        return Ok(());
    }

    let files = collect_sources(&root)?;
    if files.is_empty() {
        eprintln!("No JavaScript or TypeScript files under {}", root.display());
    }
    let output = pipeline.run(&files);

    match cli.command {
        Commands::Analyze => {
            let summary = output.summary();
            if cli.json {
                return print_json(&summary);
            }
            println!("flowlens - {}", root.display());
            println!("══════════════════════════");
            println!(
                "Files:        {} ({} skipped)",
                summary.files_analyzed, summary.files_skipped
            );
            println!("Declarations: {}", summary.graph.declarations);
            println!(
                "Edges:        {} calls, {} api",
                summary.graph.call_edges, summary.graph.api_edges
            );
            println!(
                "External:     {} http, {} database, {} unresolved",
                summary.graph.http_calls,
                summary.graph.database_calls,
                summary.graph.unresolved_calls
            );
            println!("Entry points: {}", summary.graph.entry_points);
            println!(
                "Journeys:     {} ({} truncated)",
                summary.journeys, summary.truncated_journeys
            );
            if summary.files_truncated > 0 {
                println!(
                    "Truncated:    {} files nested too deep, partly analyzed",
                    summary.files_truncated
                );
            }
            for skipped in &output.skipped {
                println!("  skipped {}: {}", skipped.path, skipped.reason);
            }
        }

        Commands::Entries => {
            if cli.json {
                let entries: Vec<_> = output
                    .journeys
                    .iter()
                    .map(|j| json!({ "entry_id": j.entry_id, "trigger": j.trigger }))
                    .collect();
                return print_json(&entries);
            }
            for flow in &output.journeys {
                let kind = flow.trigger.kind.to_string();
                println!("{:<48} {kind:<8} {}", flow.entry_id, flow.trigger.label);
            }
        }

        Commands::Graph => {
            if cli.json {
                return print_json(&output.graph.snapshot());
            }
            print_graph(&output);
        }

        Commands::Cycles => {
            let cycles = output.graph.cycles();
            if cli.json {
                return print_json(&cycles);
            }
            if cycles.is_empty() {
                println!("No cycles");
            }
            for cycle in &cycles {
                println!("{}", cycle.join(" -> "));
            }
        }

        Commands::Hotspots { limit } => {
            let top: Vec<_> = output.hotspots.iter().take(limit).collect();
            if cli.json {
                return print_json(&top);
            }
            for h in top {
                println!(
                    "{:>6.1}  in {:<3} out {:<3} {}",
                    h.score, h.fan_in, h.fan_out, h.id
                );
            }
        }

        Commands::Impact { target } => {
            let report = pipeline.impact(&output.graph, &target)?;
            if cli.json {
                return print_json(&report);
            }
            print_impact(&report);
        }

        Commands::Errors { target: Some(target) } => {
            let trace = pipeline.error_propagation(&output.graph, &target)?;
            if cli.json {
                return print_json(&trace);
            }
            print_propagation(&trace);
        }

        Commands::Errors { target: None } => {
            let profiles = pipeline.error_profiles(&output.graph);
            let escaping: Vec<&ErrorProfile> = profiles.iter().filter(|p| p.escapes()).collect();
            if cli.json {
                return print_json(&escaping);
            }
            print_error_profiles(&escaping);
        }

        Commands::Dataflow {
            file,
            identifier,
            line,
            direction,
        } => {
            let path = normalize_path(&file);
            let source = files
                .iter()
                .find(|f| f.path == path)
                .with_context(|| format!("{path} is not an analyzed source file"))?;
            let mut query = DataFlowQuery::new(identifier).direction(direction);
            query.line = line;
            let trace = pipeline.data_flow(&output.graph, source, &query)?;
            if cli.json {
                return print_json(&trace);
            }
            print_data_flow(&trace);
        }

        Commands::Journey { entry } => {
            let flows = match entry {
                Some(entry) => vec![pipeline.journey(&output.graph, &entry)?],
                None => output.journeys,
            };
            if cli.json {
                return print_json(&flows);
            }
            for flow in &flows {
                print_journey(flow);
            }
        }

        Commands::Features { .. } => {}
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_graph(output: &PipelineOutput) {
    let graph = &output.graph;
    for decl in graph.declarations() {
        let marker = if graph.is_entry_point(&decl.id) { "*" } else { " " };
        println!("{marker} {}", decl.id);
        for callee in graph.callees(&decl.id) {
            println!("    -> {}", callee.id);
        }
        for edge in graph.external_edges_from(&decl.id) {
            if edge.matched_handler.is_none() {
                println!("    => {}", edge.step_id());
            }
        }
    }
}

fn print_impact(report: &ImpactReport) {
    println!("Impact of {} ({})", report.target_name, report.target_id);
    println!();
    if report.affected.is_empty() {
        println!("Nothing calls this declaration.");
    }
    for node in &report.affected {
        let risk = node.risk.to_string();
        println!(
            "  [{risk:<6}] d={} in={:<3} {}",
            node.distance, node.fan_in, node.id
        );
    }
    if !report.affected_entry_points.is_empty() {
        println!();
        println!("Entry points:");
        for id in &report.affected_entry_points {
            println!("  {id}");
        }
    }
    println!();
    println!("{}", report.feature_summary());
    if report.truncated {
        println!("(truncated: traversal limit reached)");
    }
}

fn print_journey(flow: &SequenceFlow) {
    println!("{} [{}]", flow.title, flow.trigger.label);
    for step in &flow.steps {
        let indent = "  ".repeat(step.depth + 1);
        let mut line = format!("{indent}{}. {}", step.order, step.label);
        if step.is_external_call {
            line.push_str(" (external)");
        }
        if step.awaited {
            line.push_str(" (await)");
        }
        if step.conditional {
            line.push_str(" (if)");
        }
        if step.looped {
            line.push_str(" (loops back)");
        }
        println!("{line}");
    }
    if flow.truncated {
        println!("  (truncated: traversal limit reached)");
    }
    println!();
}

fn print_error_profiles(profiles: &[&ErrorProfile]) {
    if profiles.is_empty() {
        println!("No unhandled errors");
        return;
    }
    for profile in profiles {
        let risk = profile.risk.to_string();
        println!("[{risk:<7}] {}", profile.id);
        if !profile.raises.is_empty() {
            println!("    raises:   {}", profile.raises.join(", "));
        }
        if !profile.receives_from.is_empty() {
            println!("    receives: {}", profile.receives_from.join(", "));
        }
        if let Some(reason) = &profile.reason {
            println!("    {reason}");
        }
    }
    let danger = profiles.iter().filter(|p| p.risk == ErrorRisk::Danger).count();
    println!();
    println!("{} declarations let errors escape, {danger} at entry points", profiles.len());
}

fn print_propagation(trace: &ErrorPropagation) {
    println!("Errors from {}", trace.origin_id);
    if trace.reached.is_empty() {
        println!("  no caller receives them unhandled");
    }
    for hop in &trace.reached {
        println!("  d={} {}", hop.distance, hop.id);
    }
    if !trace.handled_by.is_empty() {
        println!("Caught by:");
        for id in &trace.handled_by {
            println!("  {id}");
        }
    }
    if !trace.entry_points.is_empty() {
        println!("Reach entry points:");
        for id in &trace.entry_points {
            println!("  {id}");
        }
    }
    if trace.truncated {
        println!("(truncated: traversal limit reached)");
    }
}

fn print_data_flow(trace: &DataFlowTrace) {
    println!("{} in {}", trace.identifier, trace.file);
    for source in &trace.sources {
        println!("  <- {:<4} {:<16} {}", source.line, source.kind.to_string(), source.detail);
        for id in &source.linked_ids {
            println!("         via {id}");
        }
    }
    for dest in &trace.destinations {
        println!("  -> {:<4} {:<16} {}", dest.line, dest.kind.to_string(), dest.detail);
        if let Some(callee) = &dest.callee_id {
            println!("         into {callee}");
        }
    }
    println!();
    println!("{}", trace.summary());
    if trace.truncated {
        println!("(truncated: finding limit reached)");
    }
}
