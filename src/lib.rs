//! # flowlens
//!
//! Behavior-centric static analysis for TypeScript and JavaScript codebases.
//!
//! flowlens parses source files with tree-sitter, builds a cross-file call
//! graph, and answers questions about behavior rather than structure: which
//! functions users trigger, what a change breaks, which features it touches,
//! and what happens step by step when someone clicks a button.
//!
//! ## Key Features
//!
//! - **Two-pass graph**: symbols from every file are registered before any
//!   call is resolved, so results never depend on file order
//! - **Impact**: reverse BFS with per-caller risk and affected features
//! - **Journeys**: ordered steps from an entry point, through API requests
//!   into server handlers, with cycles cut and marked
//! - **Errors**: which declarations let failures escape, and how far they travel
//! - **Data flow**: where one variable's value comes from and where it goes
//! - **Bounded**: every traversal has depth and visit limits
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flowlens::{AnalysisConfig, Pipeline, SourceFile};
//!
//! let pipeline = Pipeline::new(AnalysisConfig::default())?;
//! let files = vec![SourceFile::new("src/auth.ts", "export function login() {}")];
//! let output = pipeline.run(&files);
//! let report = pipeline.impact(&output.graph, "login")?;
//! println!("{}", report.feature_summary());
//! # Ok::<(), flowlens::FlowError>(())
//! ```

pub mod classify;
pub mod cli;
pub mod config;
pub mod dataflow;
pub mod error;
pub mod graph;
pub mod hotspot;
pub mod impact;
pub mod jobs;
pub mod journey;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod propagation;

// Re-exports for convenience
pub use error::{FlowError, Result};

pub use classify::{LayerClassifier, LayerRule};
pub use config::{AnalysisConfig, ExtractionConfig, TraversalLimits};
pub use dataflow::{trace_data_flow, DataFlowQuery, DataFlowTrace, TraceDirection};
pub use graph::{
    build_call_graph, CallGraph, Declaration, DeclarationKind, ExternalEdge, ExternalKind,
    FileAnalysis, GraphStats, Layer,
};
pub use hotspot::{rank_hotspots, Hotspot};
pub use impact::{
    compute_impact, FeatureMapper, FeatureSource, ImpactReport, RiskLevel, RiskPolicy,
};
pub use jobs::{JobId, JobQueue, JobState, JobStatus};
pub use journey::{synthesize_journey, JourneyStep, SequenceFlow};
pub use parser::{extract_file, SourceLanguage};
pub use pipeline::{Pipeline, PipelineOutput, PipelineSummary, SourceFile};
pub use propagation::{
    analyze_error_handling, trace_error_propagation, ErrorProfile, ErrorPropagation, ErrorRisk,
};

/// Extract and classify `files` with the default layer rules. Files that
/// cannot be analyzed are logged and left out.
pub fn analyze_files(files: &[SourceFile], config: &ExtractionConfig) -> Vec<FileAnalysis> {
    let classifier = LayerClassifier::with_defaults(config);
    pipeline::analyze_batch(files, config, &classifier).analyses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impact::Identifier;
    use crate::journey::StepKind;

    fn run(files: &[SourceFile]) -> PipelineOutput {
        Pipeline::new(AnalysisConfig::default()).unwrap().run(files)
    }

    fn login_files() -> Vec<SourceFile> {
        vec![
            SourceFile::new(
                "src/login.ts",
                r#"
import { validateUser } from './auth';

export function handleLogin(user: string) {
  return validateUser(user);
}
"#,
            ),
            SourceFile::new(
                "src/auth.ts",
                r#"
export function validateUser(user: string): boolean {
  return user.length > 0;
}
"#,
            ),
        ]
    }

    #[test]
    fn test_login_calls_validate_across_files() {
        let output = run(&login_files());
        let graph = &output.graph;

        let callees: Vec<&str> = graph
            .callees("src/login.ts:handleLogin")
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(callees, vec!["src/auth.ts:validateUser"]);
        assert!(!graph.is_entry_point("src/auth.ts:validateUser"));
        // not a route file under the default rules
        assert!(!graph.is_entry_point("src/login.ts:handleLogin"));

        // reversed input order gives the same graph
        let mut reversed = login_files();
        reversed.reverse();
        assert_eq!(run(&reversed).graph.snapshot(), graph.snapshot());
    }

    #[test]
    fn test_route_classified_login_is_an_entry_point() {
        let classifier = LayerClassifier::new(vec![LayerRule::new(
            "login-route",
            Layer::RouteHandler,
            |a| a.file_path.ends_with("login.ts"),
        )]);
        let pipeline = Pipeline::new(AnalysisConfig::default())
            .unwrap()
            .with_classifier(classifier);
        let output = pipeline.run(&login_files());

        let entries: Vec<&str> = output.graph.entry_points().collect();
        assert_eq!(entries, vec!["src/login.ts:handleLogin"]);
        assert_eq!(output.journeys.len(), 1);
        assert_eq!(output.journeys[0].steps.len(), 2);
    }

    #[test]
    fn test_auth_hook_maps_to_every_feature() {
        let mapper = FeatureMapper::with_defaults();
        let names: Vec<String> = mapper
            .features_for(Identifier::Path("src/hooks/useAuth.ts"))
            .into_iter()
            .map(|f| f.name)
            .collect();
        for feature in ["login", "signup", "profile"] {
            assert!(names.contains(&feature.to_string()), "missing {feature}");
        }
    }

    #[test]
    fn test_impact_reports_each_caller_once_at_min_distance() {
        let mut files = login_files();
        files.push(SourceFile::new(
            "src/signup.ts",
            r#"
import { validateUser } from './auth';

export function handleSignup(user: string) {
  return validateUser(user);
}
"#,
        ));
        files.push(SourceFile::new(
            "src/audit.ts",
            r#"
import { handleLogin } from './login';

export function auditLog(user: string) {
  handleLogin(user);
}
"#,
        ));
        let pipeline = Pipeline::new(AnalysisConfig::default()).unwrap();
        let output = pipeline.run(&files);
        let report = pipeline.impact(&output.graph, "validateUser").unwrap();

        let reached: Vec<(&str, usize)> = report
            .affected
            .iter()
            .map(|a| (a.name.as_str(), a.distance))
            .collect();
        assert_eq!(
            reached,
            vec![("handleLogin", 1), ("handleSignup", 1), ("auditLog", 2)]
        );
        let audit = report.affected_node("src/audit.ts:auditLog").unwrap();
        assert!(report
            .direct_callers()
            .all(|caller| audit.risk <= caller.risk));
        assert!(!report.truncated);

        let names: Vec<&str> = report
            .features_affected
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert!(names.contains(&"login"));
        assert!(names.contains(&"signup"));

        assert!(matches!(
            pipeline.impact(&output.graph, "nope"),
            Err(FlowError::NotFound(_))
        ));
    }

    #[test]
    fn test_recursive_function_journey_terminates() {
        let output = run(&[SourceFile::new(
            "src/tree.ts",
            r#"
export function walk(node: any) {
  if (node.child) {
    walk(node.child);
  }
}
"#,
        )]);
        let flow =
            synthesize_journey(&output.graph, "walk", &AnalysisConfig::default().journey).unwrap();
        let steps: Vec<(&str, bool)> = flow
            .steps
            .iter()
            .map(|s| (s.declaration_id.as_str(), s.looped))
            .collect();
        assert_eq!(
            steps,
            vec![("src/tree.ts:walk", false), ("src/tree.ts:walk", true)]
        );
        assert!(!flow.truncated);
        assert_eq!(output.graph.cycles(), vec![vec!["src/tree.ts:walk".to_string()]]);
    }

    #[test]
    fn test_journey_crosses_into_route_handler() {
        let mut files = login_files();
        files.push(SourceFile::new(
            "src/components/LoginForm.tsx",
            r#"
export function LoginForm() {
  submitLogin();
  return <form />;
}

async function submitLogin() {
  await fetch('/api/login', { method: 'POST' });
}
"#,
        ));
        files.push(SourceFile::new(
            "app/api/login/route.ts",
            r#"
import { validateUser } from '@/auth';

export async function POST(req: Request) {
  return validateUser('x');
}
"#,
        ));
        let output = run(&files);
        let graph = &output.graph;
        assert!(graph.is_entry_point("src/components/LoginForm.tsx:LoginForm"));
        assert!(graph.is_entry_point("app/api/login/route.ts:POST"));

        let flow = output
            .journeys
            .iter()
            .find(|j| j.entry_id == "src/components/LoginForm.tsx:LoginForm")
            .unwrap();
        let steps: Vec<(&str, StepKind)> = flow
            .steps
            .iter()
            .map(|s| (s.declaration_id.as_str(), s.kind))
            .collect();
        assert_eq!(
            steps,
            vec![
                ("src/components/LoginForm.tsx:LoginForm", StepKind::Entry),
                ("src/components/LoginForm.tsx:submitLogin", StepKind::Call),
                ("app/api/login/route.ts:POST", StepKind::ApiRequest),
                ("src/auth.ts:validateUser", StepKind::Call),
            ]
        );
        assert_eq!(flow.external_steps().count(), 0);
        assert_eq!(flow.steps[2].label, "Server handles POST /api/login");
        // `await fetch(...)` in submitLogin
        assert!(flow.steps[2].awaited);
        assert!(!flow.steps[1].awaited);
    }

    #[test]
    fn test_closure_inside_method_resolves_locally() {
        let output = run(&[SourceFile::new(
            "src/svc.ts",
            r#"
export class Service {
  run() {
    const helper = () => 1;
    return helper();
  }
}
"#,
        )]);
        let graph = &output.graph;
        let callees: Vec<&str> = graph
            .callees("src/svc.ts:Service.run")
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(callees, vec!["src/svc.ts:helper"]);
        assert!(graph.external_edges_from("src/svc.ts:Service.run").is_empty());
        assert!(graph.resolve_target("Service.helper").is_err());
    }

    #[test]
    fn test_analyze_files_skips_unsupported() {
        let mut files = login_files();
        files.push(SourceFile::new("styles.css", "body {}"));
        let analyses = analyze_files(&files, &ExtractionConfig::default());
        assert_eq!(analyses.len(), 2);
        let graph = build_call_graph(&analyses);
        assert_eq!(graph.stats().call_edges, 1);

        let hotspots = rank_hotspots(&graph, &AnalysisConfig::default().hotspots);
        assert_eq!(hotspots.len(), 2);
        assert_eq!(hotspots[0].score, hotspots[1].score);
    }
}
