//! Change impact: who is affected if a declaration changes.
//!
//! Impact is a reverse walk from the target over call edges, including
//! bridged API requests. Each affected caller gets a risk level from its
//! distance and its own fan-in, and the features of everything affected are
//! collected through a [`FeatureSource`].

pub mod bfs;
pub mod features;
pub mod risk;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::{ImpactConfig, TraversalLimits};
use crate::error::Result;
use crate::graph::CallGraph;

pub use bfs::{reverse_bfs, ReverseReach};
pub use features::{
    merge_features, Feature, FeatureMapper, FeatureRule, FeatureSource, Identifier, MatchScope,
};
pub use risk::{RiskLevel, RiskPolicy};

/// Features listed by name in [`ImpactReport::feature_summary`].
const SUMMARY_FEATURES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedNode {
    pub id: String,
    pub name: String,
    pub file_path: String,
    /// Call hops from the target; direct callers are at 1.
    pub distance: usize,
    pub fan_in: usize,
    pub risk: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactReport {
    pub target_id: String,
    pub target_name: String,
    /// Sorted by distance, then id.
    pub affected: Vec<AffectedNode>,
    pub features_affected: Vec<Feature>,
    pub affected_entry_points: Vec<String>,
    /// Highest risk among affected callers.
    pub highest_risk: Option<RiskLevel>,
    pub truncated: bool,
}

impl ImpactReport {
    pub fn direct_callers(&self) -> impl Iterator<Item = &AffectedNode> {
        self.affected.iter().filter(|a| a.distance == 1)
    }

    pub fn affected_node(&self, id: &str) -> Option<&AffectedNode> {
        self.affected.iter().find(|a| a.id == id)
    }

    /// One line for non-technical readers.
    pub fn feature_summary(&self) -> String {
        let names: Vec<&str> = self
            .features_affected
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        match names.len() {
            0 => "No user-facing features affected.".to_string(),
            n if n <= SUMMARY_FEATURES => format!("Affected features: {}", names.join(", ")),
            n => format!(
                "Affected features: {} and {} more",
                names[..SUMMARY_FEATURES].join(", "),
                n - SUMMARY_FEATURES
            ),
        }
    }
}

/// Compute the impact of changing `target` (an id or a unique name).
pub fn compute_impact(
    graph: &CallGraph,
    target: &str,
    config: &ImpactConfig,
    mapper: &dyn FeatureSource,
) -> Result<ImpactReport> {
    let target = graph.resolve_target(target)?;
    let policy = config.policy();
    let reach = reverse_bfs(graph, &target.id, config.limits);

    let mut affected: Vec<AffectedNode> = reach
        .reached
        .iter()
        .filter_map(|(id, distance)| graph.node(id).map(|decl| (decl, *distance)))
        .map(|(decl, distance)| {
            let fan_in = graph.fan_in(&decl.id);
            AffectedNode {
                id: decl.id.clone(),
                name: decl.qualified_name(),
                file_path: decl.file_path.clone(),
                distance,
                fan_in,
                risk: policy.assess(distance, fan_in),
            }
        })
        .collect();
    affected.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));

    let mut feature_groups = vec![mapper.features_for_declaration(target)];
    feature_groups.extend(
        affected
            .iter()
            .filter_map(|a| graph.node(&a.id))
            .map(|decl| mapper.features_for_declaration(decl)),
    );
    let features_affected = merge_features(feature_groups);

    let mut affected_entry_points: Vec<String> = std::iter::once(target.id.as_str())
        .chain(affected.iter().map(|a| a.id.as_str()))
        .filter(|id| graph.is_entry_point(id))
        .map(str::to_string)
        .collect();
    affected_entry_points.sort();

    let highest_risk = affected.iter().map(|a| a.risk).max();

    info!(
        target = %target.id,
        affected = affected.len(),
        features = features_affected.len(),
        truncated = reach.truncated,
        "impact computed"
    );

    Ok(ImpactReport {
        target_id: target.id.clone(),
        target_name: target.qualified_name(),
        affected,
        features_affected,
        affected_entry_points,
        highest_risk,
        truncated: reach.truncated,
    })
}

/// Caller chains from a target up to the entry points that reach it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPaths {
    /// Each path starts at the target and ends at an entry point.
    pub paths: Vec<Vec<String>>,
    pub truncated: bool,
}

/// Depth-first over reversed edges, one path per way of reaching an entry
/// point. A node is never repeated within a path.
pub fn paths_to_entry_points(
    graph: &CallGraph,
    target: &str,
    limits: TraversalLimits,
) -> Result<EntryPaths> {
    let target = graph.resolve_target(target)?;
    let mut result = EntryPaths::default();
    let mut visits = 0usize;
    let mut stack: Vec<Vec<&str>> = vec![vec![target.id.as_str()]];

    while let Some(path) = stack.pop() {
        let Some(&current) = path.last() else {
            continue;
        };
        if graph.is_entry_point(current) {
            result.paths.push(path.iter().map(|s| s.to_string()).collect());
            continue;
        }
        visits += 1;
        if visits > limits.max_visits {
            result.truncated = true;
            break;
        }
        let on_path: HashSet<&str> = path.iter().copied().collect();
        let callers: Vec<&str> = graph
            .callers(current)
            .into_iter()
            .map(|d| d.id.as_str())
            .filter(|id| !on_path.contains(id))
            .collect();
        if callers.is_empty() {
            continue;
        }
        if path.len() > limits.max_depth {
            result.truncated = true;
            continue;
        }
        // Reverse so the smallest id is explored first.
        for caller in callers.into_iter().rev() {
            let mut next = path.clone();
            next.push(caller);
            stack.push(next);
        }
    }

    result.paths.sort();
    debug!(target = %target.id, paths = result.paths.len(), "entry paths traced");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;
    use crate::graph::types::{CallVia, Declaration, DeclarationKind, EdgeData, EdgeKind};

    fn call() -> EdgeData {
        EdgeData::new(EdgeKind::Calls, CallVia::Direct, 1)
    }

    /// handleLogin and handleSignup call validateUser; auditLog calls handleLogin.
    fn auth_graph() -> CallGraph {
        let mut graph = CallGraph::new();
        for (file, name) in [
            ("src/auth.ts", "validateUser"),
            ("src/login.ts", "handleLogin"),
            ("src/signup.ts", "handleSignup"),
            ("src/audit.ts", "auditLog"),
        ] {
            let mut decl = Declaration::new(file, name, DeclarationKind::Function);
            decl.exported = true;
            graph.add_declaration(decl);
        }
        graph.add_call("src/login.ts:handleLogin", "src/auth.ts:validateUser", call());
        graph.add_call("src/signup.ts:handleSignup", "src/auth.ts:validateUser", call());
        graph.add_call("src/audit.ts:auditLog", "src/login.ts:handleLogin", call());
        graph.mark_entry_point("src/signup.ts:handleSignup");
        graph.mark_entry_point("src/audit.ts:auditLog");
        graph
    }

    #[test]
    fn test_impact_reports_each_caller_once() {
        let graph = auth_graph();
        let report = compute_impact(
            &graph,
            "validateUser",
            &ImpactConfig::default(),
            &FeatureMapper::with_defaults(),
        )
        .unwrap();

        let found: Vec<(&str, usize)> = report
            .affected
            .iter()
            .map(|a| (a.name.as_str(), a.distance))
            .collect();
        assert_eq!(
            found,
            vec![("handleLogin", 1), ("handleSignup", 1), ("auditLog", 2)]
        );
        let audit = report.affected_node("src/audit.ts:auditLog").unwrap();
        for direct in report.direct_callers() {
            assert!(audit.risk <= direct.risk);
        }
        assert_eq!(report.direct_callers().count(), 2);
        assert!(!report.truncated);
    }

    #[test]
    fn test_impact_features_and_entry_points() {
        let graph = auth_graph();
        let report = compute_impact(
            &graph,
            "src/auth.ts:validateUser",
            &ImpactConfig::default(),
            &FeatureMapper::with_defaults(),
        )
        .unwrap();
        let names: Vec<&str> = report
            .features_affected
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert!(names.contains(&"login"));
        assert!(names.contains(&"signup"));
        assert_eq!(
            report.affected_entry_points,
            vec![
                "src/audit.ts:auditLog".to_string(),
                "src/signup.ts:handleSignup".to_string()
            ]
        );
    }

    #[test]
    fn test_high_risk_needs_fan_in() {
        let mut graph = auth_graph();
        graph.add_declaration(Declaration::new("src/cron.ts", "nightly", DeclarationKind::Function));
        graph.add_call("src/cron.ts:nightly", "src/login.ts:handleLogin", call());
        let report = compute_impact(
            &graph,
            "validateUser",
            &ImpactConfig::default(),
            &FeatureMapper::with_defaults(),
        )
        .unwrap();
        let login = report.affected_node("src/login.ts:handleLogin").unwrap();
        assert_eq!(login.fan_in, 2);
        assert_eq!(login.risk, RiskLevel::High);
        assert_eq!(report.highest_risk, Some(RiskLevel::High));
    }

    #[test]
    fn test_unknown_target() {
        let graph = auth_graph();
        let err = compute_impact(
            &graph,
            "src/nope.ts:missing",
            &ImpactConfig::default(),
            &FeatureMapper::with_defaults(),
        )
        .unwrap_err();
        assert!(matches!(err, FlowError::NotFound(_)));
    }

    #[test]
    fn test_truncated_report_keeps_partial_result() {
        let graph = auth_graph();
        let config = ImpactConfig {
            limits: TraversalLimits::new(1, 100),
            ..ImpactConfig::default()
        };
        let report =
            compute_impact(&graph, "validateUser", &config, &FeatureMapper::with_defaults())
                .unwrap();
        assert_eq!(report.affected.len(), 2);
        assert!(report.truncated);
    }

    #[test]
    fn test_feature_summary() {
        let feature = |name: &str| Feature {
            name: name.to_string(),
            matched_via: Vec::new(),
        };
        let mut report = ImpactReport {
            target_id: "a".to_string(),
            target_name: "a".to_string(),
            affected: Vec::new(),
            features_affected: Vec::new(),
            affected_entry_points: Vec::new(),
            highest_risk: None,
            truncated: false,
        };
        assert_eq!(report.feature_summary(), "No user-facing features affected.");

        report.features_affected = vec![feature("login"), feature("signup")];
        assert_eq!(report.feature_summary(), "Affected features: login, signup");

        report.features_affected = ["login", "signup", "profile", "search", "files"]
            .into_iter()
            .map(feature)
            .collect();
        assert_eq!(
            report.feature_summary(),
            "Affected features: login, signup, profile and 2 more"
        );
    }

    #[test]
    fn test_paths_to_entry_points() {
        let graph = auth_graph();
        let paths =
            paths_to_entry_points(&graph, "validateUser", TraversalLimits::default()).unwrap();
        assert_eq!(
            paths.paths,
            vec![
                vec![
                    "src/auth.ts:validateUser".to_string(),
                    "src/login.ts:handleLogin".to_string(),
                    "src/audit.ts:auditLog".to_string(),
                ],
                vec![
                    "src/auth.ts:validateUser".to_string(),
                    "src/signup.ts:handleSignup".to_string(),
                ],
            ]
        );
        assert!(!paths.truncated);
    }
}
