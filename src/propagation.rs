//! Error propagation: where a failure inside a declaration ends up.
//!
//! A declaration raises when its own body lets an error escape: a `throw`
//! outside any local `try`, or an HTTP or database call that is not guarded
//! at its site. The error travels backwards along `calls` edges whose call
//! site is not guarded. A guarded site stops it there. API request edges are
//! not crossed: a failing route handler answers with an error response, the
//! request itself does not throw.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use tracing::{debug, info};

use crate::config::{ErrorConfig, TraversalLimits};
use crate::error::Result;
use crate::graph::types::{Declaration, EdgeKind, ErrorHandling, ExternalKind};
use crate::graph::CallGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorRisk {
    /// No error escapes this declaration.
    Safe,
    /// Errors escape but stay below the entry points.
    Warning,
    /// An entry point lets an error through to the user.
    Danger,
}

impl fmt::Display for ErrorRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorRisk::Safe => write!(f, "safe"),
            ErrorRisk::Warning => write!(f, "warning"),
            ErrorRisk::Danger => write!(f, "danger"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationHop {
    pub id: String,
    /// Call hops from the origin.
    pub distance: usize,
}

/// The callers an error raised in `origin_id` reaches unhandled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPropagation {
    pub origin_id: String,
    /// Sorted by distance, then id.
    pub reached: Vec<PropagationHop>,
    /// Callers that catch the error at the call site, sorted.
    pub handled_by: Vec<String>,
    /// Entry points the error reaches, the origin included, sorted.
    pub entry_points: Vec<String>,
    pub truncated: bool,
}

/// Error handling of one callable declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorProfile {
    pub id: String,
    pub name: String,
    pub file_path: String,
    pub line: usize,
    pub is_async: bool,
    pub handling: ErrorHandling,
    /// What lets an error escape the body itself: `throw`, or the display
    /// form of an unguarded HTTP or database call.
    pub raises: Vec<String>,
    /// Declarations whose errors arrive here unhandled, sorted.
    pub receives_from: Vec<String>,
    /// Some caller gets an escaping error without catching it.
    pub propagates_to_callers: bool,
    pub risk: ErrorRisk,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ErrorProfile {
    pub fn escapes(&self) -> bool {
        !self.raises.is_empty() || !self.receives_from.is_empty()
    }
}

/// Why errors can leave `decl`'s own body.
pub fn raise_sources(graph: &CallGraph, decl: &Declaration) -> Vec<String> {
    let mut sources = Vec::new();
    if decl.errors.throws {
        sources.push("throw".to_string());
    }
    sources.extend(
        graph
            .external_edges_from(&decl.id)
            .into_iter()
            .filter(|e| matches!(e.kind, ExternalKind::Http | ExternalKind::Database))
            .filter(|e| !e.flags.guarded)
            .map(|e| e.target.clone()),
    );
    sources
}

/// Trace an error raised in `origin` (an id or a unique name) to its callers.
pub fn trace_error_propagation(
    graph: &CallGraph,
    origin: &str,
    limits: TraversalLimits,
) -> Result<ErrorPropagation> {
    let origin = graph.resolve_target(origin)?;
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
    let mut reached: Vec<PropagationHop> = Vec::new();
    let mut handled: BTreeSet<String> = BTreeSet::new();
    let mut truncated = false;

    seen.insert(origin.id.as_str(), 0);
    queue.push_back((origin.id.as_str(), 0));

    'walk: while let Some((id, distance)) = queue.pop_front() {
        let edges = graph.caller_edges(id);
        for (caller, edge) in edges {
            if edge.kind != EdgeKind::Calls || seen.contains_key(caller.id.as_str()) {
                continue;
            }
            if edge.flags.guarded {
                handled.insert(caller.id.clone());
                continue;
            }
            if distance >= limits.max_depth {
                truncated = true;
                continue;
            }
            if reached.len() >= limits.max_visits {
                truncated = true;
                break 'walk;
            }
            seen.insert(caller.id.as_str(), distance + 1);
            reached.push(PropagationHop {
                id: caller.id.clone(),
                distance: distance + 1,
            });
            queue.push_back((caller.id.as_str(), distance + 1));
        }
    }

    reached.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
    let handled_by: Vec<String> = handled
        .into_iter()
        .filter(|id| !seen.contains_key(id.as_str()))
        .collect();
    let mut entry_points: Vec<String> = std::iter::once(origin.id.as_str())
        .chain(reached.iter().map(|h| h.id.as_str()))
        .filter(|id| graph.is_entry_point(id))
        .map(str::to_string)
        .collect();
    entry_points.sort();

    debug!(
        origin = %origin.id,
        reached = reached.len(),
        handled = handled_by.len(),
        truncated,
        "error propagation traced"
    );
    Ok(ErrorPropagation {
        origin_id: origin.id.clone(),
        reached,
        handled_by,
        entry_points,
        truncated,
    })
}

/// Profile every callable declaration, sorted by id.
pub fn analyze_error_handling(graph: &CallGraph, config: &ErrorConfig) -> Vec<ErrorProfile> {
    let callables: Vec<&Declaration> = graph
        .declarations()
        .into_iter()
        .filter(|d| d.kind.is_callable())
        .collect();

    let raised: HashMap<&str, Vec<String>> = callables
        .iter()
        .map(|d| (d.id.as_str(), raise_sources(graph, d)))
        .collect();

    let mut received: HashMap<String, BTreeSet<String>> = HashMap::new();
    let mut leaks: HashSet<String> = HashSet::new();
    for decl in &callables {
        if raised[decl.id.as_str()].is_empty() {
            continue;
        }
        let Ok(trace) = trace_error_propagation(graph, &decl.id, config.limits) else {
            continue;
        };
        if let Some(first) = trace.reached.iter().find(|h| h.distance == 1) {
            leaks.insert(decl.id.clone());
            debug!(origin = %decl.id, caller = %first.id, "error leaves its origin");
        }
        for hop in &trace.reached {
            received
                .entry(hop.id.clone())
                .or_default()
                .insert(decl.id.clone());
        }
    }

    let profiles: Vec<ErrorProfile> = callables
        .iter()
        .map(|decl| {
            let raises = raised[decl.id.as_str()].clone();
            let receives_from: Vec<String> = received
                .get(&decl.id)
                .map(|origins| origins.iter().cloned().collect())
                .unwrap_or_default();
            let escapes = !raises.is_empty() || !receives_from.is_empty();
            let propagates_to_callers = escapes && has_unguarded_caller(graph, &decl.id);
            let (risk, reason) = if !escapes {
                (ErrorRisk::Safe, None)
            } else if graph.is_entry_point(&decl.id) {
                (
                    ErrorRisk::Danger,
                    Some("unhandled errors reach an entry point".to_string()),
                )
            } else if propagates_to_callers {
                (
                    ErrorRisk::Warning,
                    Some("errors propagate to callers".to_string()),
                )
            } else {
                (
                    ErrorRisk::Warning,
                    Some("errors escape with no unguarded caller".to_string()),
                )
            };
            ErrorProfile {
                id: decl.id.clone(),
                name: decl.name.clone(),
                file_path: decl.file_path.clone(),
                line: decl.span.start_line,
                is_async: decl.is_async,
                handling: decl.errors,
                raises,
                receives_from,
                propagates_to_callers,
                risk,
                reason,
            }
        })
        .collect();

    info!(
        declarations = profiles.len(),
        leaking = leaks.len(),
        danger = profiles.iter().filter(|p| p.risk == ErrorRisk::Danger).count(),
        "error handling analyzed"
    );
    profiles
}

fn has_unguarded_caller(graph: &CallGraph, id: &str) -> bool {
    graph.caller_edges(id).iter().any(|(caller, edge)| {
        edge.kind == EdgeKind::Calls && !edge.flags.guarded && caller.id != id
    })
}
