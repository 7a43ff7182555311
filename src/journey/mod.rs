//! Journey synthesis: ordered behavior steps from an entry point.
//!
//! A journey is a depth-first walk of the call graph from one declaration.
//! Children of a node are visited in the order their calls appear in the
//! source. Calls that leave the analyzed code end their branch but still
//! appear as steps. A node already on the current path is emitted once more
//! as a looped step and not descended into, so recursion and cycles
//! terminate. The walk is explicit-stack, never recursive.
//!
//! Each step keeps how it was called: awaited (an async step) and
//! conditional (only happens on some branch).

pub mod labels;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::JourneyConfig;
use crate::error::Result;
use crate::graph::types::{
    CallFlags, CallVia, Declaration, EdgeData, EdgeKind, ExternalEdge, ExternalKind,
};
use crate::graph::CallGraph;

pub use labels::{humanize, infer_trigger, Trigger, TriggerKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Entry,
    Call,
    Render,
    ApiRequest,
    External,
}

impl StepKind {
    fn from_edge(edge: EdgeData) -> Self {
        match (edge.kind, edge.via) {
            (EdgeKind::ApiRequest, _) => StepKind::ApiRequest,
            (EdgeKind::Calls, CallVia::Render) => StepKind::Render,
            (EdgeKind::Calls, _) => StepKind::Call,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyStep {
    /// 1-based position in the journey.
    pub order: usize,
    /// Declaration id, or `external:<kind>:<target>` for external calls.
    pub declaration_id: String,
    pub label: String,
    pub is_external_call: bool,
    /// The declaration was already on the current path; the walk stopped here.
    pub looped: bool,
    pub depth: usize,
    pub kind: StepKind,
    /// Source line of the call that led here. None for the entry step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// The call that led here was awaited.
    #[serde(default)]
    pub awaited: bool,
    /// The call that led here sits under an `if`, `switch` or ternary.
    #[serde(default)]
    pub conditional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceFlow {
    pub entry_id: String,
    pub title: String,
    pub trigger: Trigger,
    pub steps: Vec<JourneyStep>,
    /// A depth or visit limit cut the walk short.
    pub truncated: bool,
}

impl SequenceFlow {
    pub fn external_steps(&self) -> impl Iterator<Item = &JourneyStep> {
        self.steps.iter().filter(|s| s.is_external_call)
    }

    /// Steps that only happen on some branches.
    pub fn conditional_steps(&self) -> impl Iterator<Item = &JourneyStep> {
        self.steps.iter().filter(|s| s.conditional)
    }
}

enum Work<'g> {
    Visit {
        decl: &'g Declaration,
        depth: usize,
        kind: StepKind,
        line: Option<usize>,
        flags: CallFlags,
    },
    External {
        edge: &'g ExternalEdge,
        depth: usize,
    },
    Leave(&'g str),
}

impl Work<'_> {
    fn line(&self) -> usize {
        match self {
            Work::Visit { line, .. } => line.unwrap_or(0),
            Work::External { edge, .. } => edge.line,
            Work::Leave(_) => 0,
        }
    }
}

/// Build the journey that starts at `entry` (an id or a unique name).
pub fn synthesize_journey(
    graph: &CallGraph,
    entry: &str,
    config: &JourneyConfig,
) -> Result<SequenceFlow> {
    let entry = graph.resolve_target(entry)?;
    let limits = config.limits;
    let mut steps: Vec<JourneyStep> = Vec::new();
    let mut on_path: HashSet<&str> = HashSet::new();
    let mut truncated = false;

    let mut stack = vec![Work::Visit {
        decl: entry,
        depth: 0,
        kind: StepKind::Entry,
        line: None,
        flags: CallFlags::default(),
    }];

    while let Some(work) = stack.pop() {
        if steps.len() >= limits.max_visits && !matches!(work, Work::Leave(_)) {
            truncated = true;
            break;
        }
        match work {
            Work::Leave(id) => {
                on_path.remove(id);
            }
            Work::External { edge, depth } => {
                steps.push(JourneyStep {
                    order: steps.len() + 1,
                    declaration_id: edge.step_id(),
                    label: labels::external_label(edge),
                    is_external_call: true,
                    looped: false,
                    depth,
                    kind: StepKind::External,
                    line: Some(edge.line),
                    awaited: edge.flags.awaited,
                    conditional: edge.flags.conditional,
                });
            }
            Work::Visit {
                decl,
                depth,
                kind,
                line,
                flags,
            } => {
                let looped = on_path.contains(decl.id.as_str());
                steps.push(JourneyStep {
                    order: steps.len() + 1,
                    declaration_id: decl.id.clone(),
                    label: labels::step_label(decl, graph.file(&decl.file_path)),
                    is_external_call: false,
                    looped,
                    depth,
                    kind,
                    line,
                    awaited: flags.awaited,
                    conditional: flags.conditional,
                });
                if looped {
                    continue;
                }

                let children = children_of(graph, decl, depth + 1, config);
                if children.is_empty() {
                    continue;
                }
                if depth >= limits.max_depth {
                    truncated = true;
                    continue;
                }
                on_path.insert(decl.id.as_str());
                stack.push(Work::Leave(decl.id.as_str()));
                stack.extend(children.into_iter().rev());
            }
        }
    }

    let trigger = infer_trigger(entry, graph.file(&entry.file_path));
    let title = labels::step_label(entry, graph.file(&entry.file_path));
    debug!(entry = %entry.id, steps = steps.len(), truncated, "journey synthesized");

    Ok(SequenceFlow {
        entry_id: entry.id.clone(),
        title,
        trigger,
        steps,
        truncated,
    })
}

/// One journey per entry point, in id order.
pub fn synthesize_all(graph: &CallGraph, config: &JourneyConfig) -> Vec<SequenceFlow> {
    let flows: Vec<SequenceFlow> = graph
        .entry_points()
        .filter_map(|id| synthesize_journey(graph, id, config).ok())
        .collect();
    info!(
        journeys = flows.len(),
        truncated = flows.iter().filter(|f| f.truncated).count(),
        "journeys synthesized"
    );
    flows
}

/// Internal callees and emitted external calls, by source line.
fn children_of<'g>(
    graph: &'g CallGraph,
    decl: &'g Declaration,
    depth: usize,
    config: &JourneyConfig,
) -> Vec<Work<'g>> {
    let mut children: Vec<Work<'g>> = graph
        .callee_edges(&decl.id)
        .into_iter()
        .map(|(callee, edge)| Work::Visit {
            decl: callee,
            depth,
            kind: StepKind::from_edge(edge),
            line: Some(edge.line),
            flags: edge.flags,
        })
        .collect();
    children.extend(
        graph
            .external_edges_from(&decl.id)
            .into_iter()
            .filter(|edge| match edge.kind {
                // bridged requests are walked as the handler
                ExternalKind::Http => edge.matched_handler.is_none(),
                ExternalKind::Database => true,
                ExternalKind::Unresolved => config.include_unresolved,
            })
            .map(|edge| Work::External { edge, depth }),
    );
    // Stable: internal calls stay ahead of external ones on the same line.
    children.sort_by_key(Work::line);
    children
}
