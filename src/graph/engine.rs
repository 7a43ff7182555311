//! The call graph engine for flowlens.
//!
//! Uses petgraph to store resolved calls between declarations, and keeps
//! calls that leave the analyzed code (HTTP, database, unresolved) as a
//! separate list of external edges. The graph is read-only once the builder
//! hands it out.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::types::*;
use crate::error::{FlowError, Result};

/// Per-file facts the graph keeps after assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub file_path: String,
    pub layer: Layer,
    pub is_component: bool,
    pub is_hook: bool,
    pub is_route_handler: bool,
}

impl From<&FileAnalysis> for FileSummary {
    fn from(analysis: &FileAnalysis) -> Self {
        Self {
            file_path: analysis.file_path.clone(),
            layer: analysis.layer,
            is_component: analysis.is_component,
            is_hook: analysis.is_hook,
            is_route_handler: analysis.is_route_handler,
        }
    }
}

/// The unified call graph: declarations, internal edges, entry points and
/// external edges.
pub struct CallGraph {
    /// The directed graph storing call relationships.
    graph: DiGraph<Declaration, EdgeData>,
    /// Index: declaration id -> node index.
    id_index: HashMap<String, NodeIndex>,
    /// Index: declaration name -> node indexes.
    name_index: HashMap<String, Vec<NodeIndex>>,
    files: BTreeMap<String, FileSummary>,
    entry_points: BTreeSet<String>,
    external: Vec<ExternalEdge>,
    external_keys: HashSet<(String, ExternalKind, String)>,
}

impl CallGraph {
    /// Create a new empty call graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            id_index: HashMap::new(),
            name_index: HashMap::new(),
            files: BTreeMap::new(),
            entry_points: BTreeSet::new(),
            external: Vec::new(),
            external_keys: HashSet::new(),
        }
    }

    // ─── Node Operations ────────────────────────────────────────

    pub fn add_file(&mut self, summary: FileSummary) {
        self.files.insert(summary.file_path.clone(), summary);
    }

    /// Add a declaration node. Re-adding an id returns the existing node.
    pub fn add_declaration(&mut self, decl: Declaration) -> NodeIndex {
        if let Some(&idx) = self.id_index.get(&decl.id) {
            return idx;
        }
        let id = decl.id.clone();
        let name = decl.name.clone();
        let idx = self.graph.add_node(decl);
        self.id_index.insert(id, idx);
        self.name_index.entry(name).or_default().push(idx);
        idx
    }

    pub(crate) fn mark_entry_point(&mut self, id: &str) {
        if self.id_index.contains_key(id) {
            self.entry_points.insert(id.to_string());
        }
    }

    // ─── Edge Operations ────────────────────────────────────────

    /// Add an internal edge. Returns false when either end is unknown or
    /// the pair is already connected.
    pub fn add_call(&mut self, from: &str, to: &str, data: EdgeData) -> bool {
        let (Some(&a), Some(&b)) = (self.id_index.get(from), self.id_index.get(to)) else {
            return false;
        };
        if self.graph.find_edge(a, b).is_some() {
            return false;
        }
        self.graph.add_edge(a, b, data);
        true
    }

    /// Add an external edge unless an identical one exists.
    pub fn add_external(&mut self, edge: ExternalEdge) -> bool {
        let key = (edge.caller_id.clone(), edge.kind, edge.target.clone());
        if !self.external_keys.insert(key) {
            return false;
        }
        self.external.push(edge);
        true
    }

    /// Record that external edge `index` is served by `handler_id`.
    pub(crate) fn bridge_external(&mut self, index: usize, handler_id: &str) {
        let Some(edge) = self.external.get_mut(index) else {
            return;
        };
        edge.matched_handler = Some(handler_id.to_string());
        let (caller, line, flags) = (edge.caller_id.clone(), edge.line, edge.flags);
        let data = EdgeData {
            flags,
            ..EdgeData::new(EdgeKind::ApiRequest, CallVia::Direct, line)
        };
        self.add_call(&caller, handler_id, data);
    }

    // ─── Query Operations ───────────────────────────────────────

    pub fn node(&self, id: &str) -> Option<&Declaration> {
        self.id_index.get(id).map(|&idx| &self.graph[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.id_index.contains_key(id)
    }

    /// All declarations, sorted by id.
    pub fn declarations(&self) -> Vec<&Declaration> {
        let mut decls: Vec<&Declaration> = self.graph.node_weights().collect();
        decls.sort_by(|a, b| a.id.cmp(&b.id));
        decls
    }

    pub fn file(&self, path: &str) -> Option<&FileSummary> {
        self.files.get(path)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileSummary> {
        self.files.values()
    }

    /// Direct callers of `id` over every edge kind, sorted by id.
    pub fn callers(&self, id: &str) -> Vec<&Declaration> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Direct callees of `id` over every edge kind, sorted by id.
    pub fn callees(&self, id: &str) -> Vec<&Declaration> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Outgoing edges of `id` in call order (line, then callee id).
    pub fn callee_edges(&self, id: &str) -> Vec<(&Declaration, EdgeData)> {
        let Some(&idx) = self.id_index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<(&Declaration, EdgeData)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (&self.graph[e.target()], *e.weight()))
            .collect();
        edges.sort_by(|(a, ea), (b, eb)| ea.line.cmp(&eb.line).then_with(|| a.id.cmp(&b.id)));
        edges
    }

    /// Incoming edges of `id`, by caller id.
    pub fn caller_edges(&self, id: &str) -> Vec<(&Declaration, EdgeData)> {
        let Some(&idx) = self.id_index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<(&Declaration, EdgeData)> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (&self.graph[e.source()], *e.weight()))
            .collect();
        edges.sort_by(|(a, _), (b, _)| a.id.cmp(&b.id));
        edges
    }

    /// Whether anything other than `id` itself reaches it by a `calls` edge.
    pub fn has_direct_callers(&self, id: &str) -> bool {
        let Some(&idx) = self.id_index.get(id) else {
            return false;
        };
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .any(|e| e.weight().kind == EdgeKind::Calls && e.source() != idx)
    }

    /// Number of distinct callers.
    pub fn fan_in(&self, id: &str) -> usize {
        self.callers(id).len()
    }

    /// Number of distinct internal callees.
    pub fn fan_out(&self, id: &str) -> usize {
        self.callees(id).len()
    }

    /// Declarations with this name, sorted by id.
    pub fn find_by_name(&self, name: &str) -> Vec<&Declaration> {
        let mut found: Vec<&Declaration> = self
            .name_index
            .get(name)
            .map(|idxs| idxs.iter().map(|&i| &self.graph[i]).collect())
            .unwrap_or_default();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    /// Resolve a user-supplied target: an exact id, a unique name, or a
    /// unique `Class.method`.
    pub fn resolve_target(&self, query: &str) -> Result<&Declaration> {
        if let Some(decl) = self.node(query) {
            return Ok(decl);
        }
        let mut candidates = self.find_by_name(query);
        if candidates.is_empty() {
            candidates = self
                .declarations()
                .into_iter()
                .filter(|d| d.container.is_some() && d.qualified_name() == query)
                .collect();
        }
        match candidates.as_slice() {
            [] => Err(FlowError::NotFound(query.to_string())),
            [only] => Ok(*only),
            many => Err(FlowError::AmbiguousTarget {
                query: query.to_string(),
                candidates: many.iter().map(|d| d.id.clone()).collect(),
            }),
        }
    }

    pub fn entry_points(&self) -> impl Iterator<Item = &str> {
        self.entry_points.iter().map(String::as_str)
    }

    pub fn is_entry_point(&self, id: &str) -> bool {
        self.entry_points.contains(id)
    }

    pub fn external_edges(&self) -> &[ExternalEdge] {
        &self.external
    }

    /// External edges leaving `id`, in call order.
    pub fn external_edges_from(&self, id: &str) -> Vec<&ExternalEdge> {
        let mut edges: Vec<&ExternalEdge> = self
            .external
            .iter()
            .filter(|e| e.caller_id == id)
            .collect();
        edges.sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.target.cmp(&b.target)));
        edges
    }

    /// Strongly connected components that form a cycle, each sorted by id.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || self.graph.find_edge(scc[0], scc[0]).is_some()
            })
            .map(|scc| {
                let mut ids: Vec<String> = scc.iter().map(|&i| self.graph[i].id.clone()).collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }

    // ─── Stats ──────────────────────────────────────────────────

    pub fn stats(&self) -> GraphStats {
        let count = |kind: ExternalKind| self.external.iter().filter(|e| e.kind == kind).count();
        GraphStats {
            files: self.files.len(),
            declarations: self.graph.node_count(),
            call_edges: self
                .graph
                .edge_weights()
                .filter(|e| e.kind == EdgeKind::Calls)
                .count(),
            api_edges: self
                .graph
                .edge_weights()
                .filter(|e| e.kind == EdgeKind::ApiRequest)
                .count(),
            http_calls: count(ExternalKind::Http),
            database_calls: count(ExternalKind::Database),
            unresolved_calls: count(ExternalKind::Unresolved),
            entry_points: self.entry_points.len(),
        }
    }

    /// Serializable view for renderers.
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut edges: Vec<SnapshotEdge> = self
            .graph
            .edge_references()
            .map(|e| SnapshotEdge {
                from: self.graph[e.source()].id.clone(),
                to: self.graph[e.target()].id.clone(),
                kind: e.weight().kind,
                line: e.weight().line,
            })
            .collect();
        edges.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));

        let mut external = self.external.clone();
        external.sort_by(|a, b| {
            (&a.caller_id, a.line, &a.target).cmp(&(&b.caller_id, b.line, &b.target))
        });

        GraphSnapshot {
            nodes: self.declarations().into_iter().cloned().collect(),
            edges,
            entry_points: self.entry_points.iter().cloned().collect(),
            external_edges: external,
            external_sentinel: EXTERNAL_SENTINEL.to_string(),
        }
    }

    // ─── Internal Helpers ───────────────────────────────────────

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<&Declaration> {
        let Some(&idx) = self.id_index.get(id) else {
            return Vec::new();
        };
        let mut found: Vec<&Declaration> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| &self.graph[n])
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found.dedup_by(|a, b| a.id == b.id);
        found
    }
}

impl Default for CallGraph {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Query Result Types ─────────────────────────────────────────

/// Statistics about the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub files: usize,
    pub declarations: usize,
    pub call_edges: usize,
    pub api_edges: usize,
    pub http_calls: usize,
    pub database_calls: usize,
    pub unresolved_calls: usize,
    pub entry_points: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    pub line: usize,
}

/// Everything a renderer needs, with stable ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Declaration>,
    pub edges: Vec<SnapshotEdge>,
    pub entry_points: Vec<String>,
    /// External edges all point at `external_sentinel`.
    pub external_edges: Vec<ExternalEdge>,
    pub external_sentinel: String,
}
