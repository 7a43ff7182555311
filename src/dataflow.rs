//! Data-flow traces for one identifier inside one file.
//!
//! Backward: where the value comes from (declarations, assignments,
//! parameters). Forward: where it goes (rendered JSX, request bodies,
//! database writes, state setters, logs, returns, arguments to other
//! functions). The walk never leaves the file, but parameters and arguments
//! are linked to graph declarations so the trace can be continued from
//! there.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::{debug, warn};
use tree_sitter::Node;

use crate::config::{DataFlowConfig, ExtractionConfig};
use crate::error::{FlowError, Result};
use crate::graph::types::{CallTarget, Declaration, EdgeKind};
use crate::graph::CallGraph;
use crate::parser::calls::{call_shape, CallShape};
use crate::parser::extract::MAX_TREE_DEPTH;
use crate::parser::{line, node_text, normalize_path, parse_source, SourceLanguage};
use crate::pipeline::SourceFile;

static STATE_SETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^set[A-Z]").expect("static regex"));

/// Parents inspected when classifying one use.
const MAX_ANCESTORS: usize = 16;
const MAX_PATTERN_DEPTH: usize = 8;
const MAX_DETAIL_LEN: usize = 80;

const URL_HOOKS: &[&str] = &["useParams", "useSearchParams", "useRouter", "useLocation"];
const STATE_HOOKS: &[&str] = &["useState", "useReducer", "useContext", "useStore"];
const STORAGE: &[&str] = &["localStorage", "sessionStorage"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceDirection {
    Backward,
    Forward,
    #[default]
    Both,
}

impl TraceDirection {
    fn backward(self) -> bool {
        self != TraceDirection::Forward
    }

    fn forward(self) -> bool {
        self != TraceDirection::Backward
    }
}

impl FromStr for TraceDirection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "backward" => Ok(TraceDirection::Backward),
            "forward" => Ok(TraceDirection::Forward),
            "both" => Ok(TraceDirection::Both),
            other => Err(format!(
                "unknown direction `{other}` (expected backward, forward or both)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFlowQuery {
    pub identifier: String,
    /// Restricts the trace to the innermost declaration containing this line.
    pub line: Option<usize>,
    pub direction: TraceDirection,
}

impl DataFlowQuery {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            line: None,
            direction: TraceDirection::Both,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn direction(mut self, direction: TraceDirection) -> Self {
        self.direction = direction;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    UserInput,
    ApiResponse,
    Database,
    LocalStorage,
    UrlParam,
    State,
    Constant,
    Computed,
    /// Copied from another variable.
    Alias,
    Parameter,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceKind::UserInput => "user input",
            SourceKind::ApiResponse => "API response",
            SourceKind::Database => "database",
            SourceKind::LocalStorage => "browser storage",
            SourceKind::UrlParam => "URL parameter",
            SourceKind::State => "component state",
            SourceKind::Constant => "constant",
            SourceKind::Computed => "computed value",
            SourceKind::Alias => "another variable",
            SourceKind::Parameter => "parameter",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    UiDisplay,
    ApiRequest,
    Database,
    LocalStorage,
    StateUpdate,
    Log,
    Return,
    Argument,
    /// Feeds the initializer of another variable.
    Derived,
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DestinationKind::UiDisplay => "screen",
            DestinationKind::ApiRequest => "API request",
            DestinationKind::Database => "database",
            DestinationKind::LocalStorage => "browser storage",
            DestinationKind::StateUpdate => "state update",
            DestinationKind::Log => "log",
            DestinationKind::Return => "return value",
            DestinationKind::Argument => "function argument",
            DestinationKind::Derived => "another variable",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub kind: SourceKind,
    pub line: usize,
    /// Source text of the value, shortened.
    pub detail: String,
    /// Innermost declaration containing the line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration_id: Option<String>,
    /// Callers passing a parameter, or the function computing the value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDestination {
    pub kind: DestinationKind,
    pub line: usize,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration_id: Option<String>,
    /// Resolved function receiving the value as an argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callee_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFlowTrace {
    pub file: String,
    pub identifier: String,
    /// Declaration the trace was restricted to by the query line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
    /// Sorted by line.
    pub sources: Vec<DataSource>,
    /// Sorted by line.
    pub destinations: Vec<DataDestination>,
    /// `max_findings` or the nesting limit cut the trace short.
    pub truncated: bool,
}

impl DataFlowTrace {
    /// One sentence: where the value comes from and where it goes.
    pub fn summary(&self) -> String {
        let from: Vec<String> = self
            .sources
            .iter()
            .map(|s| format!("{} (line {})", s.kind, s.line))
            .collect();
        let to: Vec<String> = self
            .destinations
            .iter()
            .map(|d| format!("{} (line {})", d.kind, d.line))
            .collect();
        let name = &self.identifier;
        match (from.is_empty(), to.is_empty()) {
            (true, true) => format!("`{name}` has no traced sources or destinations"),
            (false, true) => format!("`{name}` comes from {}", from.join(", ")),
            (true, false) => format!("`{name}` goes to {}", to.join(", ")),
            (false, false) => format!(
                "`{name}` comes from {} and goes to {}",
                from.join(", "),
                to.join(", ")
            ),
        }
    }
}

/// Trace `query.identifier` through `source`.
///
/// `graph` should come from the same project; it supplies the declaration
/// spans and the call edges used for linking.
pub fn trace_data_flow(
    graph: &CallGraph,
    source: &SourceFile,
    query: &DataFlowQuery,
    extraction: &ExtractionConfig,
    config: &DataFlowConfig,
) -> Result<DataFlowTrace> {
    let file = normalize_path(&source.path);
    let language = SourceLanguage::from_path(Path::new(&file))
        .ok_or_else(|| FlowError::UnsupportedLanguage(file.clone().into()))?;
    let tree = parse_source(&file, &source.content, language)?;

    let declarations: Vec<&Declaration> = graph
        .declarations()
        .into_iter()
        .filter(|d| d.file_path == file && d.kind.is_callable())
        .collect();
    let scope = query.line.and_then(|l| innermost(&declarations, l));
    let range = scope.map_or((1, usize::MAX), |d| (d.span.start_line, d.span.end_line));

    let mut tracer = Tracer {
        graph,
        source: source.content.as_bytes(),
        identifier: &query.identifier,
        direction: query.direction,
        extraction,
        declarations,
        max_findings: config.max_findings,
        sources: Vec::new(),
        destinations: Vec::new(),
        seen: HashSet::new(),
        occurrences: 0,
        truncated: false,
    };
    tracer.walk(tree.root_node(), range);

    if tracer.occurrences == 0 {
        return Err(FlowError::NotFound(format!("{} in {file}", query.identifier)));
    }
    if tracer.truncated {
        warn!(file = %file, identifier = %query.identifier, "data-flow trace truncated");
    }

    let Tracer {
        mut sources,
        mut destinations,
        truncated,
        ..
    } = tracer;
    sources.sort_by_key(|s| s.line);
    destinations.sort_by_key(|d| d.line);
    debug!(
        file = %file,
        identifier = %query.identifier,
        sources = sources.len(),
        destinations = destinations.len(),
        "data flow traced"
    );
    Ok(DataFlowTrace {
        file,
        identifier: query.identifier.clone(),
        scope_id: scope.map(|d| d.id.clone()),
        sources,
        destinations,
        truncated,
    })
}

fn innermost<'g>(declarations: &[&'g Declaration], line: usize) -> Option<&'g Declaration> {
    declarations
        .iter()
        .filter(|d| d.span.start_line <= line && line <= d.span.end_line)
        .min_by_key(|d| d.span.end_line - d.span.start_line)
        .copied()
}

// ─── Walk ───────────────────────────────────────────────────────────

struct Tracer<'a> {
    graph: &'a CallGraph,
    source: &'a [u8],
    identifier: &'a str,
    direction: TraceDirection,
    extraction: &'a ExtractionConfig,
    declarations: Vec<&'a Declaration>,
    max_findings: usize,
    sources: Vec<DataSource>,
    destinations: Vec<DataDestination>,
    seen: HashSet<(String, usize)>,
    occurrences: usize,
    truncated: bool,
}

impl<'a> Tracer<'a> {
    fn walk(&mut self, root: Node<'_>, (first, last): (usize, usize)) {
        let mut stack = vec![(root, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if depth >= MAX_TREE_DEPTH {
                self.truncated = true;
                continue;
            }
            if node.end_position().row + 1 < first || line(node) > last {
                continue;
            }
            if self.findings() >= self.max_findings {
                self.truncated = true;
                return;
            }
            self.visit(node);

            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
            stack.extend(children.into_iter().rev().map(|c| (c, depth + 1)));
        }
    }

    fn findings(&self) -> usize {
        self.sources.len() + self.destinations.len()
    }

    fn visit(&mut self, node: Node<'_>) {
        match node.kind() {
            "identifier" | "shorthand_property_identifier" | "shorthand_property_identifier_pattern"
                if self.is_target(node) =>
            {
                self.occurrences += 1;
                if self.direction.forward() && !is_binding_site(node) {
                    self.destination(node);
                }
            }
            "variable_declarator" if self.direction.backward() => {
                let bound = node
                    .child_by_field_name("name")
                    .is_some_and(|name| self.binds(name, 0));
                if let (true, Some(value)) = (bound, node.child_by_field_name("value")) {
                    self.source(value, None);
                }
            }
            "assignment_expression" | "augmented_assignment_expression"
                if self.direction.backward() =>
            {
                let assigned = node
                    .child_by_field_name("left")
                    .is_some_and(|left| self.is_target(left));
                if let (true, Some(right)) = (assigned, node.child_by_field_name("right")) {
                    let forced = (node.kind() == "augmented_assignment_expression")
                        .then_some(SourceKind::Computed);
                    self.source(right, forced);
                }
            }
            "formal_parameters" if self.direction.backward() => {
                let mut cursor = node.walk();
                let params: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
                for param in params {
                    if self.binds(param, 0) {
                        self.parameter(param);
                    }
                }
            }
            "arrow_function" if self.direction.backward() => {
                if let Some(param) = node.child_by_field_name("parameter") {
                    if self.is_target(param) {
                        self.parameter(param);
                    }
                }
            }
            _ => {}
        }
    }

    fn is_target(&self, node: Node<'_>) -> bool {
        matches!(
            node.kind(),
            "identifier" | "shorthand_property_identifier" | "shorthand_property_identifier_pattern"
        ) && node.utf8_text(self.source).is_ok_and(|t| t == self.identifier)
    }

    /// Whether the pattern (or parameter) binds the identifier.
    fn binds(&self, pattern: Node<'_>, depth: usize) -> bool {
        if depth >= MAX_PATTERN_DEPTH {
            return false;
        }
        match pattern.kind() {
            "identifier" | "shorthand_property_identifier_pattern" => self.is_target(pattern),
            "required_parameter" | "optional_parameter" => pattern
                .child_by_field_name("pattern")
                .is_some_and(|p| self.binds(p, depth + 1)),
            "assignment_pattern" | "object_assignment_pattern" => pattern
                .child_by_field_name("left")
                .is_some_and(|p| self.binds(p, depth + 1)),
            "pair_pattern" => pattern
                .child_by_field_name("value")
                .is_some_and(|p| self.binds(p, depth + 1)),
            "object_pattern" | "array_pattern" | "rest_pattern" => {
                let mut cursor = pattern.walk();
                let found = pattern
                    .named_children(&mut cursor)
                    .any(|child| self.binds(child, depth + 1));
                found
            }
            _ => false,
        }
    }

    // ─── Backward ───────────────────────────────────────────────────

    fn source(&mut self, value: Node<'_>, forced: Option<SourceKind>) {
        let value = unwrap_expression(value);
        let line = line(value);
        let (kind, callee) = match forced {
            Some(kind) => (kind, None),
            None => self.classify_source(value),
        };
        let declaration = innermost(&self.declarations, line);
        let linked_ids = callee
            .and_then(|name| self.callee_at(declaration, &name, line))
            .into_iter()
            .collect();
        self.push_source(DataSource {
            kind,
            line,
            detail: detail(value, self.source),
            declaration_id: declaration.map(|d| d.id.clone()),
            linked_ids,
        });
    }

    fn parameter(&mut self, param: Node<'_>) {
        let line = line(param);
        let declaration = innermost(&self.declarations, line);
        let linked_ids = declaration
            .map(|d| {
                self.graph
                    .caller_edges(&d.id)
                    .into_iter()
                    .filter(|(_, edge)| edge.kind == EdgeKind::Calls)
                    .map(|(caller, _)| caller.id.clone())
                    .collect()
            })
            .unwrap_or_default();
        self.push_source(DataSource {
            kind: SourceKind::Parameter,
            line,
            detail: detail(param, self.source),
            declaration_id: declaration.map(|d| d.id.clone()),
            linked_ids,
        });
    }

    /// Kind of the value and, for plain calls, the callee name.
    fn classify_source(&self, value: Node<'_>) -> (SourceKind, Option<String>) {
        match value.kind() {
            "call_expression" => match call_shape(value, self.source, self.extraction) {
                CallShape::Plain(CallTarget::Http { .. }) => (SourceKind::ApiResponse, None),
                CallShape::Plain(CallTarget::Database { .. })
                | CallShape::Chain(CallTarget::Database { .. }, _) => (SourceKind::Database, None),
                CallShape::Chain(..) => (SourceKind::Computed, None),
                CallShape::Plain(CallTarget::Named { name, receiver }) => {
                    let receiver = receiver.as_deref();
                    if STATE_HOOKS.contains(&name.as_str()) {
                        (SourceKind::State, None)
                    } else if URL_HOOKS.contains(&name.as_str()) {
                        (SourceKind::UrlParam, None)
                    } else if receiver.is_some_and(|r| STORAGE.contains(&r)) {
                        (SourceKind::LocalStorage, None)
                    } else if name == "json" && receiver.is_some() {
                        (SourceKind::ApiResponse, None)
                    } else {
                        (SourceKind::Computed, Some(name))
                    }
                }
                CallShape::Unrecorded => (SourceKind::Computed, None),
            },
            "member_expression" | "subscript_expression" => {
                let text = node_text(value, self.source);
                if text.contains("target.value") || text.contains("target.checked") {
                    (SourceKind::UserInput, None)
                } else if text.contains("searchParams") || text.contains("query") || text.starts_with("params") {
                    (SourceKind::UrlParam, None)
                } else if text.starts_with("props.") {
                    (SourceKind::Parameter, None)
                } else {
                    (SourceKind::Computed, None)
                }
            }
            "string" | "number" | "true" | "false" | "null" | "undefined" | "regex" => {
                (SourceKind::Constant, None)
            }
            "template_string" => {
                let mut cursor = value.walk();
                let substituted = value
                    .named_children(&mut cursor)
                    .any(|c| c.kind() == "template_substitution");
                if substituted {
                    (SourceKind::Computed, None)
                } else {
                    (SourceKind::Constant, None)
                }
            }
            "identifier" => (SourceKind::Alias, None),
            _ => (SourceKind::Computed, None),
        }
    }

    fn push_source(&mut self, source: DataSource) {
        if self.seen.insert((format!("source:{:?}", source.kind), source.line)) {
            self.sources.push(source);
        }
    }

    // ─── Forward ────────────────────────────────────────────────────

    fn destination(&mut self, usage: Node<'_>) {
        let Some((kind, site, callee)) = self.classify_destination(usage) else {
            return;
        };
        let line = line(usage);
        let declaration = innermost(&self.declarations, line);
        let callee_id = callee.and_then(|name| self.callee_at(declaration, &name, line));
        let destination = DataDestination {
            kind,
            line,
            detail: detail(site, self.source),
            declaration_id: declaration.map(|d| d.id.clone()),
            callee_id,
        };
        if self.seen.insert((format!("dest:{kind:?}"), line)) {
            self.destinations.push(destination);
        }
    }

    /// Walks up from a use to the nearest sink. Sinks outrank plain calls,
    /// so `fetch(url, { body: JSON.stringify({ text }) })` is a request.
    fn classify_destination<'t>(
        &self,
        usage: Node<'t>,
    ) -> Option<(DestinationKind, Node<'t>, Option<String>)> {
        let mut argument: Option<(Node<'t>, String)> = None;
        let mut current = usage;
        for _ in 0..MAX_ANCESTORS {
            let parent = current.parent()?;
            match parent.kind() {
                "jsx_expression" => return Some((DestinationKind::UiDisplay, parent, None)),
                "call_expression"
                    if parent.child_by_field_name("arguments") == Some(current) =>
                {
                    match call_shape(parent, self.source, self.extraction) {
                        CallShape::Plain(CallTarget::Http { .. }) => {
                            return Some((DestinationKind::ApiRequest, parent, None))
                        }
                        CallShape::Plain(CallTarget::Database { .. })
                        | CallShape::Chain(CallTarget::Database { .. }, _) => {
                            return Some((DestinationKind::Database, parent, None))
                        }
                        CallShape::Plain(CallTarget::Named { name, receiver }) => {
                            let receiver = receiver.as_deref();
                            if receiver.is_some_and(|r| STORAGE.contains(&r)) && name == "setItem" {
                                return Some((DestinationKind::LocalStorage, parent, None));
                            }
                            if receiver == Some("console") {
                                return Some((DestinationKind::Log, parent, None));
                            }
                            if receiver.is_none() && STATE_SETTER.is_match(&name) {
                                return Some((DestinationKind::StateUpdate, parent, None));
                            }
                            if argument.is_none() {
                                argument = Some((parent, name));
                            }
                        }
                        _ => {}
                    }
                }
                "return_statement" => {
                    return Some(match argument {
                        Some((call, name)) => (DestinationKind::Argument, call, Some(name)),
                        None => (DestinationKind::Return, parent, None),
                    });
                }
                "variable_declarator" | "assignment_expression"
                    if argument.is_none()
                        && parent.child_by_field_name("name") != Some(current)
                        && parent.child_by_field_name("left") != Some(current) =>
                {
                    return Some((DestinationKind::Derived, parent, None));
                }
                "expression_statement" | "lexical_declaration" | "variable_declaration"
                | "statement_block" | "if_statement" | "for_statement" | "while_statement"
                | "arrow_function" | "function_declaration" | "program" => break,
                _ => {}
            }
            current = parent;
        }
        argument.map(|(call, name)| (DestinationKind::Argument, call, Some(name)))
    }

    /// Graph callee named `name` called from `declaration`, preferring an
    /// edge recorded at `line`.
    fn callee_at(
        &self,
        declaration: Option<&Declaration>,
        name: &str,
        line: usize,
    ) -> Option<String> {
        let edges = self.graph.callee_edges(&declaration?.id);
        let named: Vec<_> = edges
            .iter()
            .filter(|(callee, _)| callee.name == name)
            .collect();
        named
            .iter()
            .find(|(_, edge)| edge.line == line)
            .or_else(|| named.first())
            .map(|(callee, _)| callee.id.clone())
    }
}

/// Identifiers that introduce a binding rather than read the value.
fn is_binding_site(node: Node<'_>) -> bool {
    if node.kind() == "shorthand_property_identifier_pattern" {
        return true;
    }
    let Some(parent) = node.parent() else {
        return false;
    };
    let field_is = |field: &str| parent.child_by_field_name(field) == Some(node);
    match parent.kind() {
        "variable_declarator" => field_is("name"),
        "required_parameter" | "optional_parameter" => field_is("pattern"),
        "assignment_pattern" | "object_assignment_pattern" => field_is("left"),
        "assignment_expression" | "augmented_assignment_expression" => field_is("left"),
        "pair_pattern" => field_is("value"),
        "arrow_function" => field_is("parameter"),
        "formal_parameters" | "array_pattern" | "rest_pattern" => true,
        "function_declaration" | "class_declaration" | "import_specifier" | "import_clause"
        | "namespace_import" => true,
        _ => false,
    }
}

fn unwrap_expression(mut node: Node<'_>) -> Node<'_> {
    for _ in 0..MAX_PATTERN_DEPTH {
        let inner = match node.kind() {
            "await_expression" | "parenthesized_expression" | "non_null_expression" => {
                node.named_child(0)
            }
            "as_expression" | "satisfies_expression" => node.named_child(0),
            _ => None,
        };
        match inner {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

fn detail(node: Node<'_>, source: &[u8]) -> String {
    let text = node_text(node, source);
    let first = text.lines().next().unwrap_or_default().trim();
    if first.chars().count() > MAX_DETAIL_LEN {
        let cut: String = first.chars().take(MAX_DETAIL_LEN).collect();
        format!("{cut}…")
    } else {
        first.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::pipeline::Pipeline;

    const NOTE_FORM: &str = r#"
import { useState } from 'react';
import { supabase } from '@/lib/supabase';

export function NoteForm() {
  const [text, setText] = useState('');
  const save = async () => {
    await supabase.from('notes').insert({ text });
    console.log(text);
  };
  return <input value={text} onChange={(e) => setText(e.target.value)} />;
}
"#;

    fn trace_in(files: &[SourceFile], file: usize, query: DataFlowQuery) -> Result<DataFlowTrace> {
        trace_with(files, file, query, &DataFlowConfig::default())
    }

    fn trace_with(
        files: &[SourceFile],
        file: usize,
        query: DataFlowQuery,
        config: &DataFlowConfig,
    ) -> Result<DataFlowTrace> {
        let output = Pipeline::new(AnalysisConfig::default()).unwrap().run(files);
        trace_data_flow(
            &output.graph,
            &files[file],
            &query,
            &ExtractionConfig::default(),
            config,
        )
    }

    fn kinds_of_destinations(trace: &DataFlowTrace) -> Vec<(DestinationKind, usize)> {
        trace.destinations.iter().map(|d| (d.kind, d.line)).collect()
    }

    #[test]
    fn test_state_value_sources_and_sinks() {
        let files = vec![SourceFile::new("src/components/NoteForm.tsx", NOTE_FORM)];
        let trace = trace_in(&files, 0, DataFlowQuery::new("text")).unwrap();

        let sources: Vec<(SourceKind, usize)> =
            trace.sources.iter().map(|s| (s.kind, s.line)).collect();
        assert_eq!(sources, vec![(SourceKind::State, 6)]);
        assert_eq!(
            trace.sources[0].declaration_id.as_deref(),
            Some("src/components/NoteForm.tsx:NoteForm")
        );
        assert_eq!(
            kinds_of_destinations(&trace),
            vec![
                (DestinationKind::Database, 8),
                (DestinationKind::Log, 9),
                (DestinationKind::UiDisplay, 11),
            ]
        );
        assert_eq!(
            trace.destinations[0].declaration_id.as_deref(),
            Some("src/components/NoteForm.tsx:save")
        );
        assert!(!trace.truncated);
        assert_eq!(
            trace.summary(),
            "`text` comes from component state (line 6) and goes to database (line 8), \
             log (line 9), screen (line 11)"
        );
    }

    #[test]
    fn test_direction_limits_the_trace() {
        let files = vec![SourceFile::new("src/components/NoteForm.tsx", NOTE_FORM)];
        let backward = trace_in(
            &files,
            0,
            DataFlowQuery::new("text").direction(TraceDirection::Backward),
        )
        .unwrap();
        assert_eq!(backward.sources.len(), 1);
        assert!(backward.destinations.is_empty());

        let forward = trace_in(
            &files,
            0,
            DataFlowQuery::new("text").direction(TraceDirection::Forward),
        )
        .unwrap();
        assert!(forward.sources.is_empty());
        assert_eq!(forward.destinations.len(), 3);
    }

    #[test]
    fn test_parameters_and_arguments_link_to_the_graph() {
        let files = vec![
            SourceFile::new(
                "src/login.ts",
                r#"
import { validateUser } from './auth';

export function handleLogin(user: string) {
  const ok = validateUser(user);
  return ok;
}
"#,
            ),
            SourceFile::new(
                "src/auth.ts",
                "export function validateUser(user: string) { return user.length > 0; }",
            ),
            SourceFile::new(
                "src/page.ts",
                r#"
import { handleLogin } from './login';

export function submit() {
  handleLogin('bob');
}
"#,
            ),
        ];

        let user = trace_in(&files, 0, DataFlowQuery::new("user").at_line(5)).unwrap();
        assert_eq!(user.scope_id.as_deref(), Some("src/login.ts:handleLogin"));
        assert_eq!(user.sources.len(), 1);
        assert_eq!(user.sources[0].kind, SourceKind::Parameter);
        assert_eq!(user.sources[0].line, 4);
        assert_eq!(user.sources[0].linked_ids, vec!["src/page.ts:submit".to_string()]);
        assert_eq!(kinds_of_destinations(&user), vec![(DestinationKind::Argument, 5)]);
        assert_eq!(
            user.destinations[0].callee_id.as_deref(),
            Some("src/auth.ts:validateUser")
        );

        let ok = trace_in(&files, 0, DataFlowQuery::new("ok")).unwrap();
        assert_eq!(ok.sources[0].kind, SourceKind::Computed);
        assert_eq!(ok.sources[0].linked_ids, vec!["src/auth.ts:validateUser".to_string()]);
        assert_eq!(kinds_of_destinations(&ok), vec![(DestinationKind::Return, 6)]);
    }

    #[test]
    fn test_query_line_selects_the_declaration() {
        let files = vec![SourceFile::new(
            "src/data.ts",
            r#"
export async function loadUsers() {
  const data = await fetch('/api/users');
  return data;
}

export function readDraft() {
  const data = localStorage.getItem('draft');
  return data;
}
"#,
        )];
        let all = trace_in(
            &files,
            0,
            DataFlowQuery::new("data").direction(TraceDirection::Backward),
        )
        .unwrap();
        let kinds: Vec<SourceKind> = all.sources.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SourceKind::ApiResponse, SourceKind::LocalStorage]);
        assert_eq!(all.scope_id, None);

        let draft = trace_in(&files, 0, DataFlowQuery::new("data").at_line(8)).unwrap();
        assert_eq!(draft.scope_id.as_deref(), Some("src/data.ts:readDraft"));
        assert_eq!(draft.sources.len(), 1);
        assert_eq!(draft.sources[0].kind, SourceKind::LocalStorage);
        assert_eq!(kinds_of_destinations(&draft), vec![(DestinationKind::Return, 9)]);
    }

    #[test]
    fn test_findings_cap_truncates() {
        let files = vec![SourceFile::new("src/components/NoteForm.tsx", NOTE_FORM)];
        let config = DataFlowConfig { max_findings: 2 };
        let trace = trace_with(&files, 0, DataFlowQuery::new("text"), &config).unwrap();
        assert_eq!(trace.sources.len() + trace.destinations.len(), 2);
        assert!(trace.truncated);
    }

    #[test]
    fn test_unknown_identifier_and_file() {
        let files = vec![SourceFile::new("src/components/NoteForm.tsx", NOTE_FORM)];
        let err = trace_in(&files, 0, DataFlowQuery::new("missing")).unwrap_err();
        assert!(matches!(err, FlowError::NotFound(_)));

        let css = vec![SourceFile::new("styles.css", "body {}")];
        let err = trace_in(&css, 0, DataFlowQuery::new("body")).unwrap_err();
        assert!(matches!(err, FlowError::UnsupportedLanguage(_)));
    }

    #[test]
    fn test_direction_from_str() {
        assert_eq!("forward".parse::<TraceDirection>(), Ok(TraceDirection::Forward));
        assert!("sideways".parse::<TraceDirection>().is_err());
    }
}
