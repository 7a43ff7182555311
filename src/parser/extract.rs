//! Declaration, import and call-site extraction from a TypeScript or
//! JavaScript syntax tree.
//!
//! The walk is a single pass over the tree. Each node is sorted into a
//! [`NodeClass`] and handled by exactly one arm, carrying a [`Scope`] that
//! knows which declaration owns the calls found below it. `ERROR` and missing
//! nodes are skipped with their subtrees, so a file with a syntax error still
//! yields its well-formed declarations.

use std::collections::{HashMap, HashSet};
use tree_sitter::{Node, Tree};

use super::calls::{call_shape, unquote, CallShape};
use super::{end_line, line, node_text};
use crate::config::ExtractionConfig;
use crate::graph::types::{
    CallFlags, CallSite, CallTarget, CallVia, Declaration, DeclarationKind, ErrorHandling,
    ImportBinding, ImportInfo, SourceSpan,
};

/// Nesting deeper than this is not walked. Hitting it sets
/// [`Extraction::depth_limited`].
pub const MAX_TREE_DEPTH: usize = 400;

/// Links followed when looking for a `.catch(...)` chained onto a call.
const MAX_CHAIN_LINKS: usize = 32;
const MAX_SIGNATURE_LEN: usize = 100;

/// Calls whose function argument is the real declaration body.
const FUNCTION_WRAPPERS: &[&str] = &[
    "memo",
    "forwardRef",
    "useCallback",
    "observer",
    "React.memo",
    "React.forwardRef",
    "React.useCallback",
];

/// Raw output of one file's walk, before classification.
#[derive(Debug, Default)]
pub struct Extraction {
    pub declarations: Vec<Declaration>,
    pub imports: Vec<ImportInfo>,
    pub calls: Vec<CallSite>,
    pub has_jsx: bool,
    /// Some subtree was deeper than [`MAX_TREE_DEPTH`] and was not walked.
    pub depth_limited: bool,
}

enum NodeClass {
    Import,
    Export,
    Function,
    Class,
    Method,
    Field,
    Variables,
    TypeDecl,
    Call,
    Jsx,
    JsxAttribute,
    Branch,
    Try,
    Throw,
    Skip,
    Other,
}

impl NodeClass {
    fn of(node: &Node<'_>) -> Self {
        if node.is_error() || node.is_missing() {
            return NodeClass::Skip;
        }
        match node.kind() {
            "import_statement" => NodeClass::Import,
            "export_statement" => NodeClass::Export,
            "function_declaration" | "generator_function_declaration" => NodeClass::Function,
            "class_declaration" | "abstract_class_declaration" => NodeClass::Class,
            "method_definition" => NodeClass::Method,
            "public_field_definition" | "field_definition" => NodeClass::Field,
            "lexical_declaration" | "variable_declaration" => NodeClass::Variables,
            "interface_declaration" | "type_alias_declaration" | "enum_declaration" => {
                NodeClass::TypeDecl
            }
            "call_expression" => NodeClass::Call,
            "jsx_element" | "jsx_self_closing_element" => NodeClass::Jsx,
            "jsx_attribute" => NodeClass::JsxAttribute,
            "if_statement" | "ternary_expression" | "switch_statement" => NodeClass::Branch,
            "try_statement" => NodeClass::Try,
            "throw_statement" => NodeClass::Throw,
            "comment" => NodeClass::Skip,
            _ => NodeClass::Other,
        }
    }
}

/// Walk state handed from parent to child.
#[derive(Debug, Clone, Copy, Default)]
struct Scope {
    /// Index of the declaration that owns calls at this point.
    enclosing: Option<usize>,
    /// Index of the class whose body we are in.
    class: Option<usize>,
    exported: bool,
    default_export: bool,
    conditional: bool,
    /// Inside a `try` body whose statement has a `catch` clause.
    guarded: bool,
    depth: usize,
}

impl Scope {
    /// Same owner, export flags cleared.
    fn plain(self) -> Self {
        Scope {
            exported: false,
            default_export: false,
            ..self
        }
    }

    /// Entering the body of declaration `idx`. Only direct members of a
    /// class body belong to the class, so the class is cleared here.
    fn inside(self, idx: usize) -> Self {
        Scope {
            enclosing: Some(idx),
            class: None,
            conditional: false,
            guarded: false,
            ..self.plain()
        }
    }
}

pub struct Extractor<'a> {
    path: &'a str,
    source: &'a [u8],
    config: &'a ExtractionConfig,
    out: Extraction,
    ids: HashSet<String>,
    exported_names: HashSet<String>,
}

impl<'a> Extractor<'a> {
    pub fn new(path: &'a str, source: &'a str, config: &'a ExtractionConfig) -> Self {
        Self {
            path,
            source: source.as_bytes(),
            config,
            out: Extraction::default(),
            ids: HashSet::new(),
            exported_names: HashSet::new(),
        }
    }

    pub fn extract(mut self, tree: &Tree) -> Extraction {
        self.children(tree.root_node(), Scope::default());
        self.finish()
    }

    fn visit(&mut self, node: Node<'_>, scope: Scope) {
        if scope.depth >= MAX_TREE_DEPTH {
            self.out.depth_limited = true;
            return;
        }
        let scope = Scope {
            depth: scope.depth + 1,
            ..scope
        };
        match NodeClass::of(&node) {
            NodeClass::Import => self.import(node),
            NodeClass::Export => self.export(node, scope),
            NodeClass::Function => self.function(node, scope),
            NodeClass::Class => self.class(node, scope),
            NodeClass::Method => self.method(node, scope),
            NodeClass::Field => self.field(node, scope),
            NodeClass::Variables => self.variables(node, scope),
            NodeClass::TypeDecl => self.type_decl(node, scope),
            NodeClass::Call => self.call(node, scope),
            NodeClass::Jsx => self.jsx(node, scope),
            NodeClass::JsxAttribute => self.jsx_attribute(node, scope),
            NodeClass::Branch => self.children(
                node,
                Scope {
                    conditional: true,
                    ..scope.plain()
                },
            ),
            NodeClass::Try => self.try_statement(node, scope),
            NodeClass::Throw => {
                if !scope.guarded {
                    self.mark_errors(scope, |e| e.throws = true);
                }
                self.children(node, scope.plain());
            }
            NodeClass::Skip => {}
            NodeClass::Other => self.children(node, scope.plain()),
        }
    }

    fn children(&mut self, node: Node<'_>, scope: Scope) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child, scope);
        }
    }

    fn text(&self, node: Node<'_>) -> String {
        node_text(node, self.source)
    }

    // ─── Imports & Exports ──────────────────────────────────────

    fn import(&mut self, node: Node<'_>) {
        let Some(source) = node.child_by_field_name("source") else {
            return;
        };
        let mut info = ImportInfo {
            source: unquote(&self.text(source)),
            bindings: Vec::new(),
            type_only: has_token(node, "type"),
            line: line(node),
        };
        let mut cursor = node.walk();
        for clause in node.named_children(&mut cursor) {
            if clause.kind() == "import_clause" {
                self.import_clause(clause, &mut info.bindings);
            }
        }
        self.out.imports.push(info);
    }

    fn import_clause(&self, clause: Node<'_>, bindings: &mut Vec<ImportBinding>) {
        let mut cursor = clause.walk();
        for part in clause.named_children(&mut cursor) {
            match part.kind() {
                "identifier" => bindings.push(ImportBinding {
                    local: self.text(part),
                    imported: "default".to_string(),
                    namespace: false,
                }),
                "namespace_import" => {
                    let mut inner = part.walk();
                    let local = part
                        .named_children(&mut inner)
                        .find(|n| n.kind() == "identifier");
                    if let Some(local) = local {
                        bindings.push(ImportBinding {
                            local: self.text(local),
                            imported: "*".to_string(),
                            namespace: true,
                        });
                    }
                }
                "named_imports" => {
                    let mut inner = part.walk();
                    for spec in part.named_children(&mut inner) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        let Some(name) = spec.child_by_field_name("name") else {
                            continue;
                        };
                        let imported = unquote(&self.text(name));
                        let local = spec
                            .child_by_field_name("alias")
                            .map(|a| self.text(a))
                            .unwrap_or_else(|| imported.clone());
                        bindings.push(ImportBinding {
                            local,
                            imported,
                            namespace: false,
                        });
                    }
                }
                _ => {}
            }
        }
    }

    fn export(&mut self, node: Node<'_>, scope: Scope) {
        // Re-exports (`export { x } from './y'`) declare nothing here.
        if node.child_by_field_name("source").is_some() {
            return;
        }
        let exported = Scope {
            exported: true,
            default_export: has_token(node, "default"),
            ..scope
        };

        if let Some(declaration) = node.child_by_field_name("declaration") {
            self.visit(declaration, exported);
            return;
        }

        if let Some(value) = node.child_by_field_name("value") {
            let value = unwrap_expression(value);
            if value.kind() == "identifier" {
                self.exported_names.insert(self.text(value));
            } else if let Some(callable) = function_value(value, self.source) {
                let name = callable
                    .child_by_field_name("name")
                    .map(|n| self.text(n))
                    .unwrap_or_else(|| "default".to_string());
                self.callable(node, callable, &name, callable_kind(callable), exported);
            } else {
                self.visit(value, scope.plain());
            }
            return;
        }

        let mut cursor = node.walk();
        for clause in node.named_children(&mut cursor) {
            if clause.kind() != "export_clause" {
                continue;
            }
            let mut inner = clause.walk();
            for spec in clause.named_children(&mut inner) {
                if let Some(name) = spec.child_by_field_name("name") {
                    self.exported_names.insert(self.text(name));
                }
            }
        }
    }

    // ─── Declarations ───────────────────────────────────────────

    fn function(&mut self, node: Node<'_>, scope: Scope) {
        let name = match node.child_by_field_name("name") {
            Some(name) => self.text(name),
            None if scope.default_export => "default".to_string(),
            None => return self.children(node, scope.plain()),
        };
        self.callable(node, node, &name, DeclarationKind::Function, scope);
    }

    fn class(&mut self, node: Node<'_>, scope: Scope) {
        let name = match node.child_by_field_name("name") {
            Some(name) => self.text(name),
            None if scope.default_export => "default".to_string(),
            None => return self.children(node, scope.plain()),
        };
        let idx = self.declare(node, None, &name, DeclarationKind::Class, scope);
        let exported = self.out.declarations[idx].exported;
        if let Some(body) = node.child_by_field_name("body") {
            let members = Scope {
                class: Some(idx),
                exported,
                default_export: false,
                conditional: false,
                ..scope
            };
            self.children(body, members);
        }
    }

    fn method(&mut self, node: Node<'_>, scope: Scope) {
        let in_class = node.parent().is_some_and(|p| p.kind() == "class_body");
        match node.child_by_field_name("name") {
            Some(name) if in_class => {
                let name = self.text(name);
                self.callable(node, node, &name, DeclarationKind::Method, scope);
            }
            // Object literal methods belong to whoever builds the object.
            _ => self.children(node, scope.plain()),
        }
    }

    fn field(&mut self, node: Node<'_>, scope: Scope) {
        let name = node
            .child_by_field_name("name")
            .or_else(|| node.child_by_field_name("property"));
        let callable = node
            .child_by_field_name("value")
            .and_then(|v| function_value(v, self.source));
        match (name, callable) {
            (Some(name), Some(callable)) if scope.class.is_some() => {
                let name = self.text(name);
                self.callable(node, callable, &name, DeclarationKind::Method, scope);
            }
            _ => self.children(node, scope.plain()),
        }
    }

    fn variables(&mut self, node: Node<'_>, scope: Scope) {
        let mut cursor = node.walk();
        for declarator in node.named_children(&mut cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(value) = declarator.child_by_field_name("value") else {
                continue;
            };
            let name = declarator
                .child_by_field_name("name")
                .filter(|n| n.kind() == "identifier");
            match (name, function_value(value, self.source)) {
                (Some(name), Some(callable)) => {
                    let name = self.text(name);
                    self.callable(declarator, callable, &name, callable_kind(callable), scope);
                }
                _ => self.visit(value, scope.plain()),
            }
        }
    }

    fn type_decl(&mut self, node: Node<'_>, scope: Scope) {
        if !scope.exported || scope.enclosing.is_some() {
            return;
        }
        if let Some(name) = node.child_by_field_name("name") {
            let name = self.text(name);
            self.declare(node, None, &name, DeclarationKind::Type, scope);
        }
    }

    /// Declare a function-like value and walk its body as the new owner.
    fn callable(
        &mut self,
        span: Node<'_>,
        callable: Node<'_>,
        name: &str,
        kind: DeclarationKind,
        scope: Scope,
    ) {
        let idx = self.declare(span, Some(callable), name, kind, scope);
        self.children(callable, scope.inside(idx));
    }

    fn declare(
        &mut self,
        span: Node<'_>,
        callable: Option<Node<'_>>,
        name: &str,
        kind: DeclarationKind,
        scope: Scope,
    ) -> usize {
        let container = scope
            .class
            .map(|i| self.out.declarations[i].name.clone());
        let mut decl = Declaration::new(self.path, name, kind);
        if let Some(class) = &container {
            decl.id = format!("{}:{class}.{name}", self.path);
        }
        if self.ids.contains(&decl.id) {
            let base = format!("{}@{}", decl.id, line(span));
            let mut candidate = base.clone();
            let mut n = 2;
            while self.ids.contains(&candidate) {
                candidate = format!("{base}#{n}");
                n += 1;
            }
            decl.id = candidate;
        }
        self.ids.insert(decl.id.clone());

        decl.exported = scope.exported && scope.enclosing.is_none();
        decl.span = SourceSpan::new(line(span), end_line(span));
        decl.container = container;
        decl.enclosing = scope
            .enclosing
            .map(|i| self.out.declarations[i].id.clone());
        if let Some(callable) = callable {
            decl.is_async = has_token(callable, "async");
            decl.signature = self.signature(callable, decl.is_async);
            decl.returns_ui = callable
                .child_by_field_name("body")
                .is_some_and(|body| contains_jsx(body, 0));
        }

        self.out.declarations.push(decl);
        self.out.declarations.len() - 1
    }

    fn signature(&self, callable: Node<'_>, is_async: bool) -> String {
        let params = callable
            .child_by_field_name("parameters")
            .or_else(|| callable.child_by_field_name("parameter"))
            .map(|p| self.text(p))
            .unwrap_or_else(|| "()".to_string());
        let params = if params.starts_with('(') {
            params
        } else {
            format!("({params})")
        };
        let returns = callable
            .child_by_field_name("return_type")
            .map(|r| self.text(r))
            .unwrap_or_default();
        let prefix = if is_async { "async " } else { "" };
        let collapsed = format!("{prefix}{params}{returns}")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        truncate(&collapsed, MAX_SIGNATURE_LEN)
    }

    // ─── Error Handling ─────────────────────────────────────────

    fn try_statement(&mut self, node: Node<'_>, scope: Scope) {
        let handler = node.child_by_field_name("handler");
        if handler.is_some() {
            self.mark_errors(scope, |e| e.try_catch = true);
        }
        if let Some(body) = node.child_by_field_name("body") {
            let body_scope = Scope {
                guarded: scope.guarded || handler.is_some(),
                ..scope.plain()
            };
            self.children(body, body_scope);
        }
        for part in [handler, node.child_by_field_name("finalizer")]
            .into_iter()
            .flatten()
        {
            self.children(part, scope.plain());
        }
    }

    fn mark_errors(&mut self, scope: Scope, mark: impl FnOnce(&mut ErrorHandling)) {
        if let Some(idx) = scope.enclosing {
            mark(&mut self.out.declarations[idx].errors);
        }
    }

    // ─── Calls ──────────────────────────────────────────────────

    fn call(&mut self, node: Node<'_>, scope: Scope) {
        let Some(caller) = scope.enclosing else {
            return self.children(node, scope.plain());
        };
        if self.invokes_member(node, "catch") {
            self.mark_errors(scope, |e| e.promise_catch = true);
        }
        match call_shape(node, self.source, self.config) {
            CallShape::Plain(target) => {
                self.record(caller, target, node, CallVia::Direct, scope);
                self.children(node, scope.plain());
            }
            CallShape::Chain(target, argument_lists) => {
                self.record(caller, target, node, CallVia::Direct, scope);
                for args in argument_lists {
                    self.children(args, scope.plain());
                }
            }
            CallShape::Unrecorded => self.children(node, scope.plain()),
        }
    }

    fn jsx(&mut self, node: Node<'_>, scope: Scope) {
        self.out.has_jsx = true;
        if let Some(caller) = scope.enclosing {
            let tag = if node.kind() == "jsx_element" {
                let mut cursor = node.walk();
                let open = node
                    .named_children(&mut cursor)
                    .find(|n| n.kind() == "jsx_opening_element");
                open
            } else {
                Some(node)
            };
            let target = tag
                .and_then(|t| t.child_by_field_name("name"))
                .and_then(|name| component_target(&self.text(name)));
            if let Some(target) = target {
                self.record(caller, target, node, CallVia::Render, scope);
            }
        }
        self.children(node, scope.plain());
    }

    fn jsx_attribute(&mut self, node: Node<'_>, scope: Scope) {
        if let Some(caller) = scope.enclosing {
            let is_handler = node
                .named_child(0)
                .is_some_and(|attr| is_handler_attribute(&self.text(attr)));
            let target = node
                .named_child(1)
                .filter(|v| is_handler && v.kind() == "jsx_expression")
                .and_then(|v| v.named_child(0))
                .and_then(|expr| self.handler_target(expr));
            if let Some(target) = target {
                self.record(caller, target, node, CallVia::Handler, scope);
            }
        }
        self.children(node, scope.plain());
    }

    fn handler_target(&self, expr: Node<'_>) -> Option<CallTarget> {
        match expr.kind() {
            "identifier" => Some(CallTarget::named(&self.text(expr))),
            "member_expression" => {
                let object = expr.child_by_field_name("object")?;
                let property = expr.child_by_field_name("property")?;
                (object.kind() == "this")
                    .then(|| CallTarget::member("this", &self.text(property)))
            }
            _ => None,
        }
    }

    fn record(
        &mut self,
        caller: usize,
        target: CallTarget,
        node: Node<'_>,
        via: CallVia,
        scope: Scope,
    ) {
        let mut site = CallSite::new(&self.out.declarations[caller].id, target, line(node));
        site.via = via;
        site.flags = CallFlags {
            awaited: node
                .parent()
                .is_some_and(|p| p.kind() == "await_expression"),
            conditional: scope.conditional,
            guarded: scope.guarded || self.has_chained_catch(node),
        };
        self.out.calls.push(site);
    }

    /// `call` is `<object>.<method>(...)`.
    fn invokes_member(&self, call: Node<'_>, method: &str) -> bool {
        call.child_by_field_name("function")
            .filter(|f| f.kind() == "member_expression")
            .and_then(|f| f.child_by_field_name("property"))
            .is_some_and(|p| self.text(p) == method)
    }

    /// `call(...).then(...).catch(...)`: a later link of the chain that
    /// starts at `call` is a `.catch`.
    fn has_chained_catch(&self, call: Node<'_>) -> bool {
        let mut current = call;
        for _ in 0..MAX_CHAIN_LINKS {
            let Some(member) = current
                .parent()
                .filter(|p| p.kind() == "member_expression")
            else {
                return false;
            };
            let Some(next) = member
                .parent()
                .filter(|p| p.kind() == "call_expression")
            else {
                return false;
            };
            if self.invokes_member(next, "catch") {
                return true;
            }
            current = next;
        }
        false
    }

    // ─── Post-processing ────────────────────────────────────────

    fn finish(mut self) -> Extraction {
        for decl in &mut self.out.declarations {
            if decl.is_top_level() && self.exported_names.contains(&decl.name) {
                decl.exported = true;
            }
        }
        // Methods of a class exported through `export { Service }`.
        let exported_classes: HashSet<String> = self
            .out
            .declarations
            .iter()
            .filter(|d| d.kind == DeclarationKind::Class && d.exported)
            .map(|d| d.name.clone())
            .collect();
        for decl in &mut self.out.declarations {
            if decl.enclosing.is_none()
                && decl
                    .container
                    .as_ref()
                    .is_some_and(|c| exported_classes.contains(c))
            {
                decl.exported = true;
            }
        }

        let modules: HashMap<&str, &str> = self
            .out
            .imports
            .iter()
            .filter(|i| !i.type_only)
            .flat_map(|i| {
                i.bindings
                    .iter()
                    .map(move |b| (b.local.as_str(), i.source.as_str()))
            })
            .collect();
        let resolved: Vec<Option<String>> = self
            .out
            .calls
            .iter()
            .map(|site| {
                let key = match &site.target {
                    CallTarget::Named {
                        receiver: Some(receiver),
                        ..
                    } => receiver.split('.').next().unwrap_or(receiver),
                    CallTarget::Named { name, .. } => name.as_str(),
                    CallTarget::Database { client, .. } => client.as_str(),
                    CallTarget::Http { .. } => return None,
                };
                modules.get(key).map(|m| m.to_string())
            })
            .collect();
        for (site, module) in self.out.calls.iter_mut().zip(resolved) {
            site.callee_module = module;
        }

        self.out
    }
}

// ─── Node Helpers ───────────────────────────────────────────────

fn has_token(node: Node<'_>, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == token);
    found
}

fn unwrap_expression(mut node: Node<'_>) -> Node<'_> {
    while matches!(
        node.kind(),
        "parenthesized_expression" | "as_expression" | "satisfies_expression" | "non_null_expression"
    ) {
        match node.named_child(0) {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

/// The function node behind a bound value, seeing through wrapper calls
/// like `memo(() => ...)`.
fn function_value<'t>(value: Node<'t>, source: &[u8]) -> Option<Node<'t>> {
    let value = unwrap_expression(value);
    match value.kind() {
        "arrow_function" | "function_expression" | "function" | "generator_function" => {
            Some(value)
        }
        "call_expression" => {
            let callee = value.child_by_field_name("function")?;
            if !FUNCTION_WRAPPERS.contains(&node_text(callee, source).as_str()) {
                return None;
            }
            let args = value.child_by_field_name("arguments")?;
            let first = args.named_child(0)?;
            function_value(first, source)
        }
        _ => None,
    }
}

fn callable_kind(callable: Node<'_>) -> DeclarationKind {
    if callable.kind() == "arrow_function" {
        DeclarationKind::ArrowFn
    } else {
        DeclarationKind::Function
    }
}

fn contains_jsx(node: Node<'_>, depth: usize) -> bool {
    if depth >= MAX_TREE_DEPTH {
        return false;
    }
    if matches!(
        node.kind(),
        "jsx_element" | "jsx_self_closing_element" | "jsx_fragment"
    ) {
        return true;
    }
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .any(|child| contains_jsx(child, depth + 1));
    found
}

/// `<UserCard />` and `<Layout.Header />` render components; `<div>` does not.
fn component_target(tag: &str) -> Option<CallTarget> {
    if !tag.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
        return None;
    }
    match tag.rsplit_once('.') {
        Some((receiver, name)) => Some(CallTarget::member(receiver, name)),
        None => Some(CallTarget::named(tag)),
    }
}

fn is_handler_attribute(attr: &str) -> bool {
    attr.strip_prefix("on")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::{DbOperation, HttpMethod};
    use crate::parser::{parse_source, SourceLanguage};

    fn extract(path: &str, source: &str, language: SourceLanguage) -> Extraction {
        let tree = parse_source(path, source, language).unwrap();
        let config = ExtractionConfig::default();
        Extractor::new(path, source, &config).extract(&tree)
    }

    fn ts(path: &str, source: &str) -> Extraction {
        extract(path, source, SourceLanguage::TypeScript)
    }

    fn decl<'e>(ex: &'e Extraction, name: &str) -> &'e Declaration {
        ex.declarations
            .iter()
            .find(|d| d.name == name)
            .unwrap_or_else(|| panic!("no declaration named {name}"))
    }

    fn named_calls(ex: &Extraction) -> Vec<String> {
        ex.calls
            .iter()
            .filter(|c| !c.is_external())
            .map(|c| c.callee_name())
            .collect()
    }

    #[test]
    fn test_exported_async_function() {
        let ex = ts(
            "src/login.ts",
            r#"
import { validateUser } from './auth';

export async function handleLogin(req: Request): Promise<Response> {
  const ok = await validateUser(req);
  if (ok) {
    audit('login');
  }
  return Response.json({ ok });
}
"#,
        );
        let handle = decl(&ex, "handleLogin");
        assert_eq!(handle.id, "src/login.ts:handleLogin");
        assert_eq!(handle.kind, DeclarationKind::Function);
        assert!(handle.exported);
        assert!(handle.is_async);
        assert_eq!(handle.signature, "async (req: Request): Promise<Response>");
        assert_eq!(handle.span.start_line, 4);

        let validate = ex
            .calls
            .iter()
            .find(|c| c.callee_name() == "validateUser")
            .unwrap();
        assert_eq!(validate.caller_id, "src/login.ts:handleLogin");
        assert!(validate.flags.awaited);
        assert!(!validate.flags.conditional);
        assert_eq!(validate.callee_module.as_deref(), Some("./auth"));

        let audit = ex.calls.iter().find(|c| c.callee_name() == "audit").unwrap();
        assert!(audit.flags.conditional);
        assert!(audit.callee_module.is_none());

        assert!(named_calls(&ex).contains(&"Response.json".to_string()));
        assert_eq!(ex.imports.len(), 1);
        assert_eq!(ex.imports[0].bindings[0].local, "validateUser");
    }

    #[test]
    fn test_component_with_handlers_and_render() {
        let ex = extract(
            "src/components/LoginForm.tsx",
            r#"
import React, { useState } from 'react';
import { useAuth } from '../hooks/useAuth';
import { Button } from './Button';

export default function LoginForm() {
  const { login } = useAuth();
  const handleSubmit = async (e) => {
    await login(e);
  };
  return (
    <form onSubmit={handleSubmit}>
      <Button label="Go" />
    </form>
  );
}
"#,
            SourceLanguage::Tsx,
        );
        assert!(ex.has_jsx);

        let form = decl(&ex, "LoginForm");
        assert!(form.exported);
        assert!(form.returns_ui);
        assert_eq!(form.kind, DeclarationKind::Function);

        let submit = decl(&ex, "handleSubmit");
        assert_eq!(submit.kind, DeclarationKind::ArrowFn);
        assert!(!submit.exported);
        assert_eq!(
            submit.enclosing.as_deref(),
            Some("src/components/LoginForm.tsx:LoginForm")
        );
        assert!(submit.is_async);

        let login = ex.calls.iter().find(|c| c.callee_name() == "login").unwrap();
        assert_eq!(login.caller_id, submit.id);

        let render = ex
            .calls
            .iter()
            .find(|c| c.callee_name() == "Button")
            .unwrap();
        assert_eq!(render.via, CallVia::Render);
        assert_eq!(render.callee_module.as_deref(), Some("./Button"));

        let handler = ex
            .calls
            .iter()
            .find(|c| c.callee_name() == "handleSubmit")
            .unwrap();
        assert_eq!(handler.via, CallVia::Handler);
        assert_eq!(handler.caller_id, form.id);

        let hook = ex.calls.iter().find(|c| c.callee_name() == "useAuth").unwrap();
        assert_eq!(hook.callee_module.as_deref(), Some("../hooks/useAuth"));

        assert_eq!(ex.imports[0].bindings[0].imported, "default");
        assert_eq!(ex.imports[0].bindings[1].local, "useState");
    }

    #[test]
    fn test_database_chain_recorded_once() {
        let ex = ts(
            "src/lib/users.ts",
            r#"
import { supabase } from '@/lib/supabase';

export async function getUser(id: string) {
  const { data } = await supabase.from('users').select('*').eq('id', id);
  return data;
}
"#,
        );
        assert_eq!(ex.calls.len(), 1);
        let call = &ex.calls[0];
        assert!(call.flags.awaited);
        assert_eq!(call.callee_module.as_deref(), Some("@/lib/supabase"));
        match &call.target {
            CallTarget::Database {
                client,
                operation,
                table,
            } => {
                assert_eq!(client, "supabase");
                assert_eq!(*operation, DbOperation::Select);
                assert_eq!(table.as_deref(), Some("users"));
            }
            other => panic!("expected database call, got {other:?}"),
        }
    }

    #[test]
    fn test_http_calls() {
        let ex = ts(
            "src/api/items.ts",
            r#"
export async function submit(id: string) {
  await fetch(`/api/items/${id}`, { method: 'POST', body: '' });
  return axios.get('/api/items');
}
"#,
        );
        let http: Vec<&CallTarget> = ex
            .calls
            .iter()
            .filter(|c| c.is_external())
            .map(|c| &c.target)
            .collect();
        assert_eq!(
            http,
            vec![
                &CallTarget::Http {
                    method: HttpMethod::Post,
                    path: "/api/items/:param".to_string()
                },
                &CallTarget::Http {
                    method: HttpMethod::Get,
                    path: "/api/items".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_class_methods_and_this_calls() {
        let ex = ts(
            "src/services/auth.ts",
            r#"
export class AuthService {
  async login(user: string) {
    return this.check(user);
  }

  private check(user: string): boolean {
    return user.length > 0;
  }

  handle = () => {
    this.login('x');
  };
}
"#,
        );
        let class = decl(&ex, "AuthService");
        assert_eq!(class.kind, DeclarationKind::Class);
        assert!(class.exported);

        let login = decl(&ex, "login");
        assert_eq!(login.id, "src/services/auth.ts:AuthService.login");
        assert_eq!(login.kind, DeclarationKind::Method);
        assert_eq!(login.container.as_deref(), Some("AuthService"));
        assert!(login.exported);

        let check = decl(&ex, "check");
        assert_eq!(check.signature, "(user: string): boolean");

        let handle = decl(&ex, "handle");
        assert_eq!(handle.kind, DeclarationKind::Method);

        let this_check = ex
            .calls
            .iter()
            .find(|c| c.callee_name() == "this.check")
            .unwrap();
        assert_eq!(this_check.caller_id, login.id);
        let this_login = ex
            .calls
            .iter()
            .find(|c| c.callee_name() == "this.login")
            .unwrap();
        assert_eq!(this_login.caller_id, handle.id);
    }

    #[test]
    fn test_function_nested_in_method_is_not_a_member() {
        let ex = ts(
            "src/svc.ts",
            r#"
class Service {
  run() {
    const helper = () => 1;
    return helper();
  }
}
"#,
        );
        let run = decl(&ex, "run");
        assert_eq!(run.id, "src/svc.ts:Service.run");

        let helper = decl(&ex, "helper");
        assert_eq!(helper.id, "src/svc.ts:helper");
        assert_eq!(helper.container, None);
        assert_eq!(helper.enclosing.as_deref(), Some("src/svc.ts:Service.run"));
        assert_eq!(helper.qualified_name(), "helper");

        let call = ex.calls.iter().find(|c| c.callee_name() == "helper").unwrap();
        assert_eq!(call.caller_id, run.id);
    }

    #[test]
    fn test_error_handling_and_guarded_calls() {
        let ex = ts(
            "src/api/save.ts",
            r#"
export async function save(note: string) {
  try {
    await persist(note);
  } catch (e) {
    report(e);
  }
  audit(note);
}

export function load() {
  return fetch('/api/notes').then((r) => r.json()).catch(() => []);
}

export function check(x: number) {
  if (x < 0) {
    throw new Error('negative');
  }
}
"#,
        );
        let site = |name: &str| ex.calls.iter().find(|c| c.callee_name() == name).unwrap();
        assert!(site("persist").flags.guarded);
        assert!(site("persist").flags.awaited);
        assert!(!site("report").flags.guarded);
        assert!(!site("audit").flags.guarded);
        let fetch = ex.calls.iter().find(|c| c.is_external()).unwrap();
        assert!(fetch.flags.guarded);

        let save = decl(&ex, "save");
        assert!(save.errors.try_catch);
        assert!(!save.errors.throws);
        assert!(decl(&ex, "load").errors.promise_catch);
        assert!(decl(&ex, "load").errors.handles());

        let check = decl(&ex, "check");
        assert!(check.errors.throws);
        assert!(!check.errors.handles());
    }

    #[test]
    fn test_throw_inside_try_is_caught_locally() {
        let ex = ts(
            "src/x.ts",
            "function safe() {\n  try {\n    throw new Error('x');\n  } catch {\n    return null;\n  }\n}\n",
        );
        let safe = decl(&ex, "safe");
        assert!(safe.errors.try_catch);
        assert!(!safe.errors.throws);
    }

    #[test]
    fn test_deep_nesting_is_flagged() {
        let deep = format!(
            "export function f() {{\n  return {}g(){};\n}}\n",
            "(".repeat(MAX_TREE_DEPTH + 20),
            ")".repeat(MAX_TREE_DEPTH + 20)
        );
        let ex = ts("src/deep.ts", &deep);
        assert!(ex.depth_limited);
        assert!(ex.calls.is_empty());
        assert_eq!(decl(&ex, "f").id, "src/deep.ts:f");

        let shallow = ts("src/ok.ts", "export function f() { return (g()); }");
        assert!(!shallow.depth_limited);
        assert_eq!(shallow.calls.len(), 1);
    }

    #[test]
    fn test_export_clauses_and_types() {
        let ex = ts(
            "src/util.ts",
            r#"
function helper() {}
const util = () => helper();
export { util };
export interface User { id: string }
type Internal = string;
export default helper;
"#,
        );
        assert!(decl(&ex, "helper").exported);
        assert!(decl(&ex, "util").exported);
        assert_eq!(decl(&ex, "User").kind, DeclarationKind::Type);
        assert!(ex.declarations.iter().all(|d| d.name != "Internal"));

        let call = &ex.calls[0];
        assert_eq!(call.caller_id, "src/util.ts:util");
        assert_eq!(call.callee_name(), "helper");
    }

    #[test]
    fn test_duplicate_nested_names_get_line_suffix() {
        let ex = ts(
            "src/x.ts",
            "function a() {\n  const run = () => 1;\n}\nfunction b() {\n  const run = () => 2;\n}\n",
        );
        let runs: Vec<&str> = ex
            .declarations
            .iter()
            .filter(|d| d.name == "run")
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(runs, vec!["src/x.ts:run", "src/x.ts:run@5"]);
        assert_eq!(decl(&ex, "run").enclosing.as_deref(), Some("src/x.ts:a"));
    }

    #[test]
    fn test_memo_wrapped_component() {
        let ex = extract(
            "src/components/Card.tsx",
            "export const Card = memo(({ title }) => <div>{title}</div>);\n",
            SourceLanguage::Tsx,
        );
        let card = decl(&ex, "Card");
        assert_eq!(card.kind, DeclarationKind::ArrowFn);
        assert!(card.exported);
        assert!(card.returns_ui);
        assert!(ex.calls.is_empty());
    }

    #[test]
    fn test_top_level_calls_ignored() {
        let ex = ts("src/boot.ts", "init();\nconst x = compute();\n");
        assert!(ex.calls.is_empty());
        assert!(ex.declarations.is_empty());
    }

    #[test]
    fn test_computed_receiver_records_inner_call_only() {
        let ex = ts(
            "src/a.ts",
            "export function run() {\n  getClient().send();\n}\n",
        );
        assert_eq!(named_calls(&ex), vec!["getClient".to_string()]);
    }

    #[test]
    fn test_syntax_error_keeps_valid_declarations() {
        let ex = ts(
            "src/broken.ts",
            "export function ok() {\n  go();\n}\n\nfunction broken( {\n",
        );
        assert!(ex.declarations.iter().any(|d| d.name == "ok"));
    }

    #[test]
    fn test_signature_truncation() {
        let long = "a".repeat(150);
        let truncated = truncate(&long, MAX_SIGNATURE_LEN);
        assert_eq!(truncated.chars().count(), MAX_SIGNATURE_LEN);
        assert!(truncated.ends_with("..."));
    }
}
