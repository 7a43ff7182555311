//! Core types for the flowlens call graph.
//!
//! Defines declarations, per-file analyses, call sites, and the edge kinds
//! that connect them once the graph is assembled.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Target id used for edges that leave the analyzed file set.
pub const EXTERNAL_SENTINEL: &str = "external";

/// Placeholder path for HTTP calls whose URL is not a literal.
pub const DYNAMIC_PATH: &str = "<dynamic>";

/// The kind of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeclarationKind {
    /// A `function` declaration or function expression bound to a name.
    Function,
    /// A class method or class property holding a function.
    Method,
    /// A class declaration.
    Class,
    /// An exported interface, type alias or enum.
    Type,
    /// An arrow function bound to a name.
    ArrowFn,
}

impl DeclarationKind {
    /// Whether the declaration has a body that can make calls.
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            DeclarationKind::Function | DeclarationKind::Method | DeclarationKind::ArrowFn
        )
    }
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclarationKind::Function => write!(f, "function"),
            DeclarationKind::Method => write!(f, "method"),
            DeclarationKind::Class => write!(f, "class"),
            DeclarationKind::Type => write!(f, "type"),
            DeclarationKind::ArrowFn => write!(f, "arrowFn"),
        }
    }
}

/// Line range of a declaration (1-indexed, inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_line: usize,
    pub end_line: usize,
}

impl SourceSpan {
    pub fn new(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line,
        }
    }
}

/// A named function, class, method or type extracted from one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    /// `<path>:<name>` or `<path>:<Class>.<method>`, unique within a run.
    pub id: String,
    pub name: String,
    pub kind: DeclarationKind,
    pub exported: bool,
    /// Parameter list and return annotation, e.g. `async (id: string): Promise<User>`.
    pub signature: String,
    pub span: SourceSpan,
    pub file_path: String,
    /// Class name for methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    /// Id of the declaration this one is nested in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosing: Option<String>,
    #[serde(default)]
    pub is_async: bool,
    /// The body produces JSX.
    #[serde(default)]
    pub returns_ui: bool,
    #[serde(default)]
    pub errors: ErrorHandling,
}

/// How a callable's own body deals with failures. Nested declarations
/// have their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandling {
    /// A `try` with a `catch` clause.
    pub try_catch: bool,
    /// A `.catch(...)` chained onto a promise.
    pub promise_catch: bool,
    /// A `throw` outside any local `try`.
    pub throws: bool,
}

impl ErrorHandling {
    pub fn handles(&self) -> bool {
        self.try_catch || self.promise_catch
    }
}

impl Declaration {
    pub fn new(file_path: &str, name: &str, kind: DeclarationKind) -> Self {
        Self {
            id: format!("{file_path}:{name}"),
            name: name.to_string(),
            kind,
            exported: false,
            signature: String::new(),
            span: SourceSpan::default(),
            file_path: file_path.to_string(),
            container: None,
            enclosing: None,
            is_async: false,
            returns_ui: false,
            errors: ErrorHandling::default(),
        }
    }

    /// Not nested in a function and not a class member.
    pub fn is_top_level(&self) -> bool {
        self.enclosing.is_none() && self.container.is_none()
    }

    /// `Class.method` for methods, the plain name otherwise.
    pub fn qualified_name(&self) -> String {
        match &self.container {
            Some(class) => format!("{class}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Coarse architectural role of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layer {
    RouteHandler,
    Component,
    Hook,
    DataAccess,
    Utility,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::RouteHandler => write!(f, "route-handler"),
            Layer::Component => write!(f, "component"),
            Layer::Hook => write!(f, "hook"),
            Layer::DataAccess => write!(f, "data-access"),
            Layer::Utility => write!(f, "utility"),
        }
    }
}

/// One name brought into scope by an import statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportBinding {
    /// Name used inside the importing file.
    pub local: String,
    /// Exported name in the source module; `default` or `*`.
    pub imported: String,
    pub namespace: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportInfo {
    /// Module specifier as written (`./auth`, `@/lib/db`, `react`).
    pub source: String,
    pub bindings: Vec<ImportBinding>,
    #[serde(default)]
    pub type_only: bool,
    pub line: usize,
}

impl ImportInfo {
    pub fn binding(&self, local: &str) -> Option<&ImportBinding> {
        self.bindings.iter().find(|b| b.local == local)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
        HttpMethod::Head,
        HttpMethod::Options,
    ];

    /// Case-insensitive parse (`get`, `POST`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbOperation {
    Select,
    Insert,
    Update,
    Delete,
    Upsert,
    Rpc,
    Auth,
    Query,
}

impl fmt::Display for DbOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DbOperation::Select => "select",
            DbOperation::Insert => "insert",
            DbOperation::Update => "update",
            DbOperation::Delete => "delete",
            DbOperation::Upsert => "upsert",
            DbOperation::Rpc => "rpc",
            DbOperation::Auth => "auth",
            DbOperation::Query => "query",
        };
        f.write_str(s)
    }
}

/// What a call site invokes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallTarget {
    /// `name()` or `receiver.name()`.
    Named {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        receiver: Option<String>,
    },
    /// `fetch(...)` or an HTTP client call.
    Http { method: HttpMethod, path: String },
    /// A database/service client call chain.
    Database {
        client: String,
        operation: DbOperation,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table: Option<String>,
    },
}

impl CallTarget {
    pub fn named(name: &str) -> Self {
        CallTarget::Named {
            name: name.to_string(),
            receiver: None,
        }
    }

    pub fn member(receiver: &str, name: &str) -> Self {
        CallTarget::Named {
            name: name.to_string(),
            receiver: Some(receiver.to_string()),
        }
    }

    /// Human-readable callee, used as the external edge target.
    pub fn display_name(&self) -> String {
        match self {
            CallTarget::Named {
                name,
                receiver: Some(receiver),
            } => format!("{receiver}.{name}"),
            CallTarget::Named { name, .. } => name.clone(),
            CallTarget::Http { method, path } => format!("{method} {path}"),
            CallTarget::Database {
                client,
                operation,
                table: Some(table),
            } => format!("{client}.{operation}({table})"),
            CallTarget::Database {
                client, operation, ..
            } => format!("{client}.{operation}"),
        }
    }
}

/// How a call site was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallVia {
    /// A call expression.
    #[default]
    Direct,
    /// A JSX element `<Component />`.
    Render,
    /// A JSX event handler attribute `onClick={handleClick}`.
    Handler,
}

/// Context of a call at its site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CallFlags {
    /// The call is the operand of `await`.
    pub awaited: bool,
    /// Inside an `if`, `switch` or ternary.
    pub conditional: bool,
    /// A failure is caught at the site: inside a `try` body with a `catch`
    /// clause, or followed by a chained `.catch(...)`.
    pub guarded: bool,
}

/// A call made from inside a declaration, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub caller_id: String,
    pub target: CallTarget,
    /// Import source of the callee (or its receiver), when imported.
    /// Pass 2 resolves imported names through it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callee_module: Option<String>,
    pub line: usize,
    #[serde(default)]
    pub via: CallVia,
    #[serde(default)]
    pub flags: CallFlags,
}

impl CallSite {
    pub fn new(caller_id: &str, target: CallTarget, line: usize) -> Self {
        Self {
            caller_id: caller_id.to_string(),
            target,
            callee_module: None,
            line,
            via: CallVia::Direct,
            flags: CallFlags::default(),
        }
    }

    pub fn callee_name(&self) -> String {
        self.target.display_name()
    }

    /// HTTP and database calls leave the analyzed code by construction.
    pub fn is_external(&self) -> bool {
        !matches!(self.target, CallTarget::Named { .. })
    }
}

/// Everything extracted and classified from one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    /// Forward-slash path relative to the analysis root.
    pub file_path: String,
    pub layer: Layer,
    pub declarations: Vec<Declaration>,
    pub imports: Vec<ImportInfo>,
    pub calls: Vec<CallSite>,
    pub is_component: bool,
    pub is_hook: bool,
    pub is_route_handler: bool,
    /// The file contains JSX anywhere.
    #[serde(default)]
    pub has_jsx: bool,
    /// Nesting went past the extractor's depth limit; code below it is
    /// missing from `declarations` and `calls`.
    #[serde(default)]
    pub truncated: bool,
}

impl FileAnalysis {
    /// An unclassified, empty analysis.
    pub fn new(file_path: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            layer: Layer::Utility,
            declarations: Vec::new(),
            imports: Vec::new(),
            calls: Vec::new(),
            is_component: false,
            is_hook: false,
            is_route_handler: false,
            has_jsx: false,
            truncated: false,
        }
    }

    pub fn imported_modules(&self) -> Vec<&str> {
        self.imports.iter().map(|i| i.source.as_str()).collect()
    }

    pub fn declaration(&self, id: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.id == id)
    }

    pub fn exported(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.iter().filter(|d| d.exported)
    }
}

/// The kind of an internal edge in the call graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Caller invokes, renders or wires up the callee.
    Calls,
    /// An HTTP request matched to the route handler that serves it.
    ApiRequest,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Calls => write!(f, "calls"),
            EdgeKind::ApiRequest => write!(f, "api_request"),
        }
    }
}

/// Data stored on a graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeData {
    pub kind: EdgeKind,
    pub via: CallVia,
    /// Line of the first call site that produced the edge.
    pub line: usize,
    /// Flags of that first call site.
    #[serde(default)]
    pub flags: CallFlags,
}

impl EdgeData {
    pub fn new(kind: EdgeKind, via: CallVia, line: usize) -> Self {
        Self {
            kind,
            via,
            line,
            flags: CallFlags::default(),
        }
    }

    /// A `calls` edge for a resolved call site.
    pub fn from_site(site: &CallSite) -> Self {
        Self {
            kind: EdgeKind::Calls,
            via: site.via,
            line: site.line,
            flags: site.flags,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalKind {
    Http,
    Database,
    Unresolved,
}

impl fmt::Display for ExternalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalKind::Http => write!(f, "http"),
            ExternalKind::Database => write!(f, "database"),
            ExternalKind::Unresolved => write!(f, "unresolved"),
        }
    }
}

/// A call that leaves the graph's own nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEdge {
    pub caller_id: String,
    pub kind: ExternalKind,
    /// Display form of the callee (`POST /api/login`, `supabase.select(users)`).
    pub target: String,
    pub call: CallTarget,
    pub line: usize,
    #[serde(default)]
    pub flags: CallFlags,
    /// Route handler this HTTP call was matched to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_handler: Option<String>,
}

impl ExternalEdge {
    /// Stable id used for journey steps that represent this edge.
    pub fn step_id(&self) -> String {
        format!("{EXTERNAL_SENTINEL}:{}:{}", self.kind, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_kind_serde() {
        let json = serde_json::to_string(&DeclarationKind::ArrowFn).unwrap();
        assert_eq!(json, "\"arrowFn\"");
        let layer = serde_json::to_string(&Layer::RouteHandler).unwrap();
        assert_eq!(layer, "\"route-handler\"");
    }

    #[test]
    fn test_http_method_parse() {
        assert_eq!(HttpMethod::parse("post"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::parse("DELETE"), Some(HttpMethod::Delete));
        assert_eq!(HttpMethod::parse("fetch"), None);
    }

    #[test]
    fn test_call_target_display() {
        assert_eq!(CallTarget::member("this", "load").display_name(), "this.load");
        let http = CallTarget::Http {
            method: HttpMethod::Post,
            path: "/api/login".to_string(),
        };
        assert_eq!(http.display_name(), "POST /api/login");
        let db = CallTarget::Database {
            client: "supabase".to_string(),
            operation: DbOperation::Select,
            table: Some("users".to_string()),
        };
        assert_eq!(db.display_name(), "supabase.select(users)");
    }

    #[test]
    fn test_edge_keeps_site_flags() {
        let mut site = CallSite::new("src/a.ts:run", CallTarget::named("save"), 7);
        site.flags.awaited = true;
        site.flags.guarded = true;
        let edge = EdgeData::from_site(&site);
        assert_eq!(edge.kind, EdgeKind::Calls);
        assert_eq!(edge.line, 7);
        assert!(edge.flags.awaited && edge.flags.guarded);
        assert!(!edge.flags.conditional);

        let json = serde_json::to_value(edge).unwrap();
        assert_eq!(json["flags"]["awaited"], true);
        let plain: EdgeData =
            serde_json::from_str(r#"{"kind":"calls","via":"direct","line":1}"#).unwrap();
        assert_eq!(plain.flags, CallFlags::default());
    }

    #[test]
    fn test_qualified_name() {
        let mut method = Declaration::new("src/svc.ts", "save", DeclarationKind::Method);
        method.container = Some("UserService".to_string());
        assert_eq!(method.qualified_name(), "UserService.save");
        assert!(!method.is_top_level());
    }
}
