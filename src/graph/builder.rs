//! Graph builder: assembles the call graph from classified file analyses.
//!
//! Pass 1 registers every declaration of every file in a
//! [`SymbolRegistry`]. Pass 2 resolves each call site against it, matches
//! HTTP calls to route handlers, and finally picks the entry points.
//! Pass 2 never starts before pass 1 is complete.

use tracing::{debug, info};

use super::engine::{CallGraph, FileSummary};
use super::registry::SymbolRegistry;
use super::types::*;
use crate::classify::is_pascal_case;

/// Build the call graph for a set of classified files.
///
/// The result does not depend on the order of `analyses`.
pub fn build_call_graph(analyses: &[FileAnalysis]) -> CallGraph {
    let registry = SymbolRegistry::build(analyses);

    let mut sorted: Vec<&FileAnalysis> = analyses.iter().collect();
    sorted.sort_by(|a, b| a.file_path.cmp(&b.file_path));

    let mut graph = CallGraph::new();
    for analysis in &sorted {
        graph.add_file(FileSummary::from(*analysis));
        for decl in &analysis.declarations {
            graph.add_declaration(decl.clone());
        }
    }

    // Pass 2: resolve call sites
    for analysis in &sorted {
        for site in &analysis.calls {
            let Some(caller) = registry.declaration(&site.caller_id) else {
                debug!(caller = %site.caller_id, "call site without a declaration, skipping");
                continue;
            };
            add_call_site(&mut graph, &registry, caller, site);
        }
    }

    match_api_calls(&mut graph, &registry);
    mark_entry_points(&mut graph);

    let stats = graph.stats();
    info!(
        files = stats.files,
        declarations = stats.declarations,
        call_edges = stats.call_edges,
        api_edges = stats.api_edges,
        unresolved = stats.unresolved_calls,
        entry_points = stats.entry_points,
        "call graph assembled"
    );
    graph
}

fn add_call_site(
    graph: &mut CallGraph,
    registry: &SymbolRegistry<'_>,
    caller: &Declaration,
    site: &CallSite,
) {
    let external = |kind: ExternalKind| ExternalEdge {
        caller_id: caller.id.clone(),
        kind,
        target: site.target.display_name(),
        call: site.target.clone(),
        line: site.line,
        flags: site.flags,
        matched_handler: None,
    };

    match &site.target {
        CallTarget::Named { .. } => match registry.resolve_call(
            caller,
            &site.target,
            site.callee_module.as_deref(),
        ) {
            Some(callee) => {
                graph.add_call(&caller.id, &callee.id, EdgeData::from_site(site));
            }
            None => {
                graph.add_external(external(ExternalKind::Unresolved));
            }
        },
        CallTarget::Http { .. } => {
            graph.add_external(external(ExternalKind::Http));
        }
        CallTarget::Database { .. } => {
            graph.add_external(external(ExternalKind::Database));
        }
    }
}

/// Bridge HTTP calls to the route handlers that serve them.
fn match_api_calls(graph: &mut CallGraph, registry: &SymbolRegistry<'_>) {
    let bridges: Vec<(usize, String)> = graph
        .external_edges()
        .iter()
        .enumerate()
        .filter_map(|(index, edge)| match &edge.call {
            CallTarget::Http { method, path } => registry
                .match_route(*method, path)
                .map(|handler| (index, handler.id.clone())),
            _ => None,
        })
        .collect();

    for (index, handler) in bridges {
        debug!(handler = %handler, "api call matched to route handler");
        graph.bridge_external(index, &handler);
    }
}

/// Exported top-level functions of route-handler and component files that
/// nothing else calls.
fn mark_entry_points(graph: &mut CallGraph) {
    let entries: Vec<String> = graph
        .declarations()
        .into_iter()
        .filter(|decl| is_entry_candidate(graph, decl))
        .filter(|decl| !graph.has_direct_callers(&decl.id))
        .map(|decl| decl.id.clone())
        .collect();
    for id in entries {
        graph.mark_entry_point(&id);
    }
}

fn is_entry_candidate(graph: &CallGraph, decl: &Declaration) -> bool {
    if !decl.exported
        || !decl.is_top_level()
        || !matches!(decl.kind, DeclarationKind::Function | DeclarationKind::ArrowFn)
    {
        return false;
    }
    let Some(file) = graph.file(&decl.file_path) else {
        return false;
    };
    file.is_route_handler
        || file.layer == Layer::RouteHandler
        || (file.is_component && (decl.returns_ui || is_pascal_case(&decl.name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn func(file: &str, name: &str, exported: bool) -> Declaration {
        let mut d = Declaration::new(file, name, DeclarationKind::Function);
        d.exported = exported;
        d
    }

    fn named_call(caller: &str, name: &str, line: usize) -> CallSite {
        CallSite::new(caller, CallTarget::named(name), line)
    }

    fn imported(source: &str, name: &str) -> ImportInfo {
        ImportInfo {
            source: source.to_string(),
            bindings: vec![ImportBinding {
                local: name.to_string(),
                imported: name.to_string(),
                namespace: false,
            }],
            type_only: false,
            line: 1,
        }
    }

    #[test]
    fn test_cross_file_resolution_is_order_independent() {
        let mut login = FileAnalysis::new("src/login.ts");
        login.layer = Layer::RouteHandler;
        login.is_route_handler = true;
        login.declarations.push(func("src/login.ts", "handleLogin", true));
        login.imports.push(imported("./auth", "validateUser"));
        let mut call = named_call("src/login.ts:handleLogin", "validateUser", 3);
        call.callee_module = Some("./auth".to_string());
        call.flags.awaited = true;
        login.calls.push(call);

        let mut auth = FileAnalysis::new("src/auth.ts");
        auth.declarations.push(func("src/auth.ts", "validateUser", true));

        for files in [vec![login.clone(), auth.clone()], vec![auth, login]] {
            let graph = build_call_graph(&files);
            let callees = graph.callees("src/login.ts:handleLogin");
            assert_eq!(callees.len(), 1);
            assert_eq!(callees[0].id, "src/auth.ts:validateUser");
            let edge = graph.callee_edges("src/login.ts:handleLogin")[0].1;
            assert!(edge.flags.awaited);
            assert!(graph.is_entry_point("src/login.ts:handleLogin"));
            assert!(!graph.is_entry_point("src/auth.ts:validateUser"));
        }
    }

    #[test]
    fn test_unresolved_call_becomes_external() {
        let mut a = FileAnalysis::new("src/a.ts");
        a.declarations.push(func("src/a.ts", "run", true));
        a.calls.push(CallSite::new(
            "src/a.ts:run",
            CallTarget::member("console", "log"),
            2,
        ));
        let graph = build_call_graph(&[a]);
        assert_eq!(graph.stats().call_edges, 0);
        let external = graph.external_edges_from("src/a.ts:run");
        assert_eq!(external.len(), 1);
        assert_eq!(external[0].kind, ExternalKind::Unresolved);
        assert_eq!(external[0].target, "console.log");
    }

    #[test]
    fn test_http_call_bridged_to_route_handler() {
        let mut form = FileAnalysis::new("app/login/LoginForm.tsx");
        form.is_component = true;
        form.layer = Layer::Component;
        let mut view = func("app/login/LoginForm.tsx", "LoginForm", true);
        view.returns_ui = true;
        form.declarations.push(view);
        let mut request = CallSite::new(
            "app/login/LoginForm.tsx:LoginForm",
            CallTarget::Http {
                method: HttpMethod::Post,
                path: "/api/login".to_string(),
            },
            7,
        );
        request.flags.awaited = true;
        form.calls.push(request);

        let mut route = FileAnalysis::new("app/api/login/route.ts");
        route.is_route_handler = true;
        route.layer = Layer::RouteHandler;
        route
            .declarations
            .push(func("app/api/login/route.ts", "POST", true));

        let graph = build_call_graph(&[form, route]);
        let handler = "app/api/login/route.ts:POST";
        let edges = graph.callee_edges("app/login/LoginForm.tsx:LoginForm");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].0.id, handler);
        assert_eq!(edges[0].1.kind, EdgeKind::ApiRequest);
        assert!(edges[0].1.flags.awaited);

        let external = graph.external_edges_from("app/login/LoginForm.tsx:LoginForm");
        assert_eq!(external[0].matched_handler.as_deref(), Some(handler));
        // an api request does not stop the handler being an entry point
        assert!(graph.is_entry_point(handler));
        assert!(graph.is_entry_point("app/login/LoginForm.tsx:LoginForm"));
    }

    #[test]
    fn test_called_component_is_not_an_entry_point() {
        let path = "src/components/Page.tsx";
        let mut page = FileAnalysis::new(path);
        page.is_component = true;
        page.layer = Layer::Component;
        page.declarations.push(func(path, "Page", true));
        page.declarations.push(func(path, "Header", true));
        page.declarations.push(func(path, "formatTitle", true));
        let mut render = named_call(&format!("{path}:Page"), "Header", 4);
        render.via = CallVia::Render;
        page.calls.push(render);

        let graph = build_call_graph(&[page]);
        let entries: Vec<&str> = graph.entry_points().collect();
        assert_eq!(entries, vec!["src/components/Page.tsx:Page"]);
        let edge = graph.callee_edges("src/components/Page.tsx:Page")[0].1;
        assert_eq!(edge.via, CallVia::Render);
    }

    #[test]
    fn test_database_call_is_external() {
        let mut repo = FileAnalysis::new("src/db/users.ts");
        repo.declarations.push(func("src/db/users.ts", "getUser", true));
        repo.calls.push(CallSite::new(
            "src/db/users.ts:getUser",
            CallTarget::Database {
                client: "supabase".to_string(),
                operation: DbOperation::Select,
                table: Some("users".to_string()),
            },
            5,
        ));
        let graph = build_call_graph(&[repo]);
        let stats = graph.stats();
        assert_eq!(stats.database_calls, 1);
        assert_eq!(stats.call_edges, 0);
        assert!(graph.entry_points().next().is_none());
    }
}
