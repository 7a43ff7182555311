//! Call-shape detection for `call_expression` nodes.
//!
//! A call is read as a chain: a root expression followed by member segments,
//! some of which are invoked. `supabase.from('users').select('*')` has root
//! `supabase` and segments `from()`, `select()`. The chain decides whether
//! the call is a database client call, an HTTP request, a plain named call,
//! or something we cannot name (`getClient().send()`).

use regex::Regex;
use std::sync::LazyLock;
use tree_sitter::Node;

use super::node_text;
use crate::config::ExtractionConfig;
use crate::graph::types::{CallTarget, DbOperation, HttpMethod, DYNAMIC_PATH};

static TEMPLATE_SUBSTITUTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{[^}]*\}").expect("static regex"));

/// How the extractor should treat a call expression.
pub(crate) enum CallShape<'t> {
    /// Record the target, then walk the whole call.
    Plain(CallTarget),
    /// A client chain recorded once. Only these argument lists are walked.
    Chain(CallTarget, Vec<Node<'t>>),
    /// Not recorded; nested calls are still walked.
    Unrecorded,
}

struct Segment<'t> {
    name: String,
    call: Option<Node<'t>>,
}

struct Chain<'t> {
    root: Node<'t>,
    root_call: Option<Node<'t>>,
    segments: Vec<Segment<'t>>,
}

impl<'t> Chain<'t> {
    fn read(call: Node<'t>, source: &[u8]) -> Self {
        let mut segments = Vec::new();
        let mut pending = None;
        let mut node = call;
        loop {
            let next = match node.kind() {
                "call_expression" => {
                    pending = Some(node);
                    node.child_by_field_name("function")
                }
                "member_expression" => {
                    let name = node
                        .child_by_field_name("property")
                        .map(|p| node_text(p, source))
                        .unwrap_or_default();
                    segments.push(Segment {
                        name,
                        call: pending.take(),
                    });
                    node.child_by_field_name("object")
                }
                "parenthesized_expression" | "non_null_expression" => node.named_child(0),
                _ => None,
            };
            match next {
                Some(n) => node = n,
                None => break,
            }
        }
        segments.reverse();
        Chain {
            root: node,
            root_call: pending,
            segments,
        }
    }

    fn argument_lists(&self) -> Vec<Node<'t>> {
        self.root_call
            .iter()
            .chain(self.segments.iter().filter_map(|s| s.call.as_ref()))
            .filter_map(|call| call.child_by_field_name("arguments"))
            .collect()
    }
}

pub(crate) fn call_shape<'t>(
    call: Node<'t>,
    source: &[u8],
    config: &ExtractionConfig,
) -> CallShape<'t> {
    let chain = Chain::read(call, source);
    let root = match chain.root.kind() {
        "identifier" | "this" => node_text(chain.root, source),
        _ => return CallShape::Unrecorded,
    };

    if let Some(target) = database_target(&chain, &root, source, config) {
        return CallShape::Chain(target, chain.argument_lists());
    }
    if let Some(target) = http_target(&chain, &root, call, source, config) {
        return CallShape::Plain(target);
    }
    match named_target(&chain, &root) {
        Some(target) => CallShape::Plain(target),
        None => CallShape::Unrecorded,
    }
}

fn named_target(chain: &Chain<'_>, root: &str) -> Option<CallTarget> {
    let Some((last, receivers)) = chain.segments.split_last() else {
        return (root != "this").then(|| CallTarget::named(root));
    };
    if chain.root_call.is_some() || receivers.iter().any(|s| s.call.is_some()) {
        return None;
    }
    let receiver = std::iter::once(root)
        .chain(receivers.iter().map(|s| s.name.as_str()))
        .collect::<Vec<_>>()
        .join(".");
    Some(CallTarget::member(&receiver, &last.name))
}

fn http_target(
    chain: &Chain<'_>,
    root: &str,
    call: Node<'_>,
    source: &[u8],
    config: &ExtractionConfig,
) -> Option<CallTarget> {
    let args = arguments(call);
    let is_client = config.http_clients.iter().any(|c| c == root);

    match chain.segments.as_slice() {
        [] if root == "fetch" => {
            let method = args
                .get(1)
                .and_then(|opts| config_method(*opts, source))
                .unwrap_or(HttpMethod::Get);
            Some(CallTarget::Http {
                method,
                path: args.first().map_or_else(dynamic, |u| url_of(*u, source)),
            })
        }
        [] if is_client => request_config(&args, source),
        [verb] if is_client && chain.root_call.is_none() => {
            if verb.name == "request" {
                return request_config(&args, source);
            }
            let method = HttpMethod::parse(&verb.name)?;
            Some(CallTarget::Http {
                method,
                path: args.first().map_or_else(dynamic, |u| url_of(*u, source)),
            })
        }
        _ => None,
    }
}

/// `axios({ method, url })`, `axios(url, { method })`.
fn request_config(args: &[Node<'_>], source: &[u8]) -> Option<CallTarget> {
    let first = *args.first()?;
    if first.kind() == "object" {
        let method = config_method(first, source).unwrap_or(HttpMethod::Get);
        let path = object_property(first, "url", source).map_or_else(dynamic, |u| url_of(u, source));
        return Some(CallTarget::Http { method, path });
    }
    let method = args
        .get(1)
        .and_then(|opts| config_method(*opts, source))
        .unwrap_or(HttpMethod::Get);
    Some(CallTarget::Http {
        method,
        path: url_of(first, source),
    })
}

fn database_target(
    chain: &Chain<'_>,
    root: &str,
    source: &[u8],
    config: &ExtractionConfig,
) -> Option<CallTarget> {
    let (client, methods) = if root == "this" {
        let (first, rest) = chain.segments.split_first()?;
        (first.name.clone(), rest)
    } else {
        if chain.root_call.is_some() {
            return None;
        }
        (root.to_string(), chain.segments.as_slice())
    };

    let lowered = client.to_lowercase();
    let is_client = config
        .data_clients
        .iter()
        .any(|c| lowered.contains(&c.to_lowercase()));
    if !is_client || !methods.iter().any(|s| s.call.is_some()) {
        return None;
    }

    let names: Vec<&str> = methods.iter().map(|s| s.name.as_str()).collect();
    let table = methods
        .iter()
        .find(|s| matches!(s.name.as_str(), "from" | "rpc") && s.call.is_some())
        .and_then(|s| s.call)
        .and_then(|c| arguments(c).first().and_then(|a| literal_text(*a, source)))
        .or_else(|| match methods {
            // prisma.user.findMany()
            [model, _, ..] if model.call.is_none() && model.name != "auth" => {
                Some(model.name.clone())
            }
            _ => None,
        });

    Some(CallTarget::Database {
        client,
        operation: db_operation(&names),
        table,
    })
}

fn db_operation(methods: &[&str]) -> DbOperation {
    let has = |names: &[&str]| methods.iter().any(|m| names.contains(m));
    if has(&["auth"]) {
        DbOperation::Auth
    } else if has(&["rpc", "$queryRaw", "$executeRaw"]) {
        DbOperation::Rpc
    } else if has(&["upsert"]) {
        DbOperation::Upsert
    } else if has(&["insert", "create", "createMany"]) {
        DbOperation::Insert
    } else if has(&["update", "updateMany"]) {
        DbOperation::Update
    } else if has(&["delete", "deleteMany", "remove"]) {
        DbOperation::Delete
    } else if has(&[
        "select",
        "findMany",
        "findUnique",
        "findFirst",
        "findUniqueOrThrow",
        "findFirstOrThrow",
        "count",
        "aggregate",
        "groupBy",
    ]) {
        DbOperation::Select
    } else {
        DbOperation::Query
    }
}

fn arguments(call: Node<'_>) -> Vec<Node<'_>> {
    let Some(args) = call.child_by_field_name("arguments") else {
        return Vec::new();
    };
    let mut cursor = args.walk();
    let nodes = args
        .named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect();
    nodes
}

fn object_property<'t>(object: Node<'t>, key: &str, source: &[u8]) -> Option<Node<'t>> {
    if object.kind() != "object" {
        return None;
    }
    let mut cursor = object.walk();
    let found = object.named_children(&mut cursor).find(|pair| {
        pair.kind() == "pair"
            && pair
                .child_by_field_name("key")
                .is_some_and(|k| unquote(&node_text(k, source)) == key)
    });
    found.and_then(|pair| pair.child_by_field_name("value"))
}

fn config_method(options: Node<'_>, source: &[u8]) -> Option<HttpMethod> {
    let value = object_property(options, "method", source)?;
    HttpMethod::parse(&literal_text(value, source)?)
}

/// Text of a string or template literal, substitutions as `:param`.
pub(crate) fn literal_text(node: Node<'_>, source: &[u8]) -> Option<String> {
    match node.kind() {
        "string" => Some(unquote(&node_text(node, source))),
        "template_string" => {
            let raw = unquote(&node_text(node, source));
            Some(TEMPLATE_SUBSTITUTION.replace_all(&raw, ":param").into_owned())
        }
        _ => None,
    }
}

/// Best-effort URL from a literal or a `'/api/x/' + id` concatenation.
fn url_of(node: Node<'_>, source: &[u8]) -> String {
    fn parts(node: Node<'_>, source: &[u8], out: &mut String) -> bool {
        if let Some(text) = literal_text(node, source) {
            out.push_str(&text);
            return true;
        }
        if node.kind() == "binary_expression" {
            if let (Some(left), Some(right)) = (
                node.child_by_field_name("left"),
                node.child_by_field_name("right"),
            ) {
                let l = parts(left, source, out);
                let r = parts(right, source, out);
                return l || r;
            }
        }
        out.push_str(":param");
        false
    }

    let mut url = String::new();
    if parts(node, source, &mut url) {
        url
    } else {
        dynamic()
    }
}

fn dynamic() -> String {
    DYNAMIC_PATH.to_string()
}

pub(crate) fn unquote(text: &str) -> String {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_operation_priority() {
        assert_eq!(db_operation(&["from", "select", "eq"]), DbOperation::Select);
        assert_eq!(db_operation(&["from", "insert", "select"]), DbOperation::Insert);
        assert_eq!(db_operation(&["auth", "signInWithPassword"]), DbOperation::Auth);
        assert_eq!(db_operation(&["user", "findMany"]), DbOperation::Select);
        assert_eq!(db_operation(&["storage", "upload"]), DbOperation::Query);
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("'/api/login'"), "/api/login");
        assert_eq!(unquote("\"users\""), "users");
        assert_eq!(unquote("`x`"), "x");
    }

    #[test]
    fn test_template_substitution() {
        let replaced = TEMPLATE_SUBSTITUTION.replace_all("/api/users/${id}/posts/${ post.id }", ":param");
        assert_eq!(replaced, "/api/users/:param/posts/:param");
    }
}
