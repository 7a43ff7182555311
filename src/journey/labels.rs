//! Readable labels for journey steps and triggers.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::classify::{is_hook_name, is_method_handler, is_pascal_case};
use crate::graph::routes::RoutePattern;
use crate::graph::types::{CallTarget, DbOperation, Declaration, ExternalEdge, ExternalKind};
use crate::graph::FileSummary;

static EVENT_HANDLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:handle|on)([A-Z][A-Za-z0-9]*)$").expect("static regex"));

const TIMER_WORDS: &[&str] = &["timer", "interval", "poll", "cron", "schedule"];

/// Trailing event words dropped from `handleX` names to find the element.
const EVENT_WORDS: &[&str] = &["Submit", "Click", "Press"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Click,
    Submit,
    Load,
    Api,
    Effect,
    Timer,
    External,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerKind::Click => "click",
            TriggerKind::Submit => "submit",
            TriggerKind::Load => "load",
            TriggerKind::Api => "api",
            TriggerKind::Effect => "effect",
            TriggerKind::Timer => "timer",
            TriggerKind::External => "external",
        };
        f.write_str(s)
    }
}

/// What starts a journey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub kind: TriggerKind,
    /// UI element the user interacts with, from `handleX`/`onX` names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    pub handler: String,
    pub label: String,
}

/// `handleLoginSubmit` -> `Handle login submit`, `fetch_user` -> `Fetch user`.
/// All-caps words such as `API` are kept.
pub fn humanize(name: &str) -> String {
    let words = split_words(name);
    let mut out = String::new();
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let keep = word.len() > 1 && word.chars().all(|c| !c.is_ascii_lowercase());
        let word = if keep { word.clone() } else { word.to_lowercase() };
        if i == 0 {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        } else {
            out.push_str(&word);
        }
    }
    out
}

fn split_words(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if matches!(c, '_' | '-' | ' ' | '.' | '$') {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        let prev = i.checked_sub(1).map(|p| chars[p]);
        let next = chars.get(i + 1).copied();
        let boundary = c.is_ascii_uppercase()
            && prev.is_some_and(|p| {
                p.is_ascii_lowercase()
                    || p.is_ascii_digit()
                    || (p.is_ascii_uppercase() && next.is_some_and(|n| n.is_ascii_lowercase()))
            });
        if boundary && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// `POST /api/login` for a method handler in a route file.
fn route_of(decl: &Declaration) -> Option<String> {
    if !is_method_handler(decl) {
        return None;
    }
    RoutePattern::from_file(&decl.file_path).map(|pattern| format!("{} {pattern}", decl.name))
}

fn is_screen(decl: &Declaration, file: Option<&FileSummary>) -> bool {
    decl.returns_ui || (file.is_some_and(|f| f.is_component) && is_pascal_case(&decl.name))
}

/// Label for a declaration appearing in a journey.
pub fn step_label(decl: &Declaration, file: Option<&FileSummary>) -> String {
    if let Some(route) = route_of(decl) {
        return format!("Server handles {route}");
    }
    if is_screen(decl, file) {
        return format!("{} screen", humanize(&decl.name));
    }
    if is_hook_name(&decl.name) {
        let subject = decl.name.trim_start_matches("use");
        return format!("{} logic", humanize(subject));
    }
    match &decl.container {
        Some(class) => format!("{} ({})", humanize(&decl.name), humanize(class)),
        None => humanize(&decl.name),
    }
}

/// Label for a call that leaves the analyzed code.
pub fn external_label(edge: &ExternalEdge) -> String {
    match (&edge.kind, &edge.call) {
        (ExternalKind::Http, CallTarget::Http { method, path }) => {
            format!("Calls API {method} {path}")
        }
        (
            ExternalKind::Database,
            CallTarget::Database {
                client,
                operation,
                table,
            },
        ) => database_label(client, *operation, table.as_deref()),
        _ => format!("Calls {}", edge.target),
    }
}

fn database_label(client: &str, operation: DbOperation, table: Option<&str>) -> String {
    let data = table.map_or_else(|| "data".to_string(), |t| format!("{t} data"));
    match operation {
        DbOperation::Select => format!("Reads {data}"),
        DbOperation::Insert => format!("Saves new {data}"),
        DbOperation::Update => format!("Updates {data}"),
        DbOperation::Upsert => format!("Saves {data}"),
        DbOperation::Delete => format!("Deletes {data}"),
        DbOperation::Rpc => match table {
            Some(function) => format!("Runs database function {function}"),
            None => "Runs a database function".to_string(),
        },
        DbOperation::Auth => format!("Checks sign-in with {client}"),
        DbOperation::Query => "Queries the database".to_string(),
    }
}

/// Work out what starts a journey at `decl`.
pub fn infer_trigger(decl: &Declaration, file: Option<&FileSummary>) -> Trigger {
    let handler = decl.name.clone();
    let lower = decl.name.to_lowercase();

    if let Some(route) = route_of(decl) {
        return Trigger {
            kind: TriggerKind::Api,
            element: None,
            handler,
            label: format!("Request to {route}"),
        };
    }

    if let Some(caps) = EVENT_HANDLER.captures(&decl.name) {
        let captured = &caps[1];
        let subject = EVENT_WORDS
            .iter()
            .find_map(|w| captured.strip_suffix(w))
            .unwrap_or(captured);
        let element = (!subject.is_empty()).then(|| humanize(subject));
        let named = element.as_deref().map(str::to_lowercase);
        let (kind, label) = if lower.contains("submit") {
            let label = named.map_or_else(
                || "Submits a form".to_string(),
                |e| format!("Submits {e} form"),
            );
            (TriggerKind::Submit, label)
        } else {
            let label =
                named.map_or_else(|| "Clicks a button".to_string(), |e| format!("Clicks {e}"));
            (TriggerKind::Click, label)
        };
        return Trigger {
            kind,
            element,
            handler,
            label,
        };
    }

    if TIMER_WORDS.iter().any(|w| lower.contains(w)) {
        return Trigger {
            kind: TriggerKind::Timer,
            element: None,
            handler,
            label: format!("Runs on a schedule: {}", humanize(&decl.name).to_lowercase()),
        };
    }

    if lower.contains("effect") || is_hook_name(&decl.name) {
        return Trigger {
            kind: TriggerKind::Effect,
            element: None,
            handler,
            label: format!("Runs automatically: {}", humanize(&decl.name).to_lowercase()),
        };
    }

    if is_screen(decl, file) {
        return Trigger {
            kind: TriggerKind::Load,
            element: None,
            handler,
            label: format!("Opens {} screen", humanize(&decl.name).to_lowercase()),
        };
    }

    Trigger {
        kind: TriggerKind::External,
        element: None,
        handler,
        label: format!("Called from outside: {}", humanize(&decl.name).to_lowercase()),
    }
}
