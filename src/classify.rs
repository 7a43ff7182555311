//! Layer classification as an ordered rule table.
//!
//! Rules are checked in order and the first match sets the file's layer.
//! The capability flags (`is_component`, `is_hook`, `is_route_handler`) are
//! computed separately: a flag is set when any rule for that layer matches,
//! whatever layer won.

use regex::Regex;
use std::sync::LazyLock;

use crate::config::ExtractionConfig;
use crate::graph::routes::is_route_file;
use crate::graph::types::{CallTarget, Declaration, FileAnalysis, HttpMethod, Layer};

static HOOK_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^use[A-Z0-9]").expect("static regex"));

type Predicate = Box<dyn Fn(&FileAnalysis) -> bool + Send + Sync>;

/// One row of the table: when `predicate` holds, the file is `layer`.
pub struct LayerRule {
    pub name: String,
    pub layer: Layer,
    predicate: Predicate,
}

impl LayerRule {
    pub fn new(
        name: impl Into<String>,
        layer: Layer,
        predicate: impl Fn(&FileAnalysis) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            layer,
            predicate: Box::new(predicate),
        }
    }

    pub fn matches(&self, analysis: &FileAnalysis) -> bool {
        (self.predicate)(analysis)
    }
}

impl std::fmt::Debug for LayerRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerRule")
            .field("name", &self.name)
            .field("layer", &self.layer)
            .finish()
    }
}

#[derive(Debug)]
pub struct LayerClassifier {
    rules: Vec<LayerRule>,
    fallback: Layer,
}

impl LayerClassifier {
    pub fn new(rules: Vec<LayerRule>) -> Self {
        Self {
            rules,
            fallback: Layer::Utility,
        }
    }

    /// The built-in table: route handler, component, hook, data access.
    pub fn with_defaults(config: &ExtractionConfig) -> Self {
        let data_modules: Vec<String> = config
            .data_modules
            .iter()
            .map(|m| m.to_lowercase())
            .collect();
        Self::new(vec![
            LayerRule::new("route-handler", Layer::RouteHandler, |a| {
                is_route_file(&a.file_path) && a.exported().any(is_method_handler)
            }),
            LayerRule::new("component", Layer::Component, is_component_file),
            LayerRule::new("hook", Layer::Hook, |a| {
                a.exported().any(|d| HOOK_NAME.is_match(&d.name))
            }),
            LayerRule::new("data-access", Layer::DataAccess, move |a| {
                imports_data_module(a, &data_modules) && invokes_database(a)
            }),
        ])
    }

    pub fn rules(&self) -> &[LayerRule] {
        &self.rules
    }

    /// Set `layer` and the capability flags on an extracted file.
    pub fn classify(&self, analysis: &mut FileAnalysis) {
        let matched: Vec<Layer> = self
            .rules
            .iter()
            .filter(|rule| rule.matches(analysis))
            .map(|rule| rule.layer)
            .collect();
        analysis.layer = matched.first().copied().unwrap_or(self.fallback);
        analysis.is_route_handler = matched.contains(&Layer::RouteHandler);
        analysis.is_component = matched.contains(&Layer::Component);
        analysis.is_hook = matched.contains(&Layer::Hook);
    }
}

/// `export async function POST(req)` in a route file.
pub fn is_method_handler(decl: &Declaration) -> bool {
    decl.kind.is_callable() && HttpMethod::parse(&decl.name).is_some_and(|m| m.as_str() == decl.name)
}

pub fn is_hook_name(name: &str) -> bool {
    HOOK_NAME.is_match(name)
}

pub fn is_pascal_case(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && name.chars().any(|c| c.is_ascii_lowercase())
}

fn is_component_file(analysis: &FileAnalysis) -> bool {
    let jsx_file = analysis.file_path.ends_with(".tsx") || analysis.file_path.ends_with(".jsx");
    analysis.exported().any(|d| {
        d.kind.is_callable()
            && (d.returns_ui || (jsx_file && analysis.has_jsx && is_pascal_case(&d.name)))
    })
}

fn imports_data_module(analysis: &FileAnalysis, modules: &[String]) -> bool {
    analysis.imports.iter().any(|import| {
        let source = import.source.to_lowercase();
        modules.iter().any(|m| {
            source == *m
                || source
                    .split('/')
                    .any(|segment| segment.trim_start_matches('@') == m)
        })
    })
}

fn invokes_database(analysis: &FileAnalysis) -> bool {
    analysis
        .calls
        .iter()
        .any(|c| matches!(c.target, CallTarget::Database { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::{CallSite, DbOperation, DeclarationKind, ImportInfo};

    fn exported(file: &str, name: &str, kind: DeclarationKind) -> Declaration {
        let mut d = Declaration::new(file, name, kind);
        d.exported = true;
        d
    }

    fn classify(analysis: &mut FileAnalysis) {
        LayerClassifier::with_defaults(&ExtractionConfig::default()).classify(analysis);
    }

    #[test]
    fn test_route_handler_needs_method_export() {
        let path = "app/api/login/route.ts";
        let mut a = FileAnalysis::new(path);
        a.declarations.push(exported(path, "POST", DeclarationKind::Function));
        classify(&mut a);
        assert_eq!(a.layer, Layer::RouteHandler);
        assert!(a.is_route_handler);

        let mut helper = FileAnalysis::new(path);
        helper
            .declarations
            .push(exported(path, "handleLogin", DeclarationKind::Function));
        classify(&mut helper);
        assert_ne!(helper.layer, Layer::RouteHandler);
        assert!(!helper.is_route_handler);
    }

    #[test]
    fn test_component_by_jsx_return() {
        let path = "src/components/Header.tsx";
        let mut a = FileAnalysis::new(path);
        let mut header = exported(path, "Header", DeclarationKind::ArrowFn);
        header.returns_ui = true;
        a.declarations.push(header);
        a.has_jsx = true;
        classify(&mut a);
        assert_eq!(a.layer, Layer::Component);
        assert!(a.is_component);
        assert!(!a.is_hook);
    }

    #[test]
    fn test_flags_overlap_but_layer_is_first_match() {
        let path = "src/components/Profile.tsx";
        let mut a = FileAnalysis::new(path);
        let mut view = exported(path, "Profile", DeclarationKind::Function);
        view.returns_ui = true;
        a.declarations.push(view);
        a.declarations
            .push(exported(path, "useProfile", DeclarationKind::Function));
        classify(&mut a);
        assert_eq!(a.layer, Layer::Component);
        assert!(a.is_component);
        assert!(a.is_hook);
    }

    #[test]
    fn test_hook_file() {
        let path = "src/hooks/useAuth.ts";
        let mut a = FileAnalysis::new(path);
        a.declarations
            .push(exported(path, "useAuth", DeclarationKind::Function));
        classify(&mut a);
        assert_eq!(a.layer, Layer::Hook);

        // `user` is not a hook name
        let mut b = FileAnalysis::new("src/user.ts");
        b.declarations
            .push(exported("src/user.ts", "user", DeclarationKind::Function));
        classify(&mut b);
        assert_eq!(b.layer, Layer::Utility);
    }

    #[test]
    fn test_data_access_needs_import_and_invocation() {
        let path = "src/lib/users.ts";
        let mut a = FileAnalysis::new(path);
        a.declarations
            .push(exported(path, "getUser", DeclarationKind::Function));
        a.imports.push(ImportInfo {
            source: "@/lib/supabase".to_string(),
            bindings: Vec::new(),
            type_only: false,
            line: 1,
        });
        classify(&mut a);
        assert_eq!(a.layer, Layer::Utility, "import alone is not enough");

        a.calls.push(CallSite::new(
            "src/lib/users.ts:getUser",
            CallTarget::Database {
                client: "supabase".to_string(),
                operation: DbOperation::Select,
                table: Some("users".to_string()),
            },
            3,
        ));
        classify(&mut a);
        assert_eq!(a.layer, Layer::DataAccess);
    }

    #[test]
    fn test_custom_rule_table() {
        let classifier = LayerClassifier::new(vec![LayerRule::new(
            "stores",
            Layer::DataAccess,
            |a| a.file_path.contains("/stores/"),
        )]);
        let mut a = FileAnalysis::new("src/stores/cart.ts");
        classifier.classify(&mut a);
        assert_eq!(a.layer, Layer::DataAccess);
        assert_eq!(classifier.rules().len(), 1);
    }
}
