//! Symbol registry: the product of pass 1 of the graph build.
//!
//! Every declaration of every file is registered before any call is
//! resolved, so a call can target a declaration from a file processed after
//! the caller. The registry borrows the analyses it indexes and is dropped
//! once the graph is assembled.

use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::routes::{request_segments, RoutePattern};
use super::types::{
    CallTarget, Declaration, DeclarationKind, FileAnalysis, HttpMethod, ImportBinding,
};
use crate::classify::is_method_handler;

const MODULE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "mts", "cts"];
const PATH_ALIASES: &[&str] = &["@/", "~/"];

/// Where an import specifier points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleRef<'a> {
    /// A file in the analyzed set.
    File(&'a str),
    /// A relative or aliased path with no analyzed file behind it.
    Missing,
    /// A package import (`react`, `@supabase/supabase-js`).
    Package,
}

/// A route file and its method handlers.
#[derive(Debug, Clone)]
pub struct RouteEntry<'a> {
    pub pattern: RoutePattern,
    pub file: &'a str,
    pub handlers: BTreeMap<HttpMethod, &'a Declaration>,
}

pub struct SymbolRegistry<'a> {
    files: HashMap<&'a str, &'a FileAnalysis>,
    by_id: HashMap<&'a str, &'a Declaration>,
    /// Top-level declarations by bare name, sorted by id.
    by_name: HashMap<&'a str, Vec<&'a Declaration>>,
    /// (file, qualified name) -> declarations, sorted by id.
    qualified: HashMap<(&'a str, String), Vec<&'a Declaration>>,
    /// Extensionless path (and `index` directory) -> file.
    modules: HashMap<String, &'a str>,
    routes: Vec<RouteEntry<'a>>,
}

impl<'a> SymbolRegistry<'a> {
    /// Pass 1: register every declaration of every file.
    pub fn build(analyses: &'a [FileAnalysis]) -> Self {
        let mut registry = Self {
            files: HashMap::new(),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            qualified: HashMap::new(),
            modules: HashMap::new(),
            routes: Vec::new(),
        };

        let mut sorted: Vec<&'a FileAnalysis> = analyses.iter().collect();
        sorted.sort_by(|a, b| a.file_path.cmp(&b.file_path));

        for analysis in sorted {
            let path = analysis.file_path.as_str();
            registry.files.insert(path, analysis);
            registry.register_module(path);

            for decl in &analysis.declarations {
                registry.by_id.insert(decl.id.as_str(), decl);
                if decl.is_top_level() {
                    registry.by_name.entry(decl.name.as_str()).or_default().push(decl);
                }
                registry
                    .qualified
                    .entry((path, decl.qualified_name()))
                    .or_default()
                    .push(decl);
            }

            if let Some(pattern) = RoutePattern::from_file(path) {
                let handlers: BTreeMap<HttpMethod, &'a Declaration> = analysis
                    .declarations
                    .iter()
                    .filter(|d| d.exported && d.is_top_level() && is_method_handler(d))
                    .filter_map(|d| HttpMethod::parse(&d.name).map(|m| (m, d)))
                    .collect();
                if !handlers.is_empty() {
                    registry.routes.push(RouteEntry {
                        pattern,
                        file: path,
                        handlers,
                    });
                }
            }
        }

        for list in registry.by_name.values_mut() {
            list.sort_by(|a, b| a.id.cmp(&b.id));
        }
        for list in registry.qualified.values_mut() {
            list.sort_by(|a, b| a.id.cmp(&b.id));
        }

        debug!(
            files = registry.files.len(),
            declarations = registry.by_id.len(),
            routes = registry.routes.len(),
            "symbol registry built"
        );
        registry
    }

    fn register_module(&mut self, path: &'a str) {
        let Some((stem, ext)) = path.rsplit_once('.') else {
            return;
        };
        if !MODULE_EXTENSIONS.contains(&ext) {
            return;
        }
        // Files are registered in path order; first one wins.
        self.modules.entry(stem.to_string()).or_insert(path);
        if let Some(dir) = stem.strip_suffix("/index") {
            self.modules.entry(dir.to_string()).or_insert(path);
        }
    }

    // ─── Lookups ────────────────────────────────────────────────

    pub fn declaration(&self, id: &str) -> Option<&'a Declaration> {
        self.by_id.get(id).copied()
    }

    pub fn file(&self, path: &str) -> Option<&'a FileAnalysis> {
        self.files.get(path).copied()
    }

    pub fn routes(&self) -> &[RouteEntry<'a>] {
        &self.routes
    }

    /// Top-level declarations named `name`, sorted by id.
    pub fn named(&self, name: &str) -> &[&'a Declaration] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn qualified(&self, file: &str, qualified_name: &str) -> &[&'a Declaration] {
        // Borrow the stored path so results keep the registry lifetime.
        match self.files.get_key_value(file) {
            Some((&file, _)) => self
                .qualified
                .get(&(file, qualified_name.to_string()))
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            None => &[],
        }
    }

    /// Exported top-level declaration `name` of `file`.
    fn export_of(&self, file: &str, name: &str) -> Option<&'a Declaration> {
        self.qualified(file, name)
            .iter()
            .copied()
            .find(|d| d.exported && d.is_top_level())
    }

    /// What `import x from './y'` binds to in `file`.
    fn default_export_of(&self, file: &str, local: &str) -> Option<&'a Declaration> {
        let analysis = self.file(file)?;
        self.export_of(file, "default")
            .or_else(|| self.export_of(file, local))
            .or_else(|| {
                let mut exported = analysis
                    .declarations
                    .iter()
                    .filter(|d| d.exported && d.is_top_level() && d.kind != DeclarationKind::Type);
                match (exported.next(), exported.next()) {
                    (Some(only), None) => Some(only),
                    _ => None,
                }
            })
    }

    // ─── Module Resolution ──────────────────────────────────────

    pub fn resolve_module(&self, from_file: &str, specifier: &str) -> ModuleRef<'a> {
        let relative = specifier == "."
            || specifier == ".."
            || specifier.starts_with("./")
            || specifier.starts_with("../");
        let base = if relative {
            let dir = from_file.rsplit_once('/').map_or("", |(dir, _)| dir);
            join_path(dir, specifier)
        } else if let Some(rest) = PATH_ALIASES.iter().find_map(|a| specifier.strip_prefix(a)) {
            rest.to_string()
        } else {
            return ModuleRef::Package;
        };

        let stem = match base.rsplit_once('.') {
            Some((stem, ext)) if MODULE_EXTENSIONS.contains(&ext) => stem.to_string(),
            _ => base.clone(),
        };
        if let Some(&file) = self.modules.get(&stem) {
            return ModuleRef::File(file);
        }
        // Aliases usually point below a source root (`@/lib/x` -> `src/lib/x`).
        let suffix = format!("/{stem}");
        let mut matches: Vec<&'a str> = self
            .modules
            .iter()
            .filter(|(key, _)| key.ends_with(&suffix))
            .map(|(_, &file)| file)
            .collect();
        matches.sort_by_key(|f| (f.len(), *f));
        matches.first().map_or(ModuleRef::Missing, |f| ModuleRef::File(*f))
    }

    // ─── Pass 2 Resolution ──────────────────────────────────────

    /// Resolve a named call made from `caller` to a declaration in the set.
    ///
    /// `callee_module` is the import source recorded at the call site for
    /// the callee (or its receiver). Without it the name is treated as
    /// local or global, never as an import.
    pub fn resolve_call(
        &self,
        caller: &Declaration,
        target: &CallTarget,
        callee_module: Option<&str>,
    ) -> Option<&'a Declaration> {
        let CallTarget::Named { name, receiver } = target else {
            return None;
        };
        let file = self.file(&caller.file_path)?;
        match receiver {
            None => self.resolve_plain(caller, file, name, callee_module),
            Some(receiver) => self.resolve_member(caller, file, receiver, name, callee_module),
        }
    }

    /// The binding of `local` in the import of `module`.
    fn imported(
        &self,
        file: &'a FileAnalysis,
        module: Option<&str>,
        local: &str,
    ) -> Option<(&'a str, &'a ImportBinding)> {
        let module = module?;
        file.imports
            .iter()
            .filter(|i| i.source == module && !i.type_only)
            .find_map(|i| i.binding(local).map(|b| (i.source.as_str(), b)))
    }

    fn resolve_plain(
        &self,
        caller: &Declaration,
        file: &'a FileAnalysis,
        name: &str,
        callee_module: Option<&str>,
    ) -> Option<&'a Declaration> {
        let local = self.qualified(&file.file_path, name);
        if let Some(decl) = self.closest_scope(caller, local) {
            return Some(decl);
        }

        if let Some((source, binding)) = self.imported(file, callee_module, name) {
            if binding.namespace {
                return None;
            }
            match self.resolve_module(&file.file_path, source) {
                ModuleRef::File(target) => {
                    return if binding.imported == "default" {
                        self.default_export_of(target, name)
                    } else {
                        self.export_of(target, &binding.imported)
                    };
                }
                ModuleRef::Package => return None,
                ModuleRef::Missing => {}
            }
        }

        self.closest_global(&file.file_path, name)
    }

    fn resolve_member(
        &self,
        caller: &Declaration,
        file: &'a FileAnalysis,
        receiver: &str,
        name: &str,
        callee_module: Option<&str>,
    ) -> Option<&'a Declaration> {
        if receiver == "this" {
            let class = self.owning_class(caller)?;
            return self
                .qualified(&file.file_path, &format!("{class}.{name}"))
                .first()
                .copied();
        }
        if receiver.contains('.') {
            return None;
        }

        if let Some((source, binding)) = self.imported(file, callee_module, receiver) {
            let ModuleRef::File(target) = self.resolve_module(&file.file_path, source) else {
                return None;
            };
            if binding.namespace {
                return self.export_of(target, name);
            }
            let class_name = if binding.imported == "default" {
                receiver
            } else {
                binding.imported.as_str()
            };
            return self
                .qualified(target, &format!("{class_name}.{name}"))
                .first()
                .copied()
                .or_else(|| self.export_of(target, name));
        }

        // Static call on a class from this file or a unique exported class.
        let local = self.qualified(&file.file_path, &format!("{receiver}.{name}"));
        if let Some(first) = local.first() {
            return Some(*first);
        }
        let classes: Vec<&'a Declaration> = self
            .named(receiver)
            .iter()
            .copied()
            .filter(|d| d.kind == DeclarationKind::Class && d.exported)
            .collect();
        match classes.as_slice() {
            [class] => self
                .qualified(&class.file_path, &format!("{receiver}.{name}"))
                .first()
                .copied(),
            _ => None,
        }
    }

    /// The class a `this` inside `caller` refers to.
    fn owning_class(&self, caller: &Declaration) -> Option<String> {
        let mut current = Some(caller);
        while let Some(decl) = current {
            if let Some(class) = &decl.container {
                return Some(class.clone());
            }
            current = decl.enclosing.as_deref().and_then(|id| self.declaration(id));
        }
        None
    }

    /// Among same-file candidates, prefer one nested in the caller's own
    /// chain of enclosing declarations, then a top-level one.
    fn closest_scope(
        &self,
        caller: &Declaration,
        candidates: &[&'a Declaration],
    ) -> Option<&'a Declaration> {
        let mut chain: Vec<&str> = Vec::new();
        let mut current = Some(caller);
        while let Some(decl) = current {
            chain.push(decl.id.as_str());
            current = decl.enclosing.as_deref().and_then(|id| self.declaration(id));
        }
        let nested = chain.iter().find_map(|scope| {
            candidates
                .iter()
                .find(|c| c.enclosing.as_deref() == Some(*scope))
        });
        nested
            .or_else(|| candidates.iter().find(|c| c.is_top_level()))
            .copied()
    }

    /// Exported top-level declaration from another file, nearest by path.
    fn closest_global(&self, from_file: &str, name: &str) -> Option<&'a Declaration> {
        let candidates = self
            .named(name)
            .iter()
            .filter(|d| d.exported && d.kind != DeclarationKind::Type);
        let best = candidates.max_by(|a, b| {
            shared_dirs(from_file, &a.file_path)
                .cmp(&shared_dirs(from_file, &b.file_path))
                .then_with(|| b.id.cmp(&a.id))
        });
        if let Some(decl) = best {
            debug!(callee = name, resolved = %decl.id, "resolved through global exports");
        }
        best.copied()
    }

    // ─── Routes ─────────────────────────────────────────────────

    /// The handler serving `method path`, least dynamic pattern first.
    pub fn match_route(&self, method: HttpMethod, path: &str) -> Option<&'a Declaration> {
        let request = request_segments(path)?;
        self.routes
            .iter()
            .filter(|route| route.pattern.matches(&request))
            .filter_map(|route| route.handlers.get(&method).map(|d| (route, *d)))
            .min_by_key(|(route, _)| (route.pattern.dynamic_segments(), route.file))
            .map(|(_, decl)| decl)
    }
}

/// Number of leading directory segments two file paths share.
fn shared_dirs(a: &str, b: &str) -> usize {
    let dirs = |p: &str| -> Vec<String> {
        let mut parts: Vec<String> = p.split('/').map(str::to_string).collect();
        parts.pop();
        parts
    };
    dirs(a)
        .iter()
        .zip(dirs(b).iter())
        .take_while(|(x, y)| x == y)
        .count()
}

fn join_path(dir: &str, relative: &str) -> String {
    let mut parts: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
