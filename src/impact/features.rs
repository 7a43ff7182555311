//! Feature mapping: technical identifiers to user-facing feature names.
//!
//! The mapper is an ordered rule table. Matching is collect-all: every rule
//! that matches contributes its features, so one file can serve several
//! features. Results keep the order in which rules first produced each
//! feature, and mapping the same identifier twice gives the same answer.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::config::FeatureRuleConfig;
use crate::error::{FlowError, Result};
use crate::graph::types::Declaration;

/// Which identifiers a rule is tested against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchScope {
    #[default]
    Any,
    Path,
    Name,
}

/// A technical identifier to map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identifier<'a> {
    /// A file path.
    Path(&'a str),
    /// A declaration name.
    Name(&'a str),
}

impl Identifier<'_> {
    fn text(&self) -> &str {
        match self {
            Identifier::Path(s) | Identifier::Name(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    /// Patterns of the rules that produced this feature.
    pub matched_via: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FeatureRule {
    pattern: Regex,
    pub features: Vec<String>,
    pub scope: MatchScope,
}

impl FeatureRule {
    /// Compile a case-insensitive rule.
    pub fn new(pattern: &str, features: Vec<String>, scope: MatchScope) -> Result<Self> {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| FlowError::FeaturePattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self {
            pattern,
            features,
            scope,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn matches(&self, identifier: Identifier<'_>) -> bool {
        let in_scope = match (self.scope, identifier) {
            (MatchScope::Any, _) => true,
            (MatchScope::Path, Identifier::Path(_)) => true,
            (MatchScope::Name, Identifier::Name(_)) => true,
            _ => false,
        };
        in_scope && self.pattern.is_match(identifier.text())
    }
}

/// Anything that can turn identifiers into features.
pub trait FeatureSource: Send + Sync {
    fn features_for(&self, identifier: Identifier<'_>) -> Vec<Feature>;

    /// Features of a declaration's file and of its name, merged.
    fn features_for_declaration(&self, decl: &Declaration) -> Vec<Feature> {
        merge_features([
            self.features_for(Identifier::Path(&decl.file_path)),
            self.features_for(Identifier::Name(&decl.name)),
        ])
    }
}

/// Union feature lists, keeping first-seen order and merging `matched_via`.
pub fn merge_features<I>(groups: I) -> Vec<Feature>
where
    I: IntoIterator<Item = Vec<Feature>>,
{
    let mut merged: Vec<Feature> = Vec::new();
    for feature in groups.into_iter().flatten() {
        match merged.iter_mut().find(|f| f.name == feature.name) {
            Some(existing) => {
                for pattern in feature.matched_via {
                    if !existing.matched_via.contains(&pattern) {
                        existing.matched_via.push(pattern);
                    }
                }
            }
            None => merged.push(feature),
        }
    }
    merged
}

// (pattern, scope, features). Multi-feature rules come first.
const DEFAULT_TABLE: &[(&str, MatchScope, &[&str])] = &[
    ("useauth", MatchScope::Any, &["login", "signup", "profile"]),
    (
        r"auth\.ts",
        MatchScope::Path,
        &["login", "signup", "profile", "authentication"],
    ),
    ("session", MatchScope::Any, &["login", "authentication"]),
    ("authprovider", MatchScope::Any, &["login", "signup", "profile"]),
    ("login|signin|sign-in", MatchScope::Any, &["login"]),
    ("signup|sign-up|register|registration", MatchScope::Any, &["signup"]),
    ("logout|signout|sign-out", MatchScope::Any, &["logout"]),
    ("profile|user-info|userinfo|account", MatchScope::Any, &["profile"]),
    ("auth|authorize|token|session", MatchScope::Any, &["authentication"]),
    ("dashboard|home|main|overview", MatchScope::Any, &["dashboard"]),
    ("setting|config|preference", MatchScope::Any, &["settings"]),
    (
        "mermaid|diagram|visualization|flowchart|graph|logic-flow|call-graph",
        MatchScope::Any,
        &["visualization"],
    ),
    ("issue|ticket|bug|task", MatchScope::Any, &["issues"]),
    ("repo|project", MatchScope::Any, &["repository"]),
    ("search|find|query", MatchScope::Any, &["search"]),
    ("notification|alert|toast", MatchScope::Any, &["notifications"]),
    // `profile` is not a file feature
    ("(?:^|[^o])file|upload|download|attachment", MatchScope::Any, &["files"]),
    ("comment|reply|discussion", MatchScope::Any, &["comments"]),
];

static DEFAULT_RULES: LazyLock<Vec<FeatureRule>> = LazyLock::new(|| {
    DEFAULT_TABLE
        .iter()
        .map(|(pattern, scope, features)| {
            FeatureRule::new(
                pattern,
                features.iter().map(|f| f.to_string()).collect(),
                *scope,
            )
            .expect("static feature pattern")
        })
        .collect()
});

#[derive(Debug, Clone)]
pub struct FeatureMapper {
    rules: Vec<FeatureRule>,
}

impl FeatureMapper {
    pub fn new(rules: Vec<FeatureRule>) -> Self {
        Self { rules }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_RULES.clone())
    }

    /// Rules from the config file, or the built-in table when none are set.
    pub fn from_config(rules: &[FeatureRuleConfig]) -> Result<Self> {
        if rules.is_empty() {
            return Ok(Self::with_defaults());
        }
        let rules = rules
            .iter()
            .map(|r| FeatureRule::new(&r.pattern, r.features.clone(), r.scope))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> &[FeatureRule] {
        &self.rules
    }

    /// Union of the features of many identifiers.
    pub fn map_all<'a, I>(&self, identifiers: I) -> Vec<Feature>
    where
        I: IntoIterator<Item = Identifier<'a>>,
    {
        merge_features(identifiers.into_iter().map(|id| self.features_for(id)))
    }
}

impl Default for FeatureMapper {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl FeatureSource for FeatureMapper {
    fn features_for(&self, identifier: Identifier<'_>) -> Vec<Feature> {
        let hits = self
            .rules
            .iter()
            .filter(|rule| rule.matches(identifier))
            .map(|rule| {
                rule.features
                    .iter()
                    .map(|name| Feature {
                        name: name.clone(),
                        matched_via: vec![rule.pattern().to_string()],
                    })
                    .collect::<Vec<_>>()
            });
        merge_features(hits)
    }
}
