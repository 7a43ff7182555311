//! Analysis configuration, loaded from `flowlens.toml`.
//!
//! Every section has defaults, so an empty file (or no file at all) yields a
//! usable config. Traversal limits are always present: impact and journey
//! walks never run unbounded.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{FlowError, Result};
use crate::impact::features::MatchScope;
use crate::impact::risk::RiskPolicy;

/// File name looked up by [`AnalysisConfig::discover`].
pub const CONFIG_FILE_NAME: &str = "flowlens.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub extraction: ExtractionConfig,
    pub hotspots: HotspotConfig,
    pub impact: ImpactConfig,
    pub journey: JourneyConfig,
    pub errors: ErrorConfig,
    pub dataflow: DataFlowConfig,
    /// Custom feature rules. Empty means the built-in table.
    pub features: Vec<FeatureRuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Files larger than this are skipped.
    pub max_file_bytes: usize,
    /// Size of the extraction pool. `None` uses the global rayon pool.
    pub workers: Option<usize>,
    /// Receivers whose method calls are HTTP requests (`axios.get(...)`).
    pub http_clients: Vec<String>,
    /// Names that mark a call chain as a database/service client call.
    pub data_clients: Vec<String>,
    /// Import sources that make a file a data-access candidate.
    pub data_modules: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 1024 * 1024,
            workers: None,
            http_clients: vec!["axios".to_string()],
            data_clients: vec!["supabase".to_string(), "prisma".to_string()],
            data_modules: vec![
                "@supabase/supabase-js".to_string(),
                "@prisma/client".to_string(),
                "supabase".to_string(),
                "prisma".to_string(),
                "db".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotspotConfig {
    pub weight_in: f64,
    pub weight_out: f64,
}

impl Default for HotspotConfig {
    fn default() -> Self {
        Self {
            weight_in: 1.0,
            weight_out: 1.0,
        }
    }
}

/// Upper bounds for a single graph traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalLimits {
    pub max_depth: usize,
    pub max_visits: usize,
}

impl TraversalLimits {
    pub fn new(max_depth: usize, max_visits: usize) -> Self {
        Self {
            max_depth,
            max_visits,
        }
    }
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self::new(10, 2000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    pub high_distance: usize,
    pub high_fan_in: usize,
    pub medium_distance: usize,
    pub limits: TraversalLimits,
}

impl ImpactConfig {
    pub fn policy(&self) -> RiskPolicy {
        RiskPolicy {
            high_distance: self.high_distance,
            high_fan_in: self.high_fan_in,
            medium_distance: self.medium_distance,
        }
    }
}

impl Default for ImpactConfig {
    fn default() -> Self {
        let policy = RiskPolicy::default();
        Self {
            high_distance: policy.high_distance,
            high_fan_in: policy.high_fan_in,
            medium_distance: policy.medium_distance,
            limits: TraversalLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JourneyConfig {
    /// Emit calls that resolved to nothing as external steps.
    pub include_unresolved: bool,
    pub limits: TraversalLimits,
}

impl Default for JourneyConfig {
    fn default() -> Self {
        Self {
            include_unresolved: false,
            limits: TraversalLimits::new(12, 500),
        }
    }
}

/// Bounds for error propagation walks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorConfig {
    pub limits: TraversalLimits,
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self {
            limits: TraversalLimits::new(5, 500),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataFlowConfig {
    /// Sources plus destinations reported for one trace.
    pub max_findings: usize,
}

impl Default for DataFlowConfig {
    fn default() -> Self {
        Self { max_findings: 200 }
    }
}

/// A feature rule as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRuleConfig {
    /// Case-insensitive regular expression.
    pub pattern: String,
    pub features: Vec<String>,
    #[serde(default)]
    pub scope: MatchScope,
}

impl AnalysisConfig {
    /// Load and validate a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AnalysisConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `<root>/flowlens.toml` when it exists, defaults otherwise.
    pub fn discover(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE_NAME);
        if path.is_file() {
            tracing::debug!(path = %path.display(), "loading config");
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, limits) in [
            ("impact", &self.impact.limits),
            ("journey", &self.journey.limits),
            ("errors", &self.errors.limits),
        ] {
            if limits.max_depth == 0 || limits.max_visits == 0 {
                return Err(FlowError::Config(format!(
                    "{name}.limits: max_depth and max_visits must be at least 1"
                )));
            }
        }
        if self.impact.high_distance == 0 {
            return Err(FlowError::Config(
                "impact.high_distance must be at least 1".to_string(),
            ));
        }
        if self.impact.medium_distance < self.impact.high_distance {
            return Err(FlowError::Config(
                "impact.medium_distance must not be below impact.high_distance".to_string(),
            ));
        }
        for (name, weight) in [
            ("weight_in", self.hotspots.weight_in),
            ("weight_out", self.hotspots.weight_out),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(FlowError::Config(format!(
                    "hotspots.{name} must be a non-negative number"
                )));
            }
        }
        if self.dataflow.max_findings == 0 {
            return Err(FlowError::Config(
                "dataflow.max_findings must be at least 1".to_string(),
            ));
        }
        if self.extraction.max_file_bytes == 0 {
            return Err(FlowError::Config(
                "extraction.max_file_bytes must be at least 1".to_string(),
            ));
        }
        if self.extraction.workers == Some(0) {
            return Err(FlowError::Config(
                "extraction.workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(config.impact.high_distance, 1);
        assert_eq!(config.impact.high_fan_in, 2);
        assert_eq!(config.impact.medium_distance, 2);
        assert_eq!(config.journey.limits.max_depth, 12);
        assert!(!config.journey.include_unresolved);
        assert!(config.features.is_empty());
        assert_eq!(config.extraction.http_clients, vec!["axios".to_string()]);
    }

    #[test]
    fn test_partial_sections() {
        let config = AnalysisConfig::from_toml_str(
            r#"
[impact]
high_fan_in = 5

[impact.limits]
max_depth = 3

[[features]]
pattern = "checkout"
features = ["checkout", "payments"]
scope = "path"
"#,
        )
        .unwrap();
        assert_eq!(config.impact.high_fan_in, 5);
        assert_eq!(config.impact.high_distance, 1);
        assert_eq!(config.impact.limits.max_depth, 3);
        assert_eq!(config.impact.limits.max_visits, 2000);
        assert_eq!(config.features.len(), 1);
        assert_eq!(config.features[0].scope, MatchScope::Path);
    }

    #[test]
    fn test_zero_limits_rejected() {
        let err = AnalysisConfig::from_toml_str("[journey.limits]\nmax_visits = 0\n").unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }

    #[test]
    fn test_error_and_dataflow_sections() {
        let config = AnalysisConfig::from_toml_str(
            "[errors.limits]\nmax_depth = 2\n\n[dataflow]\nmax_findings = 8\n",
        )
        .unwrap();
        assert_eq!(config.errors.limits.max_depth, 2);
        assert_eq!(config.dataflow.max_findings, 8);
        assert_eq!(AnalysisConfig::default().errors.limits, TraversalLimits::new(5, 500));

        let err = AnalysisConfig::from_toml_str("[dataflow]\nmax_findings = 0\n").unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let err = AnalysisConfig::from_toml_str("[hotspots]\nweight_in = -1.0\n").unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }

    #[test]
    fn test_discover_reads_root_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            AnalysisConfig::discover(dir.path()).unwrap().impact.high_fan_in,
            2
        );

        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[impact]\nhigh_fan_in = 7\n",
        )
        .unwrap();
        let config = AnalysisConfig::discover(dir.path()).unwrap();
        assert_eq!(config.impact.high_fan_in, 7);
    }
}
