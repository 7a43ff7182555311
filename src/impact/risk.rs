//! Risk levels for affected callers.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Thresholds for [`RiskPolicy::assess`].
///
/// A caller within `high_distance` that itself has at least `high_fan_in`
/// callers is high risk. Anything else within `medium_distance` is medium.
/// The rest is low. Shrinking the distance or growing the fan-in never
/// lowers the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskPolicy {
    pub high_distance: usize,
    pub high_fan_in: usize,
    pub medium_distance: usize,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            high_distance: 1,
            high_fan_in: 2,
            medium_distance: 2,
        }
    }
}

impl RiskPolicy {
    pub fn assess(&self, distance: usize, fan_in: usize) -> RiskLevel {
        if distance <= self.high_distance && fan_in >= self.high_fan_in {
            RiskLevel::High
        } else if distance <= self.medium_distance {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}
