//! Hotspot ranking by call-graph connectivity.

use serde::{Deserialize, Serialize};

use crate::config::HotspotConfig;
use crate::graph::CallGraph;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    pub id: String,
    pub name: String,
    pub file_path: String,
    pub fan_in: usize,
    pub fan_out: usize,
    pub score: f64,
}

/// Every node scored as `fan_in * weight_in + fan_out * weight_out`, highest
/// first. Equal scores are ordered by id.
pub fn rank_hotspots(graph: &CallGraph, config: &HotspotConfig) -> Vec<Hotspot> {
    let mut ranked: Vec<Hotspot> = graph
        .declarations()
        .into_iter()
        .map(|decl| {
            let fan_in = graph.fan_in(&decl.id);
            let fan_out = graph.fan_out(&decl.id);
            Hotspot {
                id: decl.id.clone(),
                name: decl.qualified_name(),
                file_path: decl.file_path.clone(),
                fan_in,
                fan_out,
                score: fan_in as f64 * config.weight_in + fan_out as f64 * config.weight_out,
            }
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::{CallVia, Declaration, DeclarationKind, EdgeData, EdgeKind};

    fn graph() -> CallGraph {
        let mut graph = CallGraph::new();
        for name in ["a", "b", "c", "shared"] {
            graph.add_declaration(Declaration::new("src/x.ts", name, DeclarationKind::Function));
        }
        let edge = EdgeData::new(EdgeKind::Calls, CallVia::Direct, 1);
        graph.add_call("src/x.ts:a", "src/x.ts:shared", edge);
        graph.add_call("src/x.ts:b", "src/x.ts:shared", edge);
        graph.add_call("src/x.ts:c", "src/x.ts:shared", edge);
        graph.add_call("src/x.ts:a", "src/x.ts:b", edge);
        graph
    }

    #[test]
    fn test_default_weights() {
        let ranked = rank_hotspots(&graph(), &HotspotConfig::default());
        assert_eq!(ranked[0].id, "src/x.ts:shared");
        assert_eq!(ranked[0].fan_in, 3);
        assert_eq!(ranked[0].score, 3.0);
        // a (out 2) and b (in 1, out 1) tie at 2.0; id breaks the tie
        assert_eq!(ranked[1].id, "src/x.ts:a");
        assert_eq!(ranked[2].id, "src/x.ts:b");
        assert_eq!(ranked[3].id, "src/x.ts:c");
    }

    #[test]
    fn test_weights_change_ranking() {
        let config = HotspotConfig {
            weight_in: 0.0,
            weight_out: 1.0,
        };
        let ranked = rank_hotspots(&graph(), &config);
        assert_eq!(ranked[0].id, "src/x.ts:a");
        assert_eq!(ranked.last().map(|h| h.id.as_str()), Some("src/x.ts:shared"));
    }

    #[test]
    fn test_ranking_is_stable() {
        let g = graph();
        let first = rank_hotspots(&g, &HotspotConfig::default());
        let second = rank_hotspots(&g, &HotspotConfig::default());
        assert_eq!(first, second);
    }
}
