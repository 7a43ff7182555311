//! Bounded breadth-first walk over reversed call edges.

use std::collections::{HashMap, VecDeque};

use crate::config::TraversalLimits;
use crate::graph::CallGraph;

/// Callers reached from a target, each at its minimum distance.
#[derive(Debug, Clone, Default)]
pub struct ReverseReach {
    /// `(id, distance)` in discovery order. The target is not included.
    pub reached: Vec<(String, usize)>,
    /// A depth or visit limit cut the walk short.
    pub truncated: bool,
}

/// Walk callee -> caller from `target`.
///
/// Every node is recorded once, the first time it is seen, which in
/// breadth-first order is its minimum distance. Cycles back to the target or
/// to a visited caller are ignored.
pub fn reverse_bfs(graph: &CallGraph, target: &str, limits: TraversalLimits) -> ReverseReach {
    let mut reach = ReverseReach::default();
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut queue: VecDeque<(&str, usize)> = VecDeque::new();

    let Some(start) = graph.node(target) else {
        return reach;
    };
    seen.insert(start.id.as_str(), 0);
    queue.push_back((start.id.as_str(), 0));

    'walk: while let Some((id, distance)) = queue.pop_front() {
        let callers = graph.callers(id);
        if distance >= limits.max_depth {
            if callers.iter().any(|c| !seen.contains_key(c.id.as_str())) {
                reach.truncated = true;
            }
            continue;
        }
        for caller in callers {
            if seen.contains_key(caller.id.as_str()) {
                continue;
            }
            if reach.reached.len() >= limits.max_visits {
                reach.truncated = true;
                break 'walk;
            }
            seen.insert(caller.id.as_str(), distance + 1);
            reach.reached.push((caller.id.clone(), distance + 1));
            queue.push_back((caller.id.as_str(), distance + 1));
        }
    }
    reach
}
