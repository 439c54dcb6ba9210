// Change impact analysis over the dependency graph

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::ImpactConfig;
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;

/// Files reached in one direction from the target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reach {
    pub direct: Vec<String>,
    pub indirect: Vec<String>,
}

impl Reach {
    pub fn total(&self) -> usize {
        self.direct.len() + self.indirect.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskType {
    WidelyUsed,
    Circular,
    DeepChain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Risk {
    #[serde(rename = "type")]
    pub risk_type: RiskType,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactResult {
    pub target: String,
    /// Files that import the target
    pub upstream: Reach,
    /// Files the target imports
    pub downstream: Reach,
    pub risks: Vec<Risk>,
    /// Detected cycles that pass through the target
    pub cycles: Vec<Vec<String>>,
}

/// Impact of changing `target`
pub fn analyze(target: &str, graph: &DependencyGraph, thresholds: &ImpactConfig) -> Result<ImpactResult> {
    if !graph.contains(target) {
        return Err(Error::TargetNotIndexed {
            target: target.to_string(),
        });
    }

    let downstream = closure(target, |node| graph.adjacent(node).iter().map(String::as_str).collect());

    let reverse = graph.reverse();
    let upstream = closure(target, |node| reverse.get(node).cloned().unwrap_or_default());

    let cycles: Vec<Vec<String>> = find_cycles(graph)
        .into_iter()
        .filter(|cycle| cycle.iter().any(|p| p == target))
        .collect();

    let risks = score(&upstream, &downstream, cycles.len(), thresholds);

    Ok(ImpactResult {
        target: target.to_string(),
        upstream,
        downstream,
        risks,
        cycles,
    })
}

/// Direct neighbours of `start` and everything else reachable from them.
/// `start` itself never appears in the result, even on a cycle.
fn closure<'g, F>(start: &'g str, neighbours: F) -> Reach
where
    F: Fn(&str) -> Vec<&'g str>,
{
    let direct: BTreeSet<&str> = neighbours(start).into_iter().filter(|p| *p != start).collect();

    let mut visited: HashSet<&str> = direct.iter().copied().collect();
    visited.insert(start);
    let mut queue: Vec<&str> = direct.iter().copied().collect();
    let mut indirect = BTreeSet::new();

    while let Some(node) = queue.pop() {
        for next in neighbours(node) {
            if visited.insert(next) {
                indirect.insert(next);
                queue.push(next);
            }
        }
    }

    Reach {
        direct: direct.into_iter().map(str::to_string).collect(),
        indirect: indirect.into_iter().map(str::to_string).collect(),
    }
}

/// All cycles found by a depth-first walk started from every node in sorted
/// order. Each cycle is the stack slice from the first occurrence of the
/// revisited node.
pub fn find_cycles(graph: &DependencyGraph) -> Vec<Vec<String>> {
    let mut cycles = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();

    for start in graph.paths() {
        if visited.contains(start) {
            continue;
        }

        // (node, index of the next adjacent path to explore)
        let mut frames: Vec<(&str, usize)> = vec![(start, 0)];
        let mut on_stack: BTreeMap<&str, usize> = BTreeMap::from([(start, 0)]);
        visited.insert(start);

        while let Some(&(node, next)) = frames.last() {
            let adjacent = graph.adjacent(node);
            if next == adjacent.len() {
                frames.pop();
                on_stack.remove(node);
                continue;
            }
            let top = frames.len() - 1;
            frames[top].1 += 1;

            let child = adjacent[next].as_str();
            if let Some(&depth) = on_stack.get(child) {
                cycles.push(frames[depth..].iter().map(|(p, _)| p.to_string()).collect());
            } else if visited.insert(child) {
                on_stack.insert(child, frames.len());
                frames.push((child, 0));
            }
        }
    }

    cycles
}

fn score(upstream: &Reach, downstream: &Reach, cycle_count: usize, thresholds: &ImpactConfig) -> Vec<Risk> {
    let mut risks = Vec::new();

    let dependents = upstream.total();
    let severity = if dependents >= thresholds.widely_used_high {
        Some(Severity::High)
    } else if dependents >= thresholds.widely_used_medium {
        Some(Severity::Medium)
    } else {
        None
    };
    if let Some(severity) = severity {
        risks.push(Risk {
            risk_type: RiskType::WidelyUsed,
            severity,
            message: format!("{} files depend on this file directly or transitively", dependents),
        });
    }

    let dependencies = downstream.total();
    let severity = if dependencies >= thresholds.deep_chain_medium {
        Some(Severity::Medium)
    } else if dependencies >= thresholds.deep_chain_low {
        Some(Severity::Low)
    } else {
        None
    };
    if let Some(severity) = severity {
        risks.push(Risk {
            risk_type: RiskType::DeepChain,
            severity,
            message: format!("This file pulls in {} files through its imports", dependencies),
        });
    }

    if cycle_count > 0 {
        risks.push(Risk {
            risk_type: RiskType::Circular,
            severity: Severity::Medium,
            message: if cycle_count == 1 {
                "Part of 1 circular dependency".to_string()
            } else {
                format!("Part of {} circular dependencies", cycle_count)
            },
        });
    }

    risks
}
