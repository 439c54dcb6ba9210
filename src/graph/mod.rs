// File-level dependency graph

pub mod engine;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::indexer::discovery::{normalize_lexical, relative_path};

/// Adjacency as produced by an engine, before normalization
pub type RawGraph = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub adjacent_to: Vec<String>,
}

/// `path -> {adjacentTo}`, where an edge means "imports"
///
/// Keys and adjacency lists are sorted and deduplicated, and every adjacent
/// path has a node of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, GraphNode>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, path: &str) {
        self.nodes.entry(path.to_string()).or_default();
    }

    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.add_node(to);
        let node = self.nodes.entry(from.to_string()).or_default();
        if let Err(pos) = node.adjacent_to.binary_search_by(|p| p.as_str().cmp(to)) {
            node.adjacent_to.insert(pos, to.to_string());
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    /// Files `path` imports directly
    pub fn adjacent(&self, path: &str) -> &[String] {
        self.nodes
            .get(path)
            .map(|n| n.adjacent_to.as_slice())
            .unwrap_or(&[])
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.adjacent_to.len()).sum()
    }

    /// `path -> files importing it`, with every node present
    pub fn reverse(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut reverse: BTreeMap<&str, Vec<&str>> =
            self.nodes.keys().map(|k| (k.as_str(), Vec::new())).collect();
        for (from, node) in &self.nodes {
            for to in &node.adjacent_to {
                reverse.entry(to.as_str()).or_default().push(from.as_str());
            }
        }
        reverse
    }

    /// Sorted, deduplicated, closed under adjacency
    pub fn is_well_formed(&self) -> bool {
        self.nodes.values().all(|node| {
            node.adjacent_to.windows(2).all(|w| w[0] < w[1])
                && node.adjacent_to.iter().all(|p| self.nodes.contains_key(p))
        })
    }

    /// Build the canonical graph from engine output.
    ///
    /// Paths are made project-relative with forward slashes. Anything that is
    /// not one of `known` (third-party, built-in, outside the root, not a
    /// discovered source file) is dropped.
    pub fn normalize(raw: RawGraph, root: &Path, known: &BTreeSet<String>) -> Self {
        let accept = |path: &str| normalize_path(root, path).filter(|p| known.contains(p));

        let mut graph = Self::new();
        for (from, adjacent) in raw {
            let Some(from) = accept(&from) else {
                continue;
            };
            graph.add_node(&from);
            for to in adjacent.iter().filter_map(|p| accept(p)) {
                graph.add_edge(&from, &to);
            }
        }
        graph
    }
}

/// Project-relative form of an engine path, or `None` for paths that can
/// never be project files
fn normalize_path(root: &Path, path: &str) -> Option<String> {
    if path.starts_with("node:") || path.split(['/', '\\']).any(|part| part == "node_modules") {
        return None;
    }
    let candidate = Path::new(path);
    let relative = if candidate.is_absolute() {
        relative_path(root, candidate)?
    } else {
        path.to_string()
    };
    normalize_lexical(&relative).filter(|p| !p.is_empty())
}

/// Parse engine stdout. Accepts `{"graph": {p: {"adjacentTo": [...]}}}`
/// as well as the flat `{p: [...]}` form.
pub fn parse_engine_output(text: &str) -> Result<RawGraph> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| Error::engine(format!("engine output is not JSON: {}", e)))?;

    let nodes = match value.get("graph") {
        Some(graph) if graph.is_object() => graph,
        _ => &value,
    };
    let Some(nodes) = nodes.as_object() else {
        return Err(Error::engine("engine output is not an object"));
    };

    let mut raw = RawGraph::new();
    for (path, entry) in nodes {
        let list = match entry {
            Value::Array(list) => list,
            Value::Object(node) => match node.get("adjacentTo") {
                Some(Value::Array(list)) => list,
                _ => return Err(Error::engine(format!("node {} has no adjacentTo list", path))),
            },
            _ => return Err(Error::engine(format!("unexpected entry for {}", path))),
        };
        let adjacent = list
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::engine(format!("non-string dependency of {}", path)))
            })
            .collect::<Result<Vec<_>>>()?;
        raw.insert(path.clone(), adjacent);
    }
    Ok(raw)
}

/// Persisted graph together with the file list it was built from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphArtifact {
    pub built_at: chrono::DateTime<chrono::Utc>,
    pub files: Vec<String>,
    pub graph: DependencyGraph,
}
