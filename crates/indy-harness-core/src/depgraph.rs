//! Build queue derived from a group build's dependency graph.
//!
//! Each level holds builds whose dependencies all sit in earlier levels. The
//! last level collects the roots: builds nothing else depends on.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{HarnessError, HarnessResult};

/// Dependency graph document of a group build.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DepGraph {
    /// Builds of the group keyed by build id.
    #[serde(default)]
    pub vertices: BTreeMap<String, Value>,
    /// Dependency edges between builds.
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// `source` depends on `target`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Edge {
    /// Dependent build.
    #[serde(alias = "Source")]
    pub source: String,
    /// Build depended upon.
    #[serde(alias = "Target")]
    pub target: String,
}

impl Edge {
    /// Edge from `source` to `target`.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// One level of the build queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildLevel {
    /// Level label, `id1` for the first level.
    pub id: String,
    /// Build ids of the level, sorted.
    #[serde(rename = "build", default)]
    pub items: Vec<String>,
}

fn level(number: usize, items: BTreeSet<String>) -> BuildLevel {
    BuildLevel {
        id: format!("id{number}"),
        items: items.into_iter().collect(),
    }
}

/// Peel the graph into levels, leaves first.
///
/// # Errors
///
/// Returns [`HarnessError::Verification`] when the remaining edges form a
/// cycle.
pub fn build_queue(edges: &[Edge]) -> HarnessResult<Vec<BuildLevel>> {
    let mut remaining = edges.to_vec();
    let mut roots = BTreeSet::new();
    let mut levels = Vec::new();
    let mut number = 1;

    while !remaining.is_empty() {
        let sources: BTreeSet<&str> = remaining.iter().map(|edge| edge.source.as_str()).collect();
        let targets: BTreeSet<&str> = remaining.iter().map(|edge| edge.target.as_str()).collect();

        let mut items = BTreeSet::new();
        let mut kept = Vec::with_capacity(remaining.len());
        for edge in &remaining {
            if sources.contains(edge.target.as_str()) {
                kept.push(edge.clone());
                continue;
            }
            items.insert(edge.target.clone());
            if !targets.contains(edge.source.as_str()) {
                roots.insert(edge.source.clone());
            }
        }
        if items.is_empty() {
            let subject = sources.into_iter().collect::<Vec<_>>().join(",");
            return Err(HarnessError::verification("dependency graph is acyclic", subject));
        }
        debug!(level = number, builds = items.len(), "resolved build level");
        levels.push(level(number, items));
        remaining = kept;
        number += 1;
    }

    levels.push(level(number, roots));
    Ok(levels)
}

/// Queue for `graph`. Vertices without edges join the root level.
///
/// # Errors
///
/// See [`build_queue`].
pub fn graph_queue(graph: &DepGraph) -> HarnessResult<Vec<BuildLevel>> {
    let mut levels = build_queue(&graph.edges)?;
    let connected: BTreeSet<&str> = graph
        .edges
        .iter()
        .flat_map(|edge| [edge.source.as_str(), edge.target.as_str()])
        .collect();
    let isolated = graph
        .vertices
        .keys()
        .filter(|vertex| !connected.contains(vertex.as_str()))
        .cloned();
    if let Some(roots) = levels.last_mut() {
        roots.items.extend(isolated);
        roots.items.sort();
    }
    info!(edges = graph.edges.len(), levels = levels.len(), "computed build queue");
    Ok(levels)
}

/// YAML rendering of a queue.
///
/// # Errors
///
/// Returns [`HarnessError::Yaml`] when encoding fails.
pub fn queue_yaml(levels: &[BuildLevel]) -> HarnessResult<String> {
    serde_yaml::to_string(levels).map_err(|source| HarnessError::Yaml { source })
}
