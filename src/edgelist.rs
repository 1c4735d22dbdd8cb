//! Ingestion of the raw edge list emitted by the graph extractor.
//!
//! The extractor describes control flow with a few reserved edge kinds:
//! `ret` marks the fallthrough of a call site, `may_ret` lists the possible
//! return sites of a function exit, and `call` connects a call site to the
//! callee's entry. Everything else is an internal edge carrying label ids.

use crate::error::{Result, WalkError};
use crate::graph::{CallGraph, GraphBuilder, LabelId, PushdownGraph};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Synthetic root node added by the extractor; never part of a walk.
pub const PROGRAM_ROOT: &str = "main.0";

const RET: &str = "ret";
const MAY_RET: &str = "may_ret";
const CALL: &str = "call";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawEdge {
    pub source: String,
    pub target: String,
    /// Edge kind: `ret`, `may_ret`, `call`, or anything else for internal edges.
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub label_ids: Vec<u32>,
    #[serde(default)]
    pub location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawEdgeList {
    #[serde(default)]
    pub labels: BTreeMap<u32, String>,
    #[serde(default)]
    pub edges: Vec<RawEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    /// Labels whose text starts with any of these are dropped.
    pub remove_prefixes: Vec<String>,
    /// Attach push targets to call edges. Without it, calls become plain
    /// edges and walks stay inside one function.
    pub interprocedural: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            remove_prefixes: Vec::new(),
            interprocedural: true,
        }
    }
}

impl RawEdgeList {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn into_graph(self, options: &IngestOptions) -> Result<PushdownGraph> {
        let mut b = GraphBuilder::new();

        let mut label_map: HashMap<u32, LabelId> = HashMap::with_capacity(self.labels.len());
        for (raw, text) in &self.labels {
            if options
                .remove_prefixes
                .iter()
                .any(|p| text.starts_with(p.as_str()))
            {
                continue;
            }
            label_map.insert(*raw, b.label(text)?);
        }

        let edges: Vec<&RawEdge> = self
            .edges
            .iter()
            .filter(|e| e.source != PROGRAM_ROOT && e.target != PROGRAM_ROOT)
            .collect();

        // Return sites first: a call edge may precede its `ret` edge.
        for e in &edges {
            let (u, v) = (b.node(&e.source)?, b.node(&e.target)?);
            match e.label.as_str() {
                RET => b.set_return_node(u, v)?,
                MAY_RET => b.add_may_return_target(u, v)?,
                _ => {}
            }
        }

        let mut calls = 0usize;
        for e in &edges {
            let (u, v) = (b.node(&e.source)?, b.node(&e.target)?);
            match e.label.as_str() {
                RET | MAY_RET => {}
                CALL => {
                    let ret = b.return_node(u).ok_or_else(|| WalkError::MissingReturnNode {
                        source_name: e.source.clone(),
                        target_name: e.target.clone(),
                    })?;
                    // The call's label moves onto the skip edge so that both
                    // entering and skipping the call are visible in walks.
                    let callee = b.label(function_name(&e.target))?;
                    let push = options.interprocedural.then_some(ret);
                    b.add_edge(u, v, Vec::new(), push, e.location.clone())?;
                    b.add_edge(u, ret, vec![callee], None, e.location.clone())?;
                    calls += 1;
                }
                _ => {
                    let labels = e
                        .label_ids
                        .iter()
                        .filter_map(|id| label_map.get(id).copied())
                        .collect();
                    b.add_edge(u, v, labels, None, e.location.clone())?;
                }
            }
        }

        let graph = b.build();
        tracing::info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            calls,
            labels = graph.labels().len(),
            "built pushdown graph"
        );
        Ok(graph)
    }
}

/// `"foo.12"` -> `"foo"`.
pub fn function_name(node: &str) -> &str {
    node.split('.').next().unwrap_or(node)
}
