//! Flat walks: one sentence per function, no paths.
//!
//! Instead of following control flow, each function's instructions are read
//! in counter order and every outgoing edge contributes its first label.
//! Parallel edges are sampled, so repeated rounds give different sentences
//! for functions with indirect calls.

use crate::corpus::WalkSink;
use crate::error::Result;
use crate::graph::{CallGraph, NodeId, PushdownGraph};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// Groups `function.counter` nodes by function, counters in order.
///
/// Basic-block entry/exit pseudo nodes (`bbe`/`bbx` counters) and names that
/// are not exactly `function.counter` are skipped.
pub fn function_bodies(graph: &PushdownGraph) -> BTreeMap<&str, Vec<NodeId>> {
    let mut bodies: BTreeMap<&str, Vec<(&str, NodeId)>> = BTreeMap::new();
    for node in graph.nodes() {
        let Ok(name) = graph.name(node) else { continue };
        let mut parts = name.split('.');
        let (Some(func), Some(counter), None) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        if counter.contains("bbe") || counter.contains("bbx") {
            continue;
        }
        bodies.entry(func).or_default().push((counter, node));
    }

    bodies
        .into_iter()
        .map(|(func, mut nodes)| {
            nodes.sort_by(|(a, _), (b, _)| counter_key(a).cmp(&counter_key(b)));
            (func, nodes.into_iter().map(|(_, n)| n).collect())
        })
        .collect()
}

// Numeric counters sort numerically; anything else falls back to text order.
fn counter_key(counter: &str) -> (Option<u64>, &str) {
    (counter.parse().ok(), counter)
}

/// Writes `rounds` flat sentences per function to `sink`. Returns the number
/// of lines written.
pub fn flat_walks<S: WalkSink + ?Sized>(
    graph: &PushdownGraph,
    rounds: usize,
    seed: u64,
    sink: &mut S,
) -> Result<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let bodies = function_bodies(graph);
    let mut written = 0usize;
    let mut line: Vec<&str> = Vec::new();

    for round in 0..rounds {
        tracing::debug!(round = round + 1, rounds, "flat round");
        for nodes in bodies.values() {
            line.clear();
            for &node in nodes {
                sentence_fragment(graph, node, &mut rng, &mut line)?;
            }
            if !line.is_empty() {
                sink.write_walk(&line)?;
                written += 1;
            }
        }
    }
    tracing::info!(functions = bodies.len(), written, "flat walks done");
    Ok(written)
}

fn sentence_fragment<'g, R: Rng + ?Sized>(
    graph: &'g PushdownGraph,
    node: NodeId,
    rng: &mut R,
    line: &mut Vec<&'g str>,
) -> Result<()> {
    for &next in graph.neighbors(node)? {
        let Some(edge) = graph.edge_variants(node, next)?.choose(rng) else {
            continue;
        };
        if let Some(text) = edge.labels.first().and_then(|&l| graph.labels().get(l)) {
            line.push(text);
        }
    }
    Ok(())
}
