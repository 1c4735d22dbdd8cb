//! # pdwalk
//!
//! Pushdown random walks over interprocedural control-flow graphs.
//!
//! A walk keeps an explicit call stack: taking a call edge pushes the call's
//! return site, reaching a function exit pops it. When the stack is empty
//! the walk returns to any statically possible caller. Each walk emits the
//! labels of the edges it follows, producing a text corpus for sequence
//! embedding.
//!
//! - [`graph`]: arena graph, builder and the [`CallGraph`] view
//! - [`policy`]: the per-step transition rules
//! - [`random_walk`]: single walks ([`Walker`])
//! - [`batch`]: all-labels batches, sequential or parallel
//! - [`edgelist`]: ingestion of the extractor's edge list
//! - [`flat`]: per-function flat sentences
//! - [`corpus`]: sinks and the corpus reader

pub mod batch;
pub mod corpus;
pub mod edgelist;
pub mod error;
pub mod flat;
pub mod graph;
pub mod policy;
pub mod random_walk;

pub use batch::{BatchOrchestrator, BatchStats};
pub use corpus::{read_walks, write_distance_row, CollectSink, LineSink, WalkSink};
pub use edgelist::{IngestOptions, RawEdge, RawEdgeList};
pub use error::{Result, WalkError};
pub use flat::flat_walks;
pub use graph::{
    Anchor, CallGraph, EdgeAttrs, GraphBuilder, LabelId, LabelTable, NodeAttrs, NodeId,
    PushdownGraph,
};
pub use policy::{
    enter_probability, CallChoice, StackDistance, Step, Token, TransitionPolicy, WalkState,
    ENTER_MARKER, EXIT_MARKER,
};
pub use random_walk::{Walk, WalkConfig, Walker};
