//! Single pushdown walk generation.

use crate::error::{Result, WalkError};
use crate::graph::{LabelId, LabelTable, PushdownGraph};
use crate::policy::{Step, Token, TransitionPolicy, WalkState, ENTER_MARKER, EXIT_MARKER};
use rand::prelude::*;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkConfig {
    /// Maximum number of transitions per walk.
    pub max_edges: usize,
    /// Number of rounds over all start labels.
    pub walks_per_label: usize,
    /// Follow calls and returns across functions.
    pub interprocedural: bool,
    /// Emit `F2V_ENTERFN` / `F2V_EXITFN` markers.
    pub enter_exit_markers: bool,
    /// `1.0` is unbiased; larger values discourage deep call stacks.
    pub bias_constant: f64,
    pub seed: u64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            max_edges: 200,
            walks_per_label: 100,
            interprocedural: true,
            enter_exit_markers: false,
            bias_constant: 1.0,
            seed: 0,
        }
    }
}

impl WalkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_edges == 0 {
            return Err(WalkError::InvalidConfig("max_edges must be >= 1".into()));
        }
        if self.walks_per_label == 0 {
            return Err(WalkError::InvalidConfig("walks_per_label must be >= 1".into()));
        }
        if self.bias_constant == 0.0 || !self.bias_constant.is_finite() {
            return Err(WalkError::InvalidConfig(format!(
                "bias_constant must be finite and non-zero, got {}",
                self.bias_constant
            )));
        }
        Ok(())
    }
}

/// A finished walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Walk {
    pub tokens: Vec<Token>,
    /// Edges actually followed. Pops and may-return jumps are not edges.
    pub edges_visited: usize,
    /// Deepest call nesting reached, for diagnostics only.
    pub max_stack_distance: usize,
}

impl Walk {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Walks with fewer than two tokens carry no co-occurrence signal.
    pub fn is_degenerate(&self) -> bool {
        self.tokens.len() < 2
    }

    pub fn labels<'a>(&self, table: &'a LabelTable) -> Vec<&'a str> {
        self.tokens
            .iter()
            .filter_map(|t| match *t {
                Token::Label(id) => table.get(id),
                Token::Enter => Some(ENTER_MARKER),
                Token::Exit => Some(EXIT_MARKER),
            })
            .collect()
    }

    pub fn write_line<W: Write + ?Sized>(&self, table: &LabelTable, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", self.labels(table).join(" "))
    }
}

impl From<WalkState> for Walk {
    fn from(state: WalkState) -> Self {
        Self {
            tokens: state.tokens,
            edges_visited: state.edges_visited,
            max_stack_distance: state.max_stack_distance,
        }
    }
}

/// Drives single walks over a shared graph.
#[derive(Debug, Clone, Copy)]
pub struct Walker<'g> {
    graph: &'g PushdownGraph,
    policy: TransitionPolicy,
}

impl<'g> Walker<'g> {
    pub fn new(graph: &'g PushdownGraph, policy: TransitionPolicy) -> Self {
        Self { graph, policy }
    }

    pub fn from_config(graph: &'g PushdownGraph, config: &WalkConfig) -> Self {
        Self::new(graph, TransitionPolicy::from(config))
    }

    pub fn graph(&self) -> &'g PushdownGraph {
        self.graph
    }

    pub fn policy(&self) -> &TransitionPolicy {
        &self.policy
    }

    /// Runs one walk of at most `max_edges` transitions.
    ///
    /// Without a start label, one is drawn uniformly from the labels that tag
    /// at least one edge; a graph with no labeled edges yields an empty walk.
    pub fn walk<R: Rng + ?Sized>(
        &self,
        start_label: Option<LabelId>,
        max_edges: usize,
        rng: &mut R,
    ) -> Result<Walk> {
        let label = match start_label {
            Some(label) => label,
            None => match self.graph.start_labels().choose(rng) {
                Some(&label) => label,
                None => return Ok(Walk::default()),
            },
        };
        let anchors = self.graph.anchors(label)?;
        let Some(anchor) = anchors.choose(rng) else {
            return Err(WalkError::UnknownLabel(label));
        };

        let mut state = WalkState::new(&anchor.labels);
        let mut current = anchor.node;
        let mut transitions = 0usize;
        while transitions < max_edges {
            match self.policy.step(self.graph, current, &mut state, rng)? {
                Step::Active(next) => {
                    current = next;
                    transitions += 1;
                }
                Step::Dead => break,
            }
        }
        tracing::trace!(
            %label,
            transitions,
            edges = state.edges_visited,
            max_stack = state.max_stack_distance,
            "walk finished"
        );
        Ok(state.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::policy::tests::FixedRng;
    use rand_chacha::ChaCha8Rng;

    /// `S -> A` labeled `entry`; call site `A` (return node `B`) calls `C`;
    /// `C -> B` internal. `B` has no successors and no may-return targets.
    fn scenario() -> (PushdownGraph, LabelId) {
        let mut b = GraphBuilder::new();
        let s = b.node("main.0x").unwrap();
        let a = b.node("main.1").unwrap();
        let bb = b.node("main.2").unwrap();
        let c = b.node("f.0").unwrap();
        let entry = b.label("entry").unwrap();
        let f = b.label("f").unwrap();
        let body = b.label("body").unwrap();
        b.add_edge(s, a, vec![entry], None, "").unwrap();
        b.set_return_node(a, bb).unwrap();
        b.add_edge(a, c, vec![], Some(bb), "").unwrap();
        b.add_edge(a, bb, vec![f], None, "").unwrap();
        b.add_edge(c, bb, vec![body], None, "").unwrap();
        (b.build(), entry)
    }

    #[test]
    fn entering_the_call_visits_callee_then_return_site() {
        let (g, entry) = scenario();
        let walker = Walker::new(&g, TransitionPolicy::default());
        let walk = walker.walk(Some(entry), 10, &mut FixedRng::enter()).unwrap();

        assert_eq!(walk.labels(g.labels()), vec!["entry", "body"]);
        assert_eq!(walk.edges_visited, 2);
        assert_eq!(walk.max_stack_distance, 1);
    }

    #[test]
    fn skipping_the_call_goes_straight_to_return_site() {
        let (g, entry) = scenario();
        let walker = Walker::new(&g, TransitionPolicy::default());
        let walk = walker.walk(Some(entry), 10, &mut FixedRng::skip()).unwrap();

        assert_eq!(walk.labels(g.labels()), vec!["entry", "f"]);
        assert_eq!(walk.edges_visited, 1);
        assert_eq!(walk.max_stack_distance, 0);
    }

    #[test]
    fn markers_wrap_the_entered_call() {
        let (g, entry) = scenario();
        let policy = TransitionPolicy {
            enter_exit_markers: true,
            ..TransitionPolicy::default()
        };
        let walk = Walker::new(&g, policy)
            .walk(Some(entry), 10, &mut FixedRng::enter())
            .unwrap();
        // The exit marker fires at every dead end: once before the pop, once
        // at program entry.
        assert_eq!(
            walk.labels(g.labels()),
            vec!["entry", "F2V_ENTERFN", "body", "F2V_EXITFN", "F2V_EXITFN"]
        );
    }

    #[test]
    fn max_edges_truncates_the_walk() {
        let (g, entry) = scenario();
        let walker = Walker::new(&g, TransitionPolicy::default());
        let walk = walker.walk(Some(entry), 1, &mut FixedRng::enter()).unwrap();
        assert_eq!(walk.edges_visited, 1);
        assert_eq!(walk.labels(g.labels()), vec!["entry"]);
        assert!(walk.is_degenerate());
    }

    #[test]
    fn cycles_are_bounded_by_max_edges() {
        let mut b = GraphBuilder::new();
        let (x, y) = (b.node("f.0").unwrap(), b.node("f.1").unwrap());
        let l = b.label("tick").unwrap();
        b.add_edge(x, y, vec![l], None, "").unwrap();
        b.add_edge(y, x, vec![l], None, "").unwrap();
        let g = b.build();

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let walk = Walker::new(&g, TransitionPolicy::default())
            .walk(None, 25, &mut rng)
            .unwrap();
        assert_eq!(walk.edges_visited, 25);
        assert_eq!(walk.len(), 26);
    }

    #[test]
    fn unknown_start_label_is_an_error() {
        let (g, _) = scenario();
        let err = Walker::new(&g, TransitionPolicy::default())
            .walk(Some(LabelId(99)), 5, &mut FixedRng::enter())
            .unwrap_err();
        assert!(matches!(err, WalkError::UnknownLabel(LabelId(99))));
    }

    #[test]
    fn unlabeled_graph_yields_an_empty_walk() {
        let mut b = GraphBuilder::new();
        let (x, y) = (b.node("f.0").unwrap(), b.node("f.1").unwrap());
        b.add_edge(x, y, vec![], None, "").unwrap();
        let g = b.build();
        let walk = Walker::new(&g, TransitionPolicy::default())
            .walk(None, 5, &mut FixedRng::enter())
            .unwrap();
        assert!(walk.is_empty());
    }

    #[test]
    fn config_validation_rejects_degenerate_values() {
        assert!(WalkConfig::default().validate().is_ok());
        for bad in [
            WalkConfig { max_edges: 0, ..WalkConfig::default() },
            WalkConfig { walks_per_label: 0, ..WalkConfig::default() },
            WalkConfig { bias_constant: 0.0, ..WalkConfig::default() },
            WalkConfig { bias_constant: f64::NAN, ..WalkConfig::default() },
        ] {
            assert!(matches!(bad.validate(), Err(WalkError::InvalidConfig(_))));
        }
    }
}
