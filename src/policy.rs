//! Stack-aware transition policy.
//!
//! One call to [`TransitionPolicy::step`] moves a walk by one transition:
//! either along an edge (possibly pushing a return site) or, at a dead end,
//! by popping the stack or jumping to a may-return target.
//!
//! The order of random draws per step is fixed: call-site coin flip (call
//! sites only), neighbor choice (unless the call was skipped), then either
//! the parallel-edge choice or the may-return choice. Reproducibility of a
//! seeded walk depends on keeping this order.

use crate::error::{Result, WalkError};
use crate::graph::{CallGraph, LabelId, NodeId};
use crate::random_walk::WalkConfig;
use rand::prelude::*;

pub const ENTER_MARKER: &str = "F2V_ENTERFN";
pub const EXIT_MARKER: &str = "F2V_EXITFN";

/// Probability of entering a call at the given stack distance.
///
/// `min(0.5, 1 / bias_constant ^ distance)`: a fair coin at the top level
/// that decays with depth when `bias_constant > 1`.
pub fn enter_probability(bias_constant: f64, distance: usize) -> f64 {
    let exp = distance.min(i32::MAX as usize) as i32;
    (1.0 / bias_constant.powi(exp)).min(0.5)
}

/// One emitted item of a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    Label(LabelId),
    Enter,
    Exit,
}

/// `(calls, returns)` counters of a walk. Only `calls` feeds the bias.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackDistance {
    pub calls: usize,
    pub returns: usize,
}

impl StackDistance {
    pub fn distance(&self) -> usize {
        self.calls
    }
}

/// Outcome of one coin flip at a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallChoice {
    /// Follow the call: the return node is removed from the candidates.
    Enter,
    /// Skip the call: the return node is the only candidate.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Active(NodeId),
    Dead,
}

/// Candidate successors after call-site restriction. Borrowed from the
/// graph, never allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidates<'a> {
    All(&'a [NodeId]),
    Without(&'a [NodeId], NodeId),
    Only(NodeId),
}

impl<'a> Candidates<'a> {
    pub fn restrict(neighbors: &'a [NodeId], return_node: NodeId, choice: CallChoice) -> Self {
        match choice {
            CallChoice::Enter => Candidates::Without(neighbors, return_node),
            CallChoice::Skip => Candidates::Only(return_node),
        }
    }

    pub fn len(&self) -> usize {
        match *self {
            Candidates::All(nbrs) => nbrs.len(),
            Candidates::Without(nbrs, excluded) => {
                nbrs.len() - usize::from(nbrs.contains(&excluded))
            }
            Candidates::Only(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Option<NodeId> {
        match *self {
            Candidates::All(nbrs) => nbrs.get(i).copied(),
            Candidates::Without(nbrs, excluded) => {
                nbrs.iter().copied().filter(|&n| n != excluded).nth(i)
            }
            Candidates::Only(n) => (i == 0).then_some(n),
        }
    }

    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<NodeId> {
        match *self {
            Candidates::All(nbrs) => nbrs.choose(rng).copied(),
            Candidates::Without(..) => match self.len() {
                0 => None,
                len => self.get(rng.random_range(0..len)),
            },
            Candidates::Only(n) => Some(n),
        }
    }
}

/// Mutable per-walk state: the call stack, distance counters and the tokens
/// emitted so far. Owned by exactly one walk.
#[derive(Debug, Clone, Default)]
pub struct WalkState {
    pub stack: Vec<NodeId>,
    pub distance: StackDistance,
    pub max_stack_distance: usize,
    pub tokens: Vec<Token>,
    pub edges_visited: usize,
}

impl WalkState {
    pub fn new(seed_labels: &[LabelId]) -> Self {
        Self {
            tokens: seed_labels.iter().copied().map(Token::Label).collect(),
            ..Self::default()
        }
    }

    fn note_distance(&mut self) {
        if self.distance.distance() > self.max_stack_distance {
            self.max_stack_distance = self.distance.distance();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionPolicy {
    pub interprocedural: bool,
    pub enter_exit_markers: bool,
    pub bias_constant: f64,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self {
            interprocedural: true,
            enter_exit_markers: false,
            bias_constant: 1.0,
        }
    }
}

impl From<&WalkConfig> for TransitionPolicy {
    fn from(config: &WalkConfig) -> Self {
        Self {
            interprocedural: config.interprocedural,
            enter_exit_markers: config.enter_exit_markers,
            bias_constant: config.bias_constant,
        }
    }
}

impl TransitionPolicy {
    pub fn decide_call<R: Rng + ?Sized>(&self, distance: usize, rng: &mut R) -> CallChoice {
        if rng.random::<f64>() < enter_probability(self.bias_constant, distance) {
            CallChoice::Enter
        } else {
            CallChoice::Skip
        }
    }

    /// Advances the walk by one transition from `current`.
    pub fn step<G, R>(
        &self,
        graph: &G,
        current: NodeId,
        state: &mut WalkState,
        rng: &mut R,
    ) -> Result<Step>
    where
        G: CallGraph + ?Sized,
        R: Rng + ?Sized,
    {
        let neighbors = graph.neighbors(current)?;
        let attrs = graph.node_attrs(current)?;

        let candidates = match attrs.return_node {
            Some(ret) => {
                let choice = self.decide_call(state.distance.distance(), rng);
                Candidates::restrict(neighbors, ret, choice)
            }
            None => Candidates::All(neighbors),
        };

        let Some(next) = candidates.choose(rng) else {
            return Ok(self.dead_end(attrs.may_return_targets, state, rng));
        };

        let edges = graph.edge_variants(current, next)?;
        let Some(edge) = edges.choose(rng) else {
            return Err(WalkError::invariant(
                current,
                format!("candidate {next} is not a successor"),
            ));
        };

        state.edges_visited += 1;
        state
            .tokens
            .extend(edge.labels.iter().copied().map(Token::Label));

        if let Some(ret) = edge.push {
            if self.enter_exit_markers {
                state.tokens.push(Token::Enter);
            }
            state.stack.push(ret);
            state.distance.calls += 1;
            state.note_distance();
        }
        Ok(Step::Active(next))
    }

    fn dead_end<R: Rng + ?Sized>(
        &self,
        may_return: &[NodeId],
        state: &mut WalkState,
        rng: &mut R,
    ) -> Step {
        if self.enter_exit_markers {
            state.tokens.push(Token::Exit);
        }
        if !self.interprocedural {
            return Step::Dead;
        }
        match state.stack.pop() {
            Some(ret) => {
                state.distance.calls -= 1;
                Step::Active(ret)
            }
            // Empty stack: the real caller is unknown, so return to any
            // statically possible one. No candidates means program entry.
            None => match may_return.choose(rng) {
                Some(&target) => {
                    state.distance.returns += 1;
                    state.note_distance();
                    Step::Active(target)
                }
                None => Step::Dead,
            },
        }
    }
}
