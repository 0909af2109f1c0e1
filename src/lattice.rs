use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::lexicon::Lexicon;
use crate::trace::{Trace, TraceRef};
use crate::{LabelIndex, Score, TimeframeIndex};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatticeState {
    pub id: usize,
    pub time: TimeframeIndex,
}

/// Arc weighted with the score gained along it. `label` is `None` for the
/// arcs into the final state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatticeArc {
    pub from: usize,
    pub to: usize,
    pub label: Option<LabelIndex>,
    pub symbol: Option<String>,
    pub score: Score,
}

/// Acyclic word graph recovered from traces and their sibling chains.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordLattice {
    pub states: Vec<LatticeState>,
    pub arcs: Vec<LatticeArc>,
    pub initial_state: usize,
    pub final_state: usize,
}

impl Default for WordLattice {
    fn default() -> Self {
        Self::empty()
    }
}

impl WordLattice {
    pub fn empty() -> Self {
        Self {
            states: vec![LatticeState { id: 0, time: 0 }],
            arcs: Vec::new(),
            initial_state: 0,
            final_state: 0,
        }
    }

    /// Builds a lattice whose final state closes `best` and every trace in
    /// `others`.
    pub fn from_traces<'a, I>(best: &TraceRef, others: I, lexicon: &Lexicon) -> Self
    where
        I: IntoIterator<Item = &'a TraceRef>,
    {
        let mut end = Trace::terminal(best);
        for other in others {
            if !Arc::ptr_eq(other, best) {
                Trace::attach_sibling(&mut end, Trace::terminal(other));
            }
        }
        Self::from_trace(&end, lexicon)
    }

    /// Maps every trace reachable from `end` through parents and siblings
    /// to a state. A node and the siblings behind it share one state; `end`
    /// becomes the final state and the root the initial one.
    pub fn from_trace(end: &TraceRef, lexicon: &Lexicon) -> Self {
        if end.is_root() {
            return Self::empty();
        }

        let mut state_of: HashMap<*const Trace, usize> = HashMap::new();
        let mut states = Vec::new();
        let mut members: Vec<&TraceRef> = Vec::new();
        let mut initial_state = None;
        let mut stack = vec![end];

        while let Some(node) = stack.pop() {
            if state_of.contains_key(&Arc::as_ptr(node)) {
                continue;
            }
            let id = states.len();
            states.push(LatticeState {
                id,
                time: node.time(),
            });
            let chain = std::iter::once(node).chain(node.siblings());
            for member in chain {
                if state_of.contains_key(&Arc::as_ptr(member)) {
                    continue;
                }
                state_of.insert(Arc::as_ptr(member), id);
                match member.parent() {
                    Some(parent) => {
                        members.push(member);
                        stack.push(parent);
                    }
                    None => initial_state = Some(id),
                }
            }
        }

        let mut arcs: Vec<LatticeArc> = members
            .iter()
            .filter_map(|member| {
                let parent = member.parent()?;
                Some(LatticeArc {
                    from: *state_of.get(&Arc::as_ptr(parent))?,
                    to: *state_of.get(&Arc::as_ptr(member))?,
                    label: member.label(),
                    symbol: member
                        .label()
                        .and_then(|l| lexicon.symbol(l))
                        .map(String::from),
                    score: member.score() - parent.score(),
                })
            })
            .collect();
        arcs.sort_by_key(|a| (a.from, a.to));

        Self {
            states,
            arcs,
            initial_state: initial_state.unwrap_or(0),
            final_state: 0,
        }
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn num_arcs(&self) -> usize {
        self.arcs.len()
    }

    pub fn arcs_from(&self, state: usize) -> impl Iterator<Item = &LatticeArc> {
        self.arcs.iter().filter(move |a| a.from == state)
    }

    pub fn arcs_into(&self, state: usize) -> impl Iterator<Item = &LatticeArc> {
        self.arcs.iter().filter(move |a| a.to == state)
    }
}
