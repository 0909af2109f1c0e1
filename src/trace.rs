use std::sync::Arc;

use serde::Serialize;

use crate::{LabelIndex, Score, TimeframeIndex};

pub type TraceRef = Arc<Trace>;

/// One decision point on a hypothesis path.
///
/// `score` is cumulative. `sibling` chains alternative paths that were
/// recombined into the same search state; the head of the chain is the
/// best one. Nodes are shared and never mutated once another owner can see
/// them: changes go through [`Arc::make_mut`], which copies shared nodes.
#[derive(Debug, Clone)]
pub struct Trace {
    parent: Option<TraceRef>,
    sibling: Option<TraceRef>,
    label: Option<LabelIndex>,
    time: TimeframeIndex,
    score: Score,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TracebackItem {
    pub label: LabelIndex,
    pub time: TimeframeIndex,
    pub score: Score,
}

/// Root-to-leaf path of a hypothesis.
pub type Traceback = Vec<TracebackItem>;

impl Trace {
    pub fn root() -> TraceRef {
        Arc::new(Self {
            parent: None,
            sibling: None,
            label: None,
            time: 0,
            score: 0.0,
        })
    }

    pub fn append(
        parent: &TraceRef,
        label: LabelIndex,
        time: TimeframeIndex,
        score: Score,
    ) -> TraceRef {
        Arc::new(Self {
            parent: Some(Arc::clone(parent)),
            sibling: None,
            label: Some(label),
            time,
            score,
        })
    }

    /// Label-free node closing a path, used for lattice end states.
    pub(crate) fn terminal(parent: &TraceRef) -> TraceRef {
        Arc::new(Self {
            parent: Some(Arc::clone(parent)),
            sibling: None,
            label: None,
            time: parent.time,
            score: parent.score,
        })
    }

    /// Replaces score and time of the last node after a loop transition.
    ///
    /// The node stays in place on the path; if anyone else still holds it a
    /// copy is made. Siblings recombined into the old node are not carried
    /// over: their scores belong to the pre-loop state.
    pub fn update_loop_score(trace: &TraceRef, score: Score, time: TimeframeIndex) -> TraceRef {
        let mut updated = Arc::clone(trace);
        let node = Arc::make_mut(&mut updated);
        node.score = score;
        node.time = time;
        node.sibling = None;
        updated
    }

    /// Adds `sibling` (and any chain it already carries) right behind the
    /// head of `representative`'s sibling chain.
    pub fn attach_sibling(representative: &mut TraceRef, sibling: TraceRef) {
        let head = Arc::make_mut(representative);
        let tail = head.sibling.take();
        head.sibling = Some(Self::with_tail(sibling, tail));
    }

    fn with_tail(mut node: TraceRef, tail: Option<TraceRef>) -> TraceRef {
        if tail.is_none() {
            return node;
        }
        let inner = Arc::make_mut(&mut node);
        inner.sibling = match inner.sibling.take() {
            Some(next) => Some(Self::with_tail(next, tail)),
            None => tail,
        };
        node
    }

    pub fn parent(&self) -> Option<&TraceRef> {
        self.parent.as_ref()
    }

    pub fn sibling(&self) -> Option<&TraceRef> {
        self.sibling.as_ref()
    }

    pub fn label(&self) -> Option<LabelIndex> {
        self.label
    }

    pub fn time(&self) -> TimeframeIndex {
        self.time
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// The sibling chain behind this node, excluding the node itself.
    pub fn siblings(&self) -> impl Iterator<Item = &TraceRef> {
        std::iter::successors(self.sibling.as_ref(), |t| t.sibling.as_ref())
    }

    /// Walks parents back to the root and returns the labelled nodes in
    /// path order.
    pub fn perform_traceback(&self) -> Traceback {
        let mut items = Vec::new();
        let mut current = Some(self);
        while let Some(node) = current {
            if let Some(label) = node.label {
                items.push(TracebackItem {
                    label,
                    time: node.time,
                    score: node.score,
                });
            }
            current = node.parent.as_deref();
        }
        items.reverse();
        items
    }
}

impl Drop for Trace {
    // Unlinks long parent chains iteratively instead of recursing once per node.
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut inner) => next = inner.parent.take(),
                Err(_) => break,
            }
        }
    }
}
