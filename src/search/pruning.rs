use std::collections::HashMap;

use super::hypothesis::LabelHypothesis;
use crate::scorer::ScoringContextRef;
use crate::trace::Trace;
use crate::Score;

/// Drops items scoring worse than `best + threshold`. Order is kept.
pub fn score_pruning<T, F>(items: &mut Vec<T>, threshold: Score, score: F)
where
    F: Fn(&T) -> Score,
{
    let Some(best) = items.iter().map(&score).min_by(|a, b| a.total_cmp(b)) else {
        return;
    };
    let limit = best + threshold;
    items.retain(|item| score(item) <= limit);
}

/// Keeps the `max_size` best items.
///
/// Selection is linear on average. Equal scores prefer the earlier item and
/// survivors stay in their original order.
pub fn beam_size_pruning<T, F>(items: &mut Vec<T>, max_size: usize, score: F)
where
    F: Fn(&T) -> Score,
{
    if items.len() <= max_size {
        return;
    }
    if max_size == 0 {
        items.clear();
        return;
    }

    let mut keys: Vec<(Score, usize)> = items.iter().map(&score).zip(0..).collect();
    keys.select_nth_unstable_by(max_size - 1, |a, b| {
        a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
    });

    let mut keep = vec![false; items.len()];
    for &(_, index) in &keys[..max_size] {
        keep[index] = true;
    }
    let mut flags = keep.into_iter();
    items.retain(|_| flags.next().unwrap_or(false));
}

/// Merges hypotheses with equal scoring contexts.
///
/// The lowest raw score represents each context; the traces of the others
/// are attached as its siblings so the lattice keeps them.
pub fn recombine(hypotheses: Vec<LabelHypothesis>) -> Vec<LabelHypothesis> {
    let mut merged: Vec<LabelHypothesis> = Vec::with_capacity(hypotheses.len());
    let mut seen: HashMap<ScoringContextRef, usize> = HashMap::with_capacity(hypotheses.len());

    for hyp in hypotheses {
        match seen.get(&hyp.scoring_context).copied() {
            None => {
                seen.insert(hyp.scoring_context.clone(), merged.len());
                merged.push(hyp);
            }
            Some(slot) => {
                let existing = &mut merged[slot];
                if hyp.score < existing.score {
                    let mut better = hyp;
                    let demoted = existing.trace.clone();
                    Trace::attach_sibling(&mut better.trace, demoted);
                    *existing = better;
                } else {
                    Trace::attach_sibling(&mut existing.trace, hyp.trace);
                }
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_pruning_keeps_within_threshold() {
        let mut scores = vec![0.0, 0.5, 2.0];
        score_pruning(&mut scores, 1.0, |s| *s);
        assert_eq!(scores, vec![0.0, 0.5]);
    }

    #[test]
    fn beam_pruning_keeps_lowest_in_order() {
        let mut scores = vec![3.0, 1.0, 4.0, 1.0, 5.0, 0.5];
        beam_size_pruning(&mut scores, 3, |s| *s);
        assert_eq!(scores, vec![1.0, 1.0, 0.5]);
    }

    #[test]
    fn beam_pruning_breaks_ties_by_position() {
        let mut items = vec![(1.0, 'a'), (1.0, 'b'), (1.0, 'c')];
        beam_size_pruning(&mut items, 2, |i| i.0);
        assert_eq!(items, vec![(1.0, 'a'), (1.0, 'b')]);
    }

    #[test]
    fn small_inputs_untouched() {
        let mut empty: Vec<f32> = Vec::new();
        score_pruning(&mut empty, 1.0, |s| *s);
        beam_size_pruning(&mut empty, 2, |s| *s);
        assert!(empty.is_empty());

        let mut two = vec![2.0, 1.0];
        beam_size_pruning(&mut two, 2, |s| *s);
        assert_eq!(two, vec![2.0, 1.0]);
    }
}
