mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{batch_log, rows, IndexScorer, ScriptedScorer, TableScorer};
use lexiconfree_search::scorer::HistoryPolicy;
use lexiconfree_search::{
    create_search, LabelScorer, Lexicon, SearchAlgorithm, SearchConfig, SearchKind,
};

fn beam_search(
    vocabulary: &[&str],
    config: SearchConfig,
    scorer: impl LabelScorer + 'static,
) -> Box<dyn SearchAlgorithm> {
    let lexicon = Arc::new(Lexicon::new(vocabulary.iter().copied()));
    let mut search = create_search(
        SearchConfig {
            kind: SearchKind::Beam,
            ..config
        },
        lexicon,
        Box::new(scorer),
    )
    .unwrap();
    search.enter_segment();
    search
}

fn beam_config(max_beam_size: usize) -> SearchConfig {
    SearchConfig {
        max_beam_size,
        ..Default::default()
    }
}

#[test]
fn recombined_paths_survive_as_siblings() {
    let scorer = TableScorer::new(HistoryPolicy::default()).order_free();
    let mut search = beam_search(&["a", "b"], beam_config(4), scorer);
    search.put_features(rows(&[&[1.0, 1.5], &[1.0, 1.0]]).view());

    assert!(search.decode_step().unwrap());
    assert_eq!(search.beam().len(), 2);
    assert!(search.decode_step().unwrap());

    // "a b" and "b a" end in the same context
    let beam = search.beam();
    assert_eq!(beam.len(), 3);
    let merged: Vec<_> = beam
        .iter()
        .filter(|h| h.scoring_context.labels() == Some(&[0, 1][..]))
        .collect();
    assert_eq!(merged.len(), 1);
    let survivor = merged[0];
    assert_eq!(survivor.labels(), vec![0, 1]);
    assert_eq!(survivor.score, 2.0);

    let siblings: Vec<_> = survivor.trace.siblings().collect();
    assert_eq!(siblings.len(), 1);
    assert_eq!(siblings[0].label(), Some(0));
    assert_eq!(siblings[0].parent().and_then(|p| p.label()), Some(1));
    assert_eq!(siblings[0].score(), 2.5);

    let lattice = search.current_best_lattice();
    assert_eq!(lattice.arcs_into(lattice.final_state).count(), 3);
    assert!((0..lattice.num_states()).any(|s| lattice.arcs_into(s).count() == 2));
}

#[test]
fn contexts_are_unique_after_each_step() {
    let scorer = TableScorer::new(HistoryPolicy::default()).order_free();
    let mut search = beam_search(&["a", "b", "c"], beam_config(20), scorer);
    search.put_features(rows(&[&[1.0, 1.2, 1.4], &[0.5, 0.6, 0.7], &[2.0, 1.0, 0.5]]).view());

    while search.decode_step().unwrap() {
        let contexts: HashSet<_> = search
            .beam()
            .iter()
            .map(|h| h.scoring_context.clone())
            .collect();
        assert_eq!(contexts.len(), search.beam().len());
    }
}

#[test]
fn scores_stay_aligned_with_requests() {
    let log = batch_log();
    let mut search = beam_search(
        &["a", "b", "c", "d"],
        beam_config(10),
        IndexScorer { log: log.clone() },
    );

    assert!(search.decode_step().unwrap());
    for hyp in search.beam() {
        assert_eq!(hyp.score, hyp.current_token.unwrap() as f32);
    }

    // After the first step the beam is ordered by token, so base `b` owns
    // requests 4b..4b+3.
    assert!(search.decode_step().unwrap());
    for hyp in search.beam() {
        let labels = hyp.labels();
        let (first, second) = (labels[0] as f32, labels[1] as f32);
        assert_eq!(hyp.score, first + first * 4.0 + second);
    }
    assert_eq!(*log.borrow(), vec![4, 16]);
}

#[test]
fn beam_never_exceeds_max_size() {
    let scorer = TableScorer::new(HistoryPolicy::default());
    let mut search = beam_search(&["a", "b", "c", "d", "e"], beam_config(3), scorer);
    search.put_features(
        rows(&[
            &[0.3, 0.1, 0.9, 0.4, 0.2],
            &[0.5, 0.5, 0.5, 0.5, 0.5],
            &[1.0, 0.2, 0.3, 0.1, 0.7],
            &[0.0, 0.0, 0.1, 0.2, 0.3],
        ])
        .view(),
    );

    let mut steps = 0;
    while search.decode_step().unwrap() {
        steps += 1;
        assert_eq!(search.beam().len(), 3);
        let scores: Vec<_> = search.beam().iter().map(|h| h.score).collect();
        assert!(scores.windows(2).all(|w| w[0] <= w[1]));
    }
    assert_eq!(steps, 4);
}

#[test]
fn costs_accumulate_along_paths() {
    let config = SearchConfig {
        max_beam_size: 4,
        use_blank: true,
        ..Default::default()
    };
    let scorer = ScriptedScorer::new(
        vec![
            vec![0.2, 0.5, 0.7],
            vec![0.1, 0.4, 0.3],
            vec![0.6, 0.2, 0.1],
        ],
        HistoryPolicy::default(),
    );
    let mut search = beam_search(&["<blank>", "a", "b"], config, scorer);

    let mut previous_best = 0.0;
    while search.decode_step().unwrap() {
        for hyp in search.beam() {
            let traceback = hyp.trace.perform_traceback();
            assert!(traceback.windows(2).all(|w| w[0].score <= w[1].score));
            assert_eq!(traceback.last().map(|i| i.score), Some(hyp.score));
        }
        let best = search.beam()[0].score;
        assert!(best >= previous_best);
        previous_best = best;
    }
}

#[test]
fn score_threshold_prunes_far_candidates() {
    let config = SearchConfig {
        max_beam_size: 10,
        score_threshold: Some(1.0),
        ..Default::default()
    };
    let mut search = beam_search(
        &["a", "b", "c"],
        config,
        TableScorer::new(HistoryPolicy::default()),
    );
    search.put_features(rows(&[&[0.0, 0.5, 2.0]]).view());

    assert!(search.decode_step().unwrap());
    let tokens: Vec<_> = search.beam().iter().map(|h| h.current_token).collect();
    assert_eq!(tokens, vec![Some(0), Some(1)]);
}

#[test]
fn not_ready_keeps_beam() {
    let mut search = beam_search(
        &["a", "b"],
        beam_config(2),
        TableScorer::new(HistoryPolicy::default()),
    );
    search.put_features(rows(&[&[0.4, 0.6]]).view());
    assert!(search.decode_step().unwrap());

    let before: Vec<_> = search.beam().iter().map(|h| (h.labels(), h.score)).collect();
    assert!(!search.decode_step().unwrap());
    let after: Vec<_> = search.beam().iter().map(|h| (h.labels(), h.score)).collect();
    assert_eq!(before, after);

    search.put_features(rows(&[&[0.1, 0.2]]).view());
    assert!(search.decode_step().unwrap());
    assert_eq!(search.beam()[0].labels().len(), 2);
}

#[test]
fn finished_hypotheses_compete_for_the_beam() {
    let config = SearchConfig {
        max_beam_size: 2,
        use_sentence_end: true,
        ..Default::default()
    };
    let mut search = beam_search(
        &["a", "</s>"],
        config,
        TableScorer::new(HistoryPolicy::default()),
    );
    search.put_features(rows(&[&[1.0, 0.5], &[1.0, 1.0]]).view());

    assert!(search.decode_step().unwrap());
    assert!(search.decode_step().unwrap());
    let beam = search.beam();
    assert_eq!(beam.len(), 2);
    assert!(!beam[0].active);
    assert_eq!(beam[0].labels(), vec![1]);
    assert_eq!(beam[1].labels(), vec![0, 0]);

    let best: Vec<_> = search
        .current_best_traceback()
        .iter()
        .map(|i| i.label)
        .collect();
    assert_eq!(best, vec![1]);

    let lattice = search.current_best_lattice();
    assert_eq!(lattice.arcs_into(lattice.final_state).count(), 2);
}

#[test]
fn search_stops_once_every_hypothesis_ended() {
    let config = SearchConfig {
        max_beam_size: 1,
        use_sentence_end: true,
        ..Default::default()
    };
    let mut search = beam_search(
        &["a", "</s>"],
        config,
        TableScorer::new(HistoryPolicy::default()),
    );
    search.put_features(rows(&[&[1.0, 0.1], &[1.0, 0.1]]).view());

    assert!(search.decode_step().unwrap());
    assert!(!search.decode_step().unwrap());
    search.finish_segment().unwrap();
    assert_eq!(search.current_best_traceback().len(), 1);
}

#[test]
fn reset_starts_from_empty_hypothesis() {
    let mut search = beam_search(
        &["a", "b"],
        beam_config(2),
        TableScorer::new(HistoryPolicy::default()),
    );
    search.put_features(rows(&[&[0.4, 0.6]]).view());
    search.finish_segment().unwrap();
    assert_eq!(search.beam().len(), 2);

    search.reset();
    assert_eq!(search.beam().len(), 1);
    assert!(search.beam()[0].labels().is_empty());
    assert!(search.current_best_traceback().is_empty());
    assert!(!search.decode_step().unwrap());
}

#[test]
fn stable_traceback_is_shared_prefix() {
    let mut search = beam_search(
        &["a", "b"],
        beam_config(2),
        TableScorer::new(HistoryPolicy::default()),
    );
    search.put_features(rows(&[&[0.1, 1.0], &[0.1, 0.9]]).view());

    assert!(search.decode_step().unwrap());
    assert!(search.current_stable_traceback().is_empty());

    assert!(search.decode_step().unwrap());
    let labels: Vec<_> = search.beam().iter().map(|h| h.labels()).collect();
    assert_eq!(labels, vec![vec![0, 0], vec![0, 1]]);
    let stable = search.current_stable_traceback();
    assert_eq!(stable.len(), 1);
    assert_eq!(stable[0].label, 0);
    assert_eq!(stable[0].time, 1);
    assert!((stable[0].score - 0.1).abs() < 1e-6);
}

#[test]
fn maximum_stable_delay_drops_diverged_paths() {
    let features = rows(&[&[0.1, 0.2], &[0.0, 1.0]]);

    let mut unpruned = beam_search(
        &["a", "b"],
        beam_config(2),
        TableScorer::new(HistoryPolicy::default()),
    );
    unpruned.put_features(features.view());
    assert_eq!(unpruned.decode_many_steps().unwrap(), 2);
    assert_eq!(unpruned.beam().len(), 2);

    let config = SearchConfig {
        maximum_stable_delay: Some(2),
        maximum_stable_delay_pruning_interval: 1,
        ..beam_config(2)
    };
    let mut search = beam_search(
        &["a", "b"],
        config,
        TableScorer::new(HistoryPolicy::default()),
    );
    search.put_features(features.view());

    assert!(search.decode_step().unwrap());
    assert_eq!(search.beam().len(), 2);
    assert!(search.decode_step().unwrap());
    assert_eq!(search.beam().len(), 1);
    assert_eq!(search.beam()[0].labels(), vec![0, 0]);
    assert_eq!(search.current_stable_traceback(), search.current_best_traceback());
}

#[test]
fn label_loop_after_recombination_keeps_lattice_current() {
    let config = SearchConfig {
        max_beam_size: 4,
        allow_label_loop: true,
        score_threshold: Some(3.0),
        ..Default::default()
    };
    let scorer = TableScorer::new(HistoryPolicy::default()).order_free();
    let mut search = beam_search(&["a", "b"], config, scorer);
    search.put_features(rows(&[&[1.0, 1.5], &[1.0, 0.5], &[10.0, 0.0]]).view());

    // "a b" absorbs "b a" as a sibling
    assert!(search.decode_step().unwrap());
    assert!(search.decode_step().unwrap());
    let merged = search
        .beam()
        .iter()
        .find(|h| h.labels() == vec![0, 1])
        .unwrap();
    assert_eq!(merged.trace.siblings().count(), 1);

    // "a b" loops on b and absorbs the fresh "a b" from the looped "a"
    assert!(search.decode_step().unwrap());
    let survivor = &search.beam()[0];
    assert_eq!(survivor.labels(), vec![0, 1]);
    assert_eq!(survivor.score, 1.5);
    assert_eq!(survivor.trace.time(), 3);
    let siblings: Vec<_> = survivor.trace.siblings().collect();
    assert_eq!(siblings.len(), 1);
    assert_eq!(siblings[0].score(), 2.0);
    assert_eq!(siblings[0].time(), 3);

    let lattice = search.current_best_lattice();
    assert_eq!(lattice.num_states(), 6);
    assert_eq!(lattice.num_arcs(), 7);
    let merged_states: Vec<_> = (0..lattice.num_states())
        .filter(|&s| s != lattice.final_state && lattice.arcs_into(s).count() == 2)
        .collect();
    assert_eq!(merged_states.len(), 1);
    let merged_state = merged_states[0];
    let mut into_merged: Vec<_> = lattice.arcs_into(merged_state).map(|a| a.score).collect();
    into_merged.sort_by(|a, b| a.total_cmp(b));
    assert_eq!(into_merged, vec![0.0, 0.5]);
}
