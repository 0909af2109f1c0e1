use std::io::Write;
use std::sync::Arc;

use lexiconfree_search::scorer::StepwiseNoOpLabelScorer;
use lexiconfree_search::{create_search, Lexicon, SearchConfig, SearchError, SearchKind};

fn config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn json_config_uses_kebab_case_and_defaults() {
    let file = config_file(
        r#"{
            "kind": "labelsync",
            "max-beam-size": 8,
            "score-threshold": 12.5,
            "use-sentence-end": true,
            "maximum-stable-delay": 5
        }"#,
    );
    let config = SearchConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.kind, SearchKind::Labelsync);
    assert_eq!(config.max_beam_size, 8);
    assert_eq!(config.score_threshold, Some(12.5));
    assert!(config.use_sentence_end);
    assert_eq!(config.maximum_stable_delay, Some(5));
    assert_eq!(config.length_norm_scale, 0.0);
    assert_eq!(config.cache_cleanup_interval, 1);
}

#[test]
fn json_config_is_validated() {
    let file = config_file(r#"{"max-beam-size": 0}"#);
    assert!(matches!(
        SearchConfig::from_json_file(file.path()),
        Err(SearchError::InvalidConfig(_))
    ));

    let file = config_file(r#"{"kind": "viterbi"}"#);
    assert!(matches!(
        SearchConfig::from_json_file(file.path()),
        Err(SearchError::Json(_))
    ));
}

#[test]
fn missing_config_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = SearchConfig::from_json_file(dir.path().join("missing.json"));
    assert!(matches!(result, Err(SearchError::Io(_))));
}

#[test]
fn env_overrides() {
    let prefix = "LEXICONFREE_CONFIG_TEST_";
    std::env::set_var(format!("{prefix}KIND"), "greedy");
    std::env::set_var(format!("{prefix}MAX_BEAM_SIZE"), "16");
    std::env::set_var(format!("{prefix}USE_BLANK"), "yes");
    std::env::set_var(format!("{prefix}SCORE_THRESHOLD"), "none");
    std::env::set_var(format!("{prefix}LENGTH_NORM_SCALE"), "0.5");
    std::env::set_var(format!("{prefix}CACHE_CLEANUP_INTERVAL"), "not-a-number");

    let mut config = SearchConfig {
        score_threshold: Some(3.0),
        ..Default::default()
    };
    config.apply_env_overrides(prefix);
    assert_eq!(config.kind, SearchKind::Greedy);
    assert_eq!(config.max_beam_size, 16);
    assert!(config.use_blank);
    assert_eq!(config.score_threshold, None);
    assert_eq!(config.length_norm_scale, 0.5);
    assert_eq!(config.cache_cleanup_interval, 1);
}

#[test]
fn special_tokens_resolution() {
    let lexicon = Lexicon::new(["<blank>", "a", "</s>"]);

    let config = SearchConfig {
        use_blank: true,
        use_sentence_end: true,
        ..Default::default()
    };
    let tokens = config.special_tokens(&lexicon).unwrap();
    assert_eq!(tokens.blank, Some(0));
    assert_eq!(tokens.sentence_end, Some(2));

    let config = SearchConfig {
        use_blank: true,
        blank_label_index: Some(1),
        ..Default::default()
    };
    assert_eq!(config.special_tokens(&lexicon).unwrap().blank, Some(1));

    let config = SearchConfig {
        use_blank: true,
        blank_label_index: Some(7),
        ..Default::default()
    };
    assert!(matches!(
        config.special_tokens(&lexicon),
        Err(SearchError::UnknownToken(_))
    ));

    let plain = Lexicon::new(["a", "b"]);
    let config = SearchConfig {
        use_sentence_end: true,
        ..Default::default()
    };
    assert!(matches!(
        config.special_tokens(&plain),
        Err(SearchError::MissingSpecialToken("sentence-end"))
    ));
}

#[test]
fn create_search_rejects_bad_setups() {
    let lexicon = Arc::new(Lexicon::new(["a", "b"]));
    let bad = SearchConfig {
        cache_cleanup_interval: 0,
        ..Default::default()
    };
    let result = create_search(
        bad,
        Arc::clone(&lexicon),
        Box::new(StepwiseNoOpLabelScorer::new()),
    );
    assert!(matches!(result, Err(SearchError::InvalidConfig(_))));

    let empty = Arc::new(Lexicon::new(Vec::<String>::new()));
    let result = create_search(
        SearchConfig::default(),
        empty,
        Box::new(StepwiseNoOpLabelScorer::new()),
    );
    assert!(matches!(result, Err(SearchError::InvalidConfig(_))));

    for kind in [
        SearchKind::Beam,
        SearchKind::Greedy,
        SearchKind::Labelsync,
        SearchKind::NonAutoregressive,
    ] {
        let config = SearchConfig {
            kind,
            ..Default::default()
        };
        let search = create_search(
            config,
            Arc::clone(&lexicon),
            Box::new(StepwiseNoOpLabelScorer::new()),
        )
        .unwrap();
        assert_eq!(search.kind(), kind);
    }
}
