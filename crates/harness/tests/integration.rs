//! Integration tests for the harness CLI configuration.

use std::path::PathBuf;

use qisabelle::SessionConfig;
use search::SearchConfig;

fn harness_toml_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("configs/harness.toml")
}

fn load_value() -> toml::Value {
    let contents = std::fs::read_to_string(harness_toml_path()).unwrap();
    toml::from_str(&contents).unwrap()
}

/// The shipped `configs/harness.toml` parses and has every section.
#[test]
fn test_real_harness_toml_is_valid() {
    let value = load_value();
    for section in ["session", "search", "extraction"] {
        assert!(value.get(section).is_some(), "missing [{section}]");
    }
    let extraction = &value["extraction"];
    assert!(extraction["num_workers"].as_integer().unwrap() > 0);
    assert!(extraction["afp_dir"].as_str().is_some());
}

/// The `[session]` and `[search]` sections deserialize into the library configs
/// and agree with their built-in defaults.
#[test]
fn test_real_harness_toml_matches_defaults() {
    let value = load_value();

    let session: SessionConfig = value["session"].clone().try_into().unwrap();
    let defaults = SessionConfig::default();
    assert_eq!(session.port, defaults.port);
    assert_eq!(session.per_transition_timeout_secs, defaults.per_transition_timeout_secs);
    assert_eq!(session.open_timeout_secs, defaults.open_timeout_secs);
    assert_eq!(session.hammer_timeout_secs, defaults.hammer_timeout_secs);

    let search: SearchConfig = value["search"].clone().try_into().unwrap();
    let defaults = SearchConfig::default();
    assert!((search.max_proof_search_time_secs - defaults.max_proof_search_time_secs).abs() < 1e-9);
    assert_eq!(search.hammer_token, defaults.hammer_token);
    assert_eq!(search.initial_state_name, defaults.initial_state_name);
    assert!(search.hammer_deleted_facts.is_empty());
}
