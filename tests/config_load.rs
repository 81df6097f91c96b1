// tests/config_load.rs
//
// Config loading from an explicit path plus env overrides.
// Env mutation is process-global, so these tests run serially.

use serial_test::serial;
use std::io::Write;

use event_correlator::config::{
    CorrelationConfig, ENV_CONFIG_PATH, ENV_MIN_CONFIDENCE, ENV_SIMILARITY_THRESHOLD,
    ENV_SPIKE_MULTIPLIER,
};

fn clear_env() {
    for k in [ENV_CONFIG_PATH, ENV_MIN_CONFIDENCE, ENV_SIMILARITY_THRESHOLD, ENV_SPIKE_MULTIPLIER] {
        std::env::remove_var(k);
    }
}

#[test]
#[serial]
fn loads_from_env_path() {
    clear_env();
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        f,
        r#"
[signals]
market_move = 2.5

[topics]
topics = ["oil", "gas"]
suppressed = ["gas"]
"#
    )
    .unwrap();
    std::env::set_var(ENV_CONFIG_PATH, f.path());

    let cfg = CorrelationConfig::load().unwrap();
    assert!((cfg.signals.market_move - 2.5).abs() < 1e-9);
    assert_eq!(cfg.topics.active_topics(), vec!["oil".to_string()]);
    // untouched sections keep defaults
    assert!((cfg.velocity.spike_floor - 6.0).abs() < 1e-9);
    clear_env();
}

#[test]
#[serial]
fn missing_file_falls_back_to_defaults() {
    clear_env();
    std::env::set_var(ENV_CONFIG_PATH, "/no/such/correlation.toml");
    let cfg = CorrelationConfig::load().unwrap();
    assert!((cfg.clustering.similarity_threshold - 0.5).abs() < 1e-9);
    clear_env();
}

#[test]
#[serial]
fn env_overrides_apply_and_clamp() {
    clear_env();
    std::env::set_var(ENV_CONFIG_PATH, "/no/such/correlation.toml");
    std::env::set_var(ENV_SIMILARITY_THRESHOLD, "0.65");
    std::env::set_var(ENV_MIN_CONFIDENCE, "7");
    std::env::set_var(ENV_SPIKE_MULTIPLIER, "0.5"); // below 1.0 is ignored
    let cfg = CorrelationConfig::load().unwrap();
    assert!((cfg.clustering.similarity_threshold - 0.65).abs() < 1e-9);
    assert!((cfg.signals.min_confidence - 1.0).abs() < 1e-9);
    assert!((cfg.velocity.spike_multiplier - 3.0).abs() < 1e-9);

    std::env::set_var(ENV_SPIKE_MULTIPLIER, "4");
    let cfg = CorrelationConfig::load().unwrap();
    assert!((cfg.velocity.spike_multiplier - 4.0).abs() < 1e-9);
    clear_env();
}

#[test]
#[serial]
fn invalid_file_is_an_error() {
    clear_env();
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "[velocity]\nspike_multiplier = 0.2").unwrap();
    std::env::set_var(ENV_CONFIG_PATH, f.path());
    assert!(CorrelationConfig::load().is_err());
    clear_env();
}

#[test]
#[serial]
fn shipped_config_parses() {
    clear_env();
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/correlation.toml");
    let cfg = CorrelationConfig::from_path(&path).unwrap();
    let defaults = CorrelationConfig::default();
    assert_eq!(cfg.topics.active_topics(), defaults.topics.active_topics());
    assert_eq!(cfg.sources.tiers, defaults.sources.tiers);
    assert_eq!(cfg.entities.symbols, defaults.entities.symbols);
    assert_eq!(cfg.dedup.ttl_by_type, defaults.dedup.ttl_by_type);
}
