//! Configuration loading and environment override tests
//!
//! Tests that touch `LOGITRACK_*` variables are marked #[serial] so they do
//! not race each other.

use logitrack_common::config::IngestConfig;
use logitrack_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;

const OVERRIDE_VARS: [&str; 6] = [
    "LOGITRACK_ENABLED",
    "LOGITRACK_LIVE_MODE",
    "LOGITRACK_AIS_API_KEY",
    "LOGITRACK_HF_API_KEY",
    "LOGITRACK_QUOTA_PER_CYCLE",
    "LOGITRACK_CYCLE_INTERVAL_SECS",
];

fn clear_env() {
    for var in OVERRIDE_VARS {
        env::remove_var(var);
    }
}

#[test]
fn test_load_explicit_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        enabled = true
        live_mode = false
        queue_capacity = 64

        [synthetic]
        interval_ms = 250
        seed = 7
        "#
    )
    .unwrap();

    let config = IngestConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.queue_capacity, 64);
    assert_eq!(config.synthetic.interval_ms, 250);
    assert_eq!(config.synthetic.seed, Some(7));
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_missing_explicit_file_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");

    let err = IngestConfig::load(Some(&missing)).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
#[serial]
fn test_env_overrides_apply() {
    clear_env();
    env::set_var("LOGITRACK_LIVE_MODE", "true");
    env::set_var("LOGITRACK_AIS_API_KEY", "ais-key");
    env::set_var("LOGITRACK_HF_API_KEY", "hf-key");
    env::set_var("LOGITRACK_QUOTA_PER_CYCLE", "0");
    env::set_var("LOGITRACK_CYCLE_INTERVAL_SECS", "15");

    let mut config = IngestConfig::default();
    config.apply_env_overrides().unwrap();
    clear_env();

    assert!(config.live_mode);
    assert_eq!(config.feed.api_key.as_deref(), Some("ais-key"));
    assert_eq!(config.classifier.api_key.as_deref(), Some("hf-key"));
    assert_eq!(config.classifier.quota_per_cycle, 0);
    assert_eq!(config.cycle_interval_secs, 15);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_env_override_rejects_bad_boolean() {
    clear_env();
    env::set_var("LOGITRACK_ENABLED", "perhaps");

    let mut config = IngestConfig::default();
    let result = config.apply_env_overrides();
    clear_env();

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_blank_env_values_are_ignored() {
    clear_env();
    env::set_var("LOGITRACK_HF_API_KEY", "   ");

    let mut config = IngestConfig::default();
    config.classifier.api_key = Some("from-toml".to_string());
    config.apply_env_overrides().unwrap();
    clear_env();

    assert_eq!(config.classifier.api_key.as_deref(), Some("from-toml"));
}
