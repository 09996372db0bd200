use std::io::Write;

use nova_synth_config::{ConfigError, SynthConfig};
use pretty_assertions::assert_eq;

#[test]
fn empty_file_yields_defaults() {
    let config = SynthConfig::load_from_str("").expect("empty config");
    assert_eq!(config, SynthConfig::default());
    assert_eq!(config.search.max_depth, 1);
    assert_eq!(config.evaluation.batch_size, 100);
    assert_eq!(config.effects.access_threshold, 10);
}

#[test]
fn overrides_are_applied_per_section() {
    let text = r#"
        [search]
        max_depth = 2

        [evaluation]
        batch_size = 8
        timeout_ms = 250

        [effects]
        access_threshold = 3

        [denylist]
        classes = ["com.example.Dangerous"]
    "#;
    let config = SynthConfig::load_from_str(text).expect("config");
    assert_eq!(config.search.max_depth, 2);
    assert_eq!(config.evaluation.batch_size, 8);
    assert_eq!(config.evaluation.min_num_batches, 4);
    assert_eq!(
        config.evaluation.timeout(false),
        std::time::Duration::from_millis(250)
    );
    assert_eq!(
        config.evaluation.timeout(true),
        std::time::Duration::from_millis(5_000)
    );
    assert_eq!(config.effects.access_threshold, 3);
    assert!(config.denylist.denies_class("com.example.Dangerous"));
    assert!(!config.denylist.denies_class("codehint.CodeHint"));
    // Untouched tables keep their defaults.
    assert!(config.denylist.denies_method("java.io.File", "mkdirs"));
}

#[test]
fn load_from_path_reads_toml_file() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(file, "[logging]\nlevel = \"debug\"\njson = true").expect("write");

    let config = SynthConfig::load_from_path(file.path()).expect("config");
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("missing.toml");
    let err = SynthConfig::load_from_path(&path).unwrap_err();
    match err {
        ConfigError::Io { path: reported, .. } => {
            assert!(reported.ends_with("missing.toml"), "{reported}")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_keys_are_rejected() {
    let err = SynthConfig::load_from_str("[search]\nmax_dept = 3\n").unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)), "{err}");
}
