use std::sync::Arc;

use nova_synth_config::{init_tracing, LoggingConfig};

#[test]
fn init_tracing_installs_once_and_buffers_lines() {
    let logging = LoggingConfig {
        level: "debug".to_owned(),
        stderr: false,
        ..LoggingConfig::default()
    };
    let first = init_tracing(&logging);
    let second = init_tracing(&LoggingConfig::default());
    assert!(Arc::ptr_eq(&first, &second));

    tracing::info!(target: "nova.synth", batch = 3, "suite marker line");
    let lines = first.last_lines(64);
    assert!(
        lines.iter().any(|line| line.contains("suite marker line") && line.contains("batch=3")),
        "{lines:?}"
    );
}
