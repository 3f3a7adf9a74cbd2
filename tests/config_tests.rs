//! Configuration loading from files.

use std::io::Write;

use agent_turn::config::AgentConfig;
use agent_turn::error::AgentError;
use agent_turn::types::ReasoningEffort;
use pretty_assertions::assert_eq;

#[test]
fn loads_every_section_from_a_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
model = "gpt-4.1"
reasoning_effort = "medium"
dry_run = true
flush_delay_ms = 5
max_rounds = 8

[retry]
max_attempts = 2
transient_delay_ms = 100

[loop_guard]
failure_threshold = 3
"#
    )
    .unwrap();

    let config = AgentConfig::from_file(file.path()).unwrap();

    assert_eq!(config.model, "gpt-4.1");
    assert_eq!(config.reasoning_effort, Some(ReasoningEffort::Medium));
    assert!(config.dry_run);
    assert_eq!(config.flush_delay().as_millis(), 5);
    assert_eq!(config.max_rounds, 8);
    assert_eq!(config.retry.max_attempts, 2);
    assert_eq!(config.retry.transient_delay_ms, 100);
    assert_eq!(config.loop_guard.failure_threshold, 3);
}

#[test]
fn missing_file_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = AgentConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, AgentError::Configuration(_)));
}

#[test]
fn malformed_toml_is_rejected() {
    assert!(AgentConfig::from_toml_str("max_rounds = \"lots\"").is_err());
}
