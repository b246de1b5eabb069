//! Integration tests for configuration loading.

use std::time::Duration;

use tlog_replay::config::env::vars;
use tlog_replay::{EnvConfig, LogFormat, PlayerConfig, ReplayError};

#[test]
fn toml_overrides_defaults() {
    let config = PlayerConfig::from_toml_str(
        r#"
speed_exponent = 2
scale_lock = true
early_threshold = 10
"#,
    )
    .unwrap();
    assert_eq!(config.speed_exponent, 2);
    assert!(config.scale_lock);
    assert!(config.start_paused);
    assert_eq!(config.early_threshold, Duration::from_millis(10));
    assert_eq!(config.tick_interval, Duration::from_millis(100));
}

#[test]
fn toml_values_are_validated() {
    let err = PlayerConfig::from_toml_str("speed_exponent = -7").unwrap_err();
    assert!(matches!(err, ReplayError::Config { .. }));

    let err = PlayerConfig::from_toml_str("tick_interval = 0").unwrap_err();
    assert!(err.to_string().contains("tick_interval"));
}

#[test]
fn load_from_file() {
    let path = std::env::temp_dir().join(format!("tlog-replay-{}.toml", std::process::id()));
    std::fs::write(&path, "start_paused = false\n[logging]\nformat = \"json\"\n").unwrap();
    let config = PlayerConfig::load(&path);
    std::fs::remove_file(&path).ok();

    let config = config.unwrap();
    assert!(!config.start_paused);
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn unknown_extension_rejected() {
    let err = PlayerConfig::load("/etc/tlog-replay.yaml").unwrap_err();
    assert!(err.to_string().contains("unknown config format"));
}

#[test]
fn environment_overrides() {
    let mut env = EnvConfig::new("TLOG_REPLAY_CONFIG_TEST");
    env.set(vars::SPEED, "-2");
    env.set(vars::START_PAUSED, "no");
    env.set(vars::TICK_MS, "250");
    env.set(vars::LOG_LEVEL, "tlog_replay=debug");
    env.set(vars::LOG_FORMAT, "json");

    let config = PlayerConfig::default().apply_env(&env);
    assert_eq!(config.speed_exponent, -2);
    assert!(!config.start_paused);
    assert_eq!(config.tick_interval, Duration::from_millis(250));
    assert_eq!(config.logging.level, "tlog_replay=debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert!(!config.scale_lock);
}

#[test]
fn unset_environment_changes_nothing() {
    let env = EnvConfig::new("TLOG_REPLAY_CONFIG_TEST_UNSET");
    assert_eq!(PlayerConfig::default().apply_env(&env), PlayerConfig::default());
}
