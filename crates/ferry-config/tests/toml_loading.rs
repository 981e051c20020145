//! Integration tests for TOML and environment configuration loading.
//!
//! Uses figment::Jail for sandboxed files and env vars.

use figment::{
    Figment, Jail,
    providers::{Format, Serialized, Toml},
};
use ferry_config::{ConfigError, FerryConfig};
use pretty_assertions::assert_eq;

#[test]
fn loads_engine_and_retry_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[engine]
channel_capacity = 64
load_concurrency = 8
page_size = 500

[retry]
max_attempts = 5
base_delay_ms = 100
max_delay_ms = 2000
"#,
        )?;

        let config: FerryConfig = Figment::from(Serialized::defaults(FerryConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.engine.channel_capacity, 64);
        assert_eq!(config.engine.load_concurrency, 8);
        assert_eq!(config.engine.page_size, 500);
        assert_eq!(config.engine.checkpoint_batch_size, 50);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 100);
        assert_eq!(config.retry.max_delay_ms, 2000);
        Ok(())
    });
}

#[test]
fn project_file_is_picked_up_by_load_in() {
    Jail::expect_with(|jail| {
        jail.create_dir(".ferry")?;
        jail.create_file(
            ".ferry/config.toml",
            r#"
[storage]
db_path = "state/jobs.db"

[http]
timeout_secs = 5
"#,
        )?;

        let config = FerryConfig::load_in(jail.directory()).expect("config loads");
        assert_eq!(config.storage.db_path, "state/jobs.db");
        assert_eq!(config.http.timeout_secs, 5);
        assert_eq!(config.http.user_agent, "ferry/0.1");
        Ok(())
    });
}

#[test]
fn env_overrides_project_file() {
    Jail::expect_with(|jail| {
        jail.create_dir(".ferry")?;
        jail.create_file(".ferry/config.toml", "[engine]\nload_concurrency = 2\n")?;
        jail.set_env("FERRY_ENGINE__LOAD_CONCURRENCY", "6");

        let config = FerryConfig::load_in(jail.directory()).expect("config loads");
        assert_eq!(config.engine.load_concurrency, 6);
        Ok(())
    });
}

#[test]
fn credentials_come_from_env() {
    Jail::expect_with(|jail| {
        jail.set_env("FERRY_CREDENTIALS__ENV_1A2B3C4D", "hunter2");

        let config = FerryConfig::load_in(jail.directory()).expect("config loads");
        assert_eq!(config.credentials.password_for("env-1a2b3c4d"), Some("hunter2"));
        assert_eq!(config.credentials.password_for("env-ffffffff"), None);
        Ok(())
    });
}

#[test]
fn out_of_range_values_are_rejected_on_load() {
    Jail::expect_with(|jail| {
        jail.set_env("FERRY_RETRY__MAX_ATTEMPTS", "0");

        let err = FerryConfig::load_in(jail.directory()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref field, .. } if field == "retry.max_attempts"
        ));
        Ok(())
    });
}
