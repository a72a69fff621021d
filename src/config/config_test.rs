use serial_test::serial;
use temp_env::with_vars;

use super::*;
use crate::Error;

fn cleanup_all_confwatch_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("CONFWATCH__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = StoreConfig::default();

    assert_eq!(config.connection.endpoints, vec!["localhost:2379".to_string()]);
    assert_eq!(config.connection.connect_timeout_in_ms, 5000);
    assert_eq!(config.connection.request_timeout_in_ms, 10000);
    assert_eq!(config.watch.base_delay_ms, 100);
    assert_eq!(config.watch.max_delay_ms, 5000);
    assert!(config.watch.keys.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_confwatch_env_vars();
    with_vars(
        vec![
            ("CONFWATCH__CONNECTION__REQUEST_TIMEOUT_IN_MS", Some("1500")),
            ("CONFWATCH__CONNECTION__ENDPOINTS", Some("node1:2379,node2:2379")),
        ],
        || {
            let config = StoreConfig::new().unwrap();

            assert_eq!(config.connection.request_timeout_in_ms, 1500);
            assert_eq!(
                config.connection.endpoints,
                vec!["node1:2379".to_string(), "node2:2379".to_string()]
            );
        },
    );
}

#[test]
#[serial]
fn new_should_load_file_from_config_path() {
    cleanup_all_confwatch_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("confwatch.toml");
    std::fs::write(
        &config_path,
        r#"
        [connection]
        endpoints = ["etcd-0:2379"]
        connect_timeout_in_ms = 3000

        [watch]
        keys = ["/app/feature-flags"]
        "#,
    )
    .unwrap();

    with_vars(
        vec![("CONFIG_PATH", Some(config_path.to_str().unwrap()))],
        || {
            let config = StoreConfig::new().unwrap().validate().unwrap();

            assert_eq!(config.connection.endpoints, vec!["etcd-0:2379".to_string()]);
            assert_eq!(config.connection.connect_timeout_in_ms, 3000);
            // Untouched fields keep their defaults
            assert_eq!(config.connection.request_timeout_in_ms, 10000);
            assert_eq!(config.watch.keys, vec!["/app/feature-flags".to_string()]);
        },
    );
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_confwatch_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("dynamic_config.toml");
    std::fs::write(
        &config_path,
        r#"
        [watch]
        base_delay_ms = 250
        max_delay_ms = 30000
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base_config = StoreConfig::new().expect("success");
        let config = base_config
            .with_override_config(config_path.to_str().unwrap())
            .unwrap();

        assert_eq!(config.watch.base_delay_ms, 250);
        assert_eq!(config.watch.max_delay_ms, 30000);
        assert_eq!(config.connection.endpoints, vec!["localhost:2379".to_string()]);
    });
}

#[test]
#[serial]
fn new_should_fail_when_config_path_is_missing() {
    cleanup_all_confwatch_env_vars();
    with_vars(vec![("CONFIG_PATH", Some("/definitely/not/here.toml"))], || {
        assert!(StoreConfig::new().is_err());
    });
}

#[test]
fn validation_should_fail_with_empty_endpoints() {
    let mut config = StoreConfig::default();
    config.connection.endpoints.clear();
    assert!(matches!(config.validate(), Err(Error::Config(_))));
}

#[test]
fn validation_should_fail_with_zero_request_timeout() {
    let mut config = StoreConfig::default();
    config.connection.request_timeout_in_ms = 0;
    assert!(matches!(config.validate(), Err(Error::Config(_))));
}

#[test]
fn validation_should_fail_with_half_credentials() {
    let mut config = StoreConfig::default();
    config.connection.user = Some("root".into());
    assert!(matches!(config.validate(), Err(Error::Config(_))));
}

#[test]
fn validation_should_fail_with_inverted_backoff_bounds() {
    let mut config = StoreConfig::default();
    config.watch.base_delay_ms = 10_000;
    config.watch.max_delay_ms = 100;
    assert!(matches!(config.validate(), Err(Error::Config(_))));
}

#[test]
fn validation_should_fail_with_malformed_watch_key() {
    let mut config = StoreConfig::default();
    config.watch.keys = vec!["/app//flags".into()];
    assert!(matches!(config.validate(), Err(Error::Config(_))));
}
