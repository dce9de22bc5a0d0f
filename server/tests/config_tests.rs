use bootstrap::{ServiceGraph, ServicesConfig};
use serial_test::serial;
use std::path::PathBuf;
use std::time::Duration;

use server::config::{services_config_path, ApiSettings, MongoStoreSettings, DEFAULT_SERVICES_CONFIG};

fn shipped(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("config")
        .join(name)
}

#[test]
fn test_load_services_config() {
    let config = ServicesConfig::load_from_file(shipped("services.toml"))
        .expect("Failed to load config");

    assert_eq!(config.services.len(), 2);
    assert_eq!(config.phase_timeout(), Some(Duration::from_secs(10)));
}

#[test]
fn test_shipped_configs_order_store_before_api() {
    for file in ["services.toml", "services.memory.toml"] {
        let config = ServicesConfig::load_from_file(shipped(file)).expect("Failed to load config");
        let graph = ServiceGraph::build(config.services).expect("acyclic graph");

        assert_eq!(graph.linear_ordering(), vec!["accounts-db", "api"], "{}", file);
    }
}

#[test]
fn test_api_service_settings() {
    let config = ServicesConfig::load_from_file(shipped("services.toml")).unwrap();
    let api = config.service("api").expect("api service declared");
    let settings: ApiSettings = api.settings().unwrap();

    assert_eq!(settings.store, "accounts-db");
    assert!(api.depends_on.contains(&settings.store));
    assert_eq!(settings.port, 8080);
    assert_eq!(settings.session_ttl(), Some(Duration::from_secs(86400)));
    assert_eq!(settings.rate_limit.unwrap().max_requests, 10);
    assert!(settings.tls.is_none());
}

#[test]
fn test_mongo_store_settings() {
    let config = ServicesConfig::load_from_file(shipped("services.toml")).unwrap();
    let store = config.service("accounts-db").unwrap();
    let settings: MongoStoreSettings = store.settings().unwrap();

    assert_eq!(settings.database, "identity");
    assert_eq!(settings.collection, "accounts");
    assert_eq!(settings.timeout(), Duration::from_secs(5));
}

#[test]
fn test_invalid_config_path() {
    let result = ServicesConfig::load_from_file("nonexistent/services.toml");
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_services_config_path_from_env() {
    std::env::set_var("SERVICES_CONFIG", "/etc/identity/services.toml");
    assert_eq!(
        services_config_path(),
        PathBuf::from("/etc/identity/services.toml")
    );

    std::env::remove_var("SERVICES_CONFIG");
    assert_eq!(services_config_path(), PathBuf::from(DEFAULT_SERVICES_CONFIG));
}
