use super::*;

#[test]
fn test_default_config_validates() {
    let config = Config::default();
    config.validate().unwrap();
    assert_eq!(config.gateway.port, 3000);
    assert_eq!(config.sync.refetch_interval_ms, 5_000);
    assert_eq!(config.sync.stale_time_ms, 4_000);
    assert_eq!(config.sync.recent_window_hours, 24);
}

#[test]
fn test_camel_case_keys_deserialize() {
    let json = serde_json::json!({
        "store": {"url": "https://db.example.com", "anonKey": "anon"},
        "backend": {"url": "https://api.example.com/"},
        "gateway": {"port": 8080, "changesSecret": "s3cret"},
        "whatsapp": {"serverUrl": "https://evo.example.com", "instance": "loja", "apiKey": "k", "dryRun": true},
        "sync": {"refetchIntervalMs": 3000, "staleTimeMs": 1500}
    });
    let config: Config = serde_json::from_value(json).unwrap();
    assert_eq!(config.store.anon_key, "anon");
    assert_eq!(config.gateway.host, "127.0.0.1");
    assert_eq!(config.gateway.changes_secret, "s3cret");
    assert!(config.whatsapp.dry_run);
    assert_eq!(config.whatsapp.instance, "loja");
    assert_eq!(config.sync.refetch_interval_ms, 3000);
    assert_eq!(config.sync.recent_window_hours, 24);
    config.validate().unwrap();
}

#[test]
fn test_webhook_url_strips_trailing_slash() {
    let backend = BackendConfig {
        url: "https://api.example.com/".to_string(),
    };
    assert_eq!(backend.webhook_url(), "https://api.example.com/webhook");
    assert_eq!(
        BackendConfig::default().webhook_url(),
        "http://localhost:8000/webhook"
    );
}

#[test]
fn test_gateway_base_url_maps_wildcard_to_loopback() {
    let mut gateway = GatewayConfig::default();
    assert_eq!(gateway.base_url(), "http://127.0.0.1:3000");
    gateway.host = "0.0.0.0".to_string();
    gateway.port = 8080;
    assert_eq!(gateway.base_url(), "http://127.0.0.1:8080");
    gateway.host = "dash.local".to_string();
    assert_eq!(gateway.base_url(), "http://dash.local:8080");
}

#[test]
fn test_refetch_interval_out_of_range_rejected() {
    let mut config = Config::default();
    config.sync.refetch_interval_ms = 10_000;
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("refetchIntervalMs"));

    config.sync.refetch_interval_ms = 1_000;
    assert!(config.validate().is_err());
}

#[test]
fn test_stale_time_must_be_below_interval() {
    let mut config = Config::default();
    config.sync.refetch_interval_ms = 3_000;
    config.sync.stale_time_ms = 3_000;
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("must be below"));
}

#[test]
fn test_stale_time_out_of_range_rejected() {
    let mut config = Config::default();
    config.sync.stale_time_ms = 500;
    assert!(config.validate().is_err());
}

#[test]
fn test_zero_recent_window_rejected() {
    let mut config = Config::default();
    config.sync.recent_window_hours = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_backend_url_rejected() {
    let mut config = Config::default();
    config.backend.url = "not a url".to_string();
    assert!(config.validate().is_err());

    config.backend.url = "ftp://files.example.com".to_string();
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("http or https"));
}

#[test]
fn test_empty_store_url_allowed_by_validate() {
    let config = Config::default();
    assert!(config.store.url.is_empty());
    config.validate().unwrap();
}

#[test]
fn test_invalid_store_url_rejected() {
    let mut config = Config::default();
    config.store.url = "db.example.com".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_debug_redacts_secrets() {
    let store = StoreConfig {
        url: "https://db.example.com".to_string(),
        anon_key: "super-secret-key".to_string(),
    };
    let debug = format!("{:?}", store);
    assert!(debug.contains("[REDACTED]"));
    assert!(!debug.contains("super-secret-key"));

    let whatsapp = WhatsAppConfig::default();
    assert!(format!("{:?}", whatsapp).contains("[empty]"));
}
