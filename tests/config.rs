use std::time::Duration;

use zarrs_eopf::config::{Config, EOPF_PROCESS, OpenOptions, ResolverConfig};

#[test]
fn defaults() {
    let config = Config::default();
    assert_eq!(config.resolver.default_bbox, [10.0, 40.0, 15.0, 45.0]);
    assert_eq!(config.resolver.default_epsg, 4326);
    assert_eq!(config.cache.ttl, Duration::from_secs(300));
    assert_eq!(config.cache.remote_ttl, Duration::from_secs(120));
}

#[test]
fn partial_json() {
    let config = Config::from_json(r#"{"cache": {"ttl": 1.5}}"#).unwrap();
    assert_eq!(config.cache.ttl, Duration::from_millis(1500));
    assert_eq!(config.cache.remote_ttl, Duration::from_secs(120));
    assert_eq!(config.resolver, ResolverConfig::default());
    assert!(Config::from_json(r#"{"cache": {"ttl": -1}}"#).is_err());
}

#[test]
fn open_options() {
    let options: OpenOptions = ["EOPF_PROCESS=yes", "CACHE=off", "eopf_process = TRUE"]
        .into_iter()
        .collect();
    assert!(options.eopf_process());
    assert_eq!(options.get("cache"), Some("off"));

    let forwarded = options.forwarded();
    assert!(!forwarded.eopf_process());
    assert_eq!(forwarded.iter().collect::<Vec<_>>(), ["CACHE=off"]);

    assert!(!OpenOptions::new().with(EOPF_PROCESS, "no").eopf_process());
    assert!(OpenOptions::new().with(EOPF_PROCESS, "1").eopf_process());
}
