use inlet::config::Config;
use inlet::pool::ExhaustionPolicy;

#[test]
fn test_config_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.listen_addr, "127.0.0.1:8080");
    assert!(cfg.http.keepalive);
    assert!(!cfg.http.pipelining);
    assert!(cfg.http.websocket_enabled);
    assert_eq!(cfg.http.receive_buffer_size, 8192);
    assert_eq!(cfg.limits.max_token_length, 8192);
    assert_eq!(cfg.limits.max_headers, 100);
    assert_eq!(cfg.buffer_pool.exhaustion, ExhaustionPolicy::Allocate);
}

#[test]
fn test_config_address_from_env() {
    // Both cases in one test; the process environment is shared between test threads.
    unsafe {
        std::env::remove_var("INLET_CONFIG");
        std::env::remove_var("LISTEN");
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.listen_addr, "127.0.0.1:8080");

    unsafe {
        std::env::set_var("LISTEN", "0.0.0.0:3000");
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.listen_addr, "0.0.0.0:3000");
    unsafe {
        std::env::remove_var("LISTEN");
    }
}

#[test]
fn test_config_from_yaml_partial() {
    let yaml = r#"
listen_addr: "0.0.0.0:9000"
http:
  pipelining: true
  uri_scheme: https
limits:
  max_headers: 20
buffer_pool:
  total_capacity: 65536
  exhaustion: block
"#;
    let cfg = Config::from_yaml_str(yaml).unwrap();

    assert_eq!(cfg.listen_addr, "0.0.0.0:9000");
    assert!(cfg.http.pipelining);
    assert!(cfg.http.keepalive);
    assert_eq!(cfg.http.uri_scheme.as_deref(), Some("https"));
    assert_eq!(cfg.limits.max_headers, 20);
    assert_eq!(cfg.limits.max_token_length, 8192);
    assert_eq!(cfg.buffer_pool.total_capacity, Some(65536));
    assert_eq!(cfg.buffer_pool.exhaustion, ExhaustionPolicy::Block);
}

#[test]
fn test_config_rejects_invalid_values() {
    assert!(Config::from_yaml_str("http:\n  receive_buffer_size: 0\n").is_err());
    assert!(Config::from_yaml_str("limits:\n  max_headers: 0\n").is_err());
    assert!(Config::from_yaml_str("worker_threads: 0\n").is_err());
    assert!(Config::from_yaml_str("buffer_pool:\n  exhaustion: sometimes\n").is_err());
}

#[test]
fn test_config_from_missing_file() {
    assert!(Config::from_file("/nonexistent/inlet.yaml").is_err());
}

#[test]
fn test_config_clone() {
    let cfg1 = Config::from_yaml_str("listen_addr: \"127.0.0.1:8000\"\n").unwrap();
    let cfg2 = cfg1.clone();
    assert_eq!(cfg1.listen_addr, cfg2.listen_addr);
    assert_eq!(cfg1.http, cfg2.http);
}
