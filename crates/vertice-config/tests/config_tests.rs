//! Integration tests for config loading, env overrides, and file reload —
//! exercised through the public `ConfigLoader` API rather than internals.

use std::io::Write;

use vertice_config::ConfigLoader;
use vertice_config::schema::{LoggingConfig, MeshConfig, ServerConfig, VerticeConfig};

#[test]
fn default_config_has_expected_values() {
    let config = VerticeConfig::default();
    assert_eq!(config.server.listen, "127.0.0.1:3700");
    assert_eq!(config.server.rate_limit_per_minute, 120);
    assert!(config.server.api_key.is_none());
    assert_eq!(config.mesh.control_agent_id, "orchestrator");
    assert!(!config.mesh.full_mesh);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "pretty");
    assert_eq!(config.resilience.circuit_breaker.failure_threshold, 5);
    assert_eq!(config.cache.max_size, config.cache.max_size); // sanity, non-zero checked below
    assert!(config.cache.max_size > 0);
}

#[test]
fn toml_roundtrip_preserves_every_sub_config() {
    let config = VerticeConfig::default();
    let toml_str = toml::to_string_pretty(&config).unwrap();
    let restored: VerticeConfig = toml::from_str(&toml_str).unwrap();
    assert_eq!(restored.server.listen, config.server.listen);
    assert_eq!(restored.mesh.control_agent_id, config.mesh.control_agent_id);
    assert_eq!(restored.logging.level, config.logging.level);
    assert_eq!(
        restored.resilience.circuit_breaker.failure_threshold,
        config.resilience.circuit_breaker.failure_threshold
    );
    assert_eq!(restored.cache.max_size, config.cache.max_size);
}

#[test]
fn partial_toml_fills_in_defaults() {
    let toml_str = r#"
[server]
listen = "0.0.0.0:9000"

[mesh]
control_agent_id = "lead"
"#;
    let config: VerticeConfig = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.listen, "0.0.0.0:9000");
    assert_eq!(config.mesh.control_agent_id, "lead");
    // Untouched sections still carry their defaults.
    assert_eq!(config.logging.level, LoggingConfig::default().level);
    assert!(!config.mesh.full_mesh);
    assert_eq!(config.server.rate_limit_per_minute, ServerConfig::default().rate_limit_per_minute);
}

#[test]
fn json_roundtrip_preserves_config() {
    let config = VerticeConfig::default();
    let json = serde_json::to_string(&config).unwrap();
    let restored: VerticeConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.server.listen, config.server.listen);
}

// ── ConfigLoader ─────────────────────────────────────────────────

#[test]
fn loader_reads_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("vertice.toml");
    let mut f = std::fs::File::create(&config_path).unwrap();
    writeln!(
        f,
        r#"
[server]
listen = "0.0.0.0:8080"

[mesh]
control_agent_id = "lead-agent"
full_mesh = true
"#
    )
    .unwrap();

    let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
    let config = loader.get();
    assert_eq!(config.server.listen, "0.0.0.0:8080");
    assert_eq!(config.mesh.control_agent_id, "lead-agent");
    assert!(config.mesh.full_mesh);
}

#[test]
fn loader_falls_back_to_defaults_for_missing_file() {
    let loader = ConfigLoader::load(Some(std::path::Path::new("/nonexistent/vertice.toml"))).unwrap();
    let config = loader.get();
    assert_eq!(config.server.listen, VerticeConfig::default().server.listen);
}

#[test]
fn loader_rejects_invalid_config_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("vertice.toml");
    std::fs::write(
        &config_path,
        r#"
[server]
listen = ""
"#,
    )
    .unwrap();

    let result = ConfigLoader::load(Some(config_path.as_path()));
    assert!(result.is_err(), "empty listen address must fail validation");
}

#[test]
fn loader_reload_picks_up_file_changes() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("vertice.toml");

    std::fs::write(
        &config_path,
        r#"
[mesh]
control_agent_id = "first"
"#,
    )
    .unwrap();

    let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
    assert_eq!(loader.get().mesh.control_agent_id, "first");

    std::fs::write(
        &config_path,
        r#"
[mesh]
control_agent_id = "second"
"#,
    )
    .unwrap();

    loader.reload().unwrap();
    assert_eq!(loader.get().mesh.control_agent_id, "second");
}

#[test]
fn env_override_wins_over_file_value() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("vertice.toml");
    std::fs::write(
        &config_path,
        r#"
[server]
listen = "127.0.0.1:1111"
"#,
    )
    .unwrap();

    unsafe {
        std::env::set_var("VERTICE_SERVER_LISTEN", "0.0.0.0:2222");
    }
    let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
    unsafe {
        std::env::remove_var("VERTICE_SERVER_LISTEN");
    }

    assert_eq!(loader.get().server.listen, "0.0.0.0:2222");
}
