use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vertice_cache::CacheConfig;
use vertice_resilience::ResilienceConfig;

/// Root configuration — maps to `vertice.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerticeConfig {
    pub resilience: ResilienceConfig,
    pub cache: CacheConfig,
    pub mesh: MeshConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl Default for VerticeConfig {
    fn default() -> Self {
        Self {
            resilience: ResilienceConfig::default(),
            cache: CacheConfig::default(),
            mesh: MeshConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ── Mesh ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Agent id assigned to the single control-plane node.
    pub control_agent_id: String,
    /// Connect worker nodes routed through the same tactical mesh as a
    /// complete graph instead of a ring.
    pub full_mesh: bool,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            control_agent_id: "orchestrator".into(),
            full_mesh: false,
        }
    }
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address for the agent gateway.
    pub listen: String,
    /// Optional API key required on every request except `/healthz`.
    pub api_key: Option<String>,
    /// Enable CORS (for local web UI development).
    pub cors: bool,
    /// Per-client requests-per-minute budget for `/agui/*` routes.
    pub rate_limit_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3700".into(),
            api_key: None,
            cors: false,
            rate_limit_per_minute: 120,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
    /// Log file path (None = stdout only).
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
            file: None,
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let icon = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "[{}] {}: {}", icon, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   -> {}", h)?;
        }
        Ok(())
    }
}

impl VerticeConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        if self.cache.similarity_threshold < 0.0 || self.cache.similarity_threshold > 1.0 {
            warnings.push(ConfigWarning {
                field: "cache.similarity_threshold".into(),
                message: format!(
                    "threshold {} is out of range",
                    self.cache.similarity_threshold
                ),
                severity: WarningSeverity::Error,
                hint: Some("similarity_threshold must be between 0.0 and 1.0".into()),
            });
        }

        if self.cache.max_size == 0 {
            warnings.push(ConfigWarning {
                field: "cache.max_size".into(),
                message: "max_size is 0 — the cache would hold nothing".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set to e.g. 1000".into()),
            });
        }

        if self.server.listen.is_empty() {
            warnings.push(ConfigWarning {
                field: "server.listen".into(),
                message: "listen address is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. '127.0.0.1:3700'".into()),
            });
        } else if self.server.listen.starts_with("0.0.0.0") && self.server.api_key.is_none() {
            warnings.push(ConfigWarning {
                field: "server.api_key".into(),
                message: "binding to 0.0.0.0 with no api_key set".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set server.api_key to protect the gateway".into()),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  - {}", errors.join("\n  - ")));
        }

        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates_cleanly() {
        let config = VerticeConfig::default();
        let warnings = config.validate().unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn out_of_range_similarity_threshold_is_an_error() {
        let mut config = VerticeConfig::default();
        config.cache.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_listen_address_is_an_error() {
        let mut config = VerticeConfig::default();
        config.server.listen = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn roundtrips_through_toml() {
        let config = VerticeConfig::default();
        let raw = toml::to_string(&config).unwrap();
        let parsed: VerticeConfig = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.server.listen, config.server.listen);
    }
}
