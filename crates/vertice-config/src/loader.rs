use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use vertice_core::{Result, VerticeError};

use crate::schema::VerticeConfig;

/// Loads and optionally hot-reloads the Vertice configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<VerticeConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > VERTICE_CONFIG env > ~/.vertice/vertice.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("VERTICE_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vertice")
            .join("vertice.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str::<VerticeConfig>(&raw).map_err(|e| {
                VerticeError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            VerticeConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(VerticeError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> VerticeConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<VerticeConfig>> {
        Arc::clone(&self.config)
    }

    /// Path being watched.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (VERTICE_SERVER_LISTEN, VERTICE_LOG_LEVEL, etc.)
    fn apply_env_overrides(mut config: VerticeConfig) -> VerticeConfig {
        if let Ok(v) = std::env::var("VERTICE_SERVER_LISTEN") {
            config.server.listen = v;
        }
        if let Ok(v) = std::env::var("VERTICE_SERVER_API_KEY") {
            config.server.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("VERTICE_RATE_LIMIT_PER_MINUTE") {
            if let Ok(rate) = v.parse::<u32>() {
                config.server.rate_limit_per_minute = rate;
            }
        }
        if let Ok(v) = std::env::var("VERTICE_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("VERTICE_LOG_FORMAT") {
            config.logging.format = v;
        }
        if let Ok(v) = std::env::var("VERTICE_MESH_CONTROL_AGENT_ID") {
            config.mesh.control_agent_id = v;
        }
        if let Ok(v) = std::env::var("VERTICE_CACHE_SIMILARITY_THRESHOLD") {
            if let Ok(threshold) = v.parse::<f64>() {
                config.cache.similarity_threshold = threshold;
            }
        }
        config
    }

    /// Reload the config from disk.
    pub fn reload(&self) -> Result<()> {
        if !self.config_path.exists() {
            return Err(VerticeError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let raw = std::fs::read_to_string(&self.config_path)?;
        let new_config = toml::from_str::<VerticeConfig>(&raw).map_err(|e| {
            VerticeError::Config(format!(
                "failed to parse {}: {}",
                self.config_path.display(),
                e
            ))
        })?;
        let new_config = Self::apply_env_overrides(new_config);
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }

    /// Start a background file watcher that triggers `reload()` when the config file changes.
    /// Returns a handle to the watcher (must be kept alive for watching to continue).
    pub fn watch(&self) -> Result<notify::RecommendedWatcher> {
        let config = Arc::clone(&self.config);
        let config_path = self.config_path.clone();

        info!(?config_path, "starting config file watcher");

        let path_for_event = config_path.clone();
        let mut watcher = notify::recommended_watcher(move |res: std::result::Result<NotifyEvent, notify::Error>| {
            match res {
                Ok(event) => match event.kind {
                    EventKind::Modify(_) | EventKind::Create(_) => {
                        let is_our_file = event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == path_for_event.file_name());
                        if !is_our_file {
                            return;
                        }

                        info!("config file changed, reloading");
                        match std::fs::read_to_string(&path_for_event) {
                            Ok(raw) => match toml::from_str::<VerticeConfig>(&raw) {
                                Ok(new_config) => {
                                    let new_config = ConfigLoader::apply_env_overrides(new_config);
                                    *config.write() = new_config;
                                    info!("configuration hot-reloaded successfully");
                                }
                                Err(e) => {
                                    warn!(error = %e, "config file has errors, keeping current config");
                                }
                            },
                            Err(e) => {
                                warn!(error = %e, "failed to read config file during hot-reload");
                            }
                        }
                    }
                    _ => {}
                },
                Err(e) => {
                    warn!(error = %e, "file watcher error");
                }
            }
        })
        .map_err(|e| VerticeError::Config(format!("failed to create file watcher: {}", e)))?;

        let watch_path = self.config_path.parent().unwrap_or(Path::new("."));
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| VerticeError::Config(format!("failed to watch config directory: {}", e)))?;

        Ok(watcher)
    }
}
