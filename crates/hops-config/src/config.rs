//! The hops process configuration

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Base configuration file name
pub const CONFIG_FILE: &str = "config.yaml";

/// Top level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HopsConfig {
    /// Development mode; raises the default log level to debug
    pub dev: bool,
    pub runner: RunnerConfig,
    pub http: HttpConfig,
}

/// Runner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub account_id: String,
    pub automations_dir: PathBuf,
    /// Deadline for reading a sequence's messages
    pub bundle_timeout_ms: u64,
    /// Time in-flight messages get to finish on shutdown
    pub shutdown_grace_secs: u64,
    /// Lifetime of automations fetched from other nodes
    pub config_cache_ttl_secs: u64,
    /// Reload automations when their files change
    pub watch: bool,
    pub reload_debounce_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            account_id: "hops".to_string(),
            automations_dir: PathBuf::from("automations"),
            bundle_timeout_ms: 5000,
            shutdown_grace_secs: 10,
            config_cache_ttl_secs: 300,
            watch: true,
            reload_debounce_ms: 150,
        }
    }
}

impl RunnerConfig {
    pub fn bundle_timeout(&self) -> Duration {
        Duration::from_millis(self.bundle_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn config_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config_cache_ttl_secs)
    }

    pub fn reload_debounce(&self) -> Duration {
        Duration::from_millis(self.reload_debounce_ms)
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub addr: SocketAddr,
    pub enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8916)),
            enabled: true,
        }
    }
}

impl Default for HopsConfig {
    fn default() -> Self {
        Self {
            dev: false,
            runner: RunnerConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl HopsConfig {
    /// Load `config.yaml` from `config_dir`, overlay `config.<tag>.yaml`, then
    /// apply `HOPS_*` environment overrides
    ///
    /// Missing files are skipped.
    pub fn load(config_dir: &Path, tag: Option<&str>) -> ConfigResult<Self> {
        Self::load_with_env(config_dir, tag, |key| std::env::var(key).ok())
    }

    /// Like [`HopsConfig::load`] with environment lookups through `env`
    pub fn load_with_env(
        config_dir: &Path,
        tag: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> ConfigResult<Self> {
        let mut merged = Value::Mapping(Mapping::new());
        if let Some(base) = read_yaml(&config_dir.join(CONFIG_FILE))? {
            merge(&mut merged, base);
        }
        if let Some(tag) = tag {
            if let Some(overlay) = read_yaml(&config_dir.join(format!("config.{}.yaml", tag)))? {
                merge(&mut merged, overlay);
            }
        }

        let mut config: HopsConfig =
            serde_yaml::from_value(merged).map_err(|e| ConfigError::Schema {
                dir: config_dir.to_path_buf(),
                tag: tag.unwrap_or("none").to_string(),
                source: e,
            })?;
        config.apply_env(env)?;
        Ok(config)
    }

    /// Apply `HOPS_*` overrides
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        override_with(&env, "HOPS_DEV", &mut self.dev)?;
        if let Some(account_id) = env("HOPS_ACCOUNT_ID") {
            self.runner.account_id = account_id;
        }
        if let Some(dir) = env("HOPS_AUTOMATIONS_DIR") {
            self.runner.automations_dir = PathBuf::from(dir);
        }
        override_with(&env, "HOPS_BUNDLE_TIMEOUT_MS", &mut self.runner.bundle_timeout_ms)?;
        override_with(&env, "HOPS_SHUTDOWN_GRACE_SECS", &mut self.runner.shutdown_grace_secs)?;
        override_with(&env, "HOPS_CONFIG_CACHE_TTL_SECS", &mut self.runner.config_cache_ttl_secs)?;
        override_with(&env, "HOPS_WATCH", &mut self.runner.watch)?;
        override_with(&env, "HOPS_RELOAD_DEBOUNCE_MS", &mut self.runner.reload_debounce_ms)?;
        override_with(&env, "HOPS_HTTP_ADDR", &mut self.http.addr)?;
        override_with(&env, "HOPS_HTTP_ENABLED", &mut self.http.enabled)?;
        Ok(())
    }

    /// Automations directory, relative paths resolved against `config_dir`
    pub fn automations_dir(&self, config_dir: &Path) -> PathBuf {
        if self.runner.automations_dir.is_absolute() {
            self.runner.automations_dir.clone()
        } else {
            config_dir.join(&self.runner.automations_dir)
        }
    }
}

fn override_with<T>(env: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) -> ConfigResult<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = env(key) {
        *target = raw.trim().parse().map_err(|e: T::Err| ConfigError::EnvOverride {
            var: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

fn read_yaml(path: &Path) -> ConfigResult<Option<Value>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(ConfigError::Unreadable {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    debug!("Loading config file: {:?}", path);

    let value: Value = serde_yaml::from_str(&content).map_err(|e| ConfigError::Syntax {
        path: path.to_path_buf(),
        source: e,
    })?;
    // An empty file parses as null
    Ok((!value.is_null()).then_some(value))
}

/// Deep merge `overlay` into `base`; mappings merge key by key, anything else replaces
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
