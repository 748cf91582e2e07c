//! Session configuration and API environment.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::request::BaseUrlKind;

/// Environment variable names read by [`SessionConfig::from_env`].
pub mod vars {
    pub const CONNECT_TIMEOUT_SECS: &str = "SKYLARK_CONNECT_TIMEOUT_SECS";
    pub const REQUEST_TIMEOUT_SECS: &str = "SKYLARK_REQUEST_TIMEOUT_SECS";
    pub const USER_AGENT: &str = "SKYLARK_USER_AGENT";
    pub const POOL_MAX_IDLE_PER_HOST: &str = "SKYLARK_POOL_MAX_IDLE_PER_HOST";
    pub const GZIP: &str = "SKYLARK_GZIP";
    pub const WORKER_THREADS: &str = "SKYLARK_WORKER_THREADS";
}

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid YAML at line {}: {message}", line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    ParseError { line: Option<usize>, message: String },

    #[error("invalid value for {var}: {message}")]
    InvalidEnv { var: String, message: String },

    #[error("validation error: {message}")]
    ValidationError { message: String },
}

/// Transport configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Connection timeout.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout for data tasks. Stream tasks have none.
    pub request_timeout_secs: u64,
    /// User agent string.
    pub user_agent: String,
    /// Maximum idle connections kept per host.
    pub pool_max_idle_per_host: usize,
    /// Enable gzip decompression.
    pub gzip: bool,
    /// Transport runtime worker threads (0 = one per core).
    pub worker_threads: usize,
    /// Transport runtime thread name.
    pub thread_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            user_agent: format!("skylark/{}", env!("CARGO_PKG_VERSION")),
            pool_max_idle_per_host: 10,
            gzip: true,
            worker_threads: 0,
            thread_name: "skylark-transport".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parse YAML; missing fields take their defaults.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_yaml::from_str(contents).map_err(|e| ConfigError::ParseError {
            line: e.location().map(|l| l.line()),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Defaults overridden by `SKYLARK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Override fields from a variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, vars::CONNECT_TIMEOUT_SECS)? {
            self.connect_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, vars::REQUEST_TIMEOUT_SECS)? {
            self.request_timeout_secs = v;
        }
        if let Some(v) = lookup(vars::USER_AGENT) {
            self.user_agent = v;
        }
        if let Some(v) = parse_var(&lookup, vars::POOL_MAX_IDLE_PER_HOST)? {
            self.pool_max_idle_per_host = v;
        }
        if let Some(v) = lookup(vars::GZIP) {
            self.gzip = matches!(v.to_lowercase().as_str(), "true" | "1" | "yes");
        }
        if let Some(v) = parse_var(&lookup, vars::WORKER_THREADS)? {
            self.worker_threads = v;
        }
        self.validate()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "connect_timeout_secs must be greater than 0".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "request_timeout_secs must be greater than 0".to_string(),
            });
        }
        if self.thread_name.is_empty() {
            return Err(ConfigError::ValidationError {
                message: "thread_name must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| ConfigError::InvalidEnv {
            var: var.to_string(),
            message: format!("expected an unsigned integer, got {raw:?}"),
        }),
        None => Ok(None),
    }
}

/// Base URLs requests are resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEnvironment {
    pub api_base_url: String,
    pub upload_base_url: String,
}

impl ApiEnvironment {
    pub fn new(api_base_url: impl Into<String>, upload_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            upload_base_url: upload_base_url.into(),
        }
    }

    pub fn base_url(&self, kind: BaseUrlKind) -> &str {
        match kind {
            BaseUrlKind::Api => &self.api_base_url,
            BaseUrlKind::Upload => &self.upload_base_url,
        }
    }

    /// Check both base URLs parse as absolute URLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("api_base_url", &self.api_base_url), ("upload_base_url", &self.upload_base_url)] {
            Url::parse(value).map_err(|e| ConfigError::ValidationError {
                message: format!("{name} {value:?} is not a valid URL: {e}"),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.user_agent.starts_with("skylark/"));
        assert_eq!(config.pool_max_idle_per_host, 10);
        assert!(config.gzip);
        assert_eq!(config.worker_threads, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_merges_with_defaults() {
        let config = SessionConfig::from_yaml_str("request_timeout_secs: 5\ngzip: false\n").unwrap();
        assert_eq!(config.request_timeout_secs, 5);
        assert!(!config.gzip);
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn test_invalid_yaml_reports_line() {
        let err = SessionConfig::from_yaml_str("gzip: true\nworker_threads: [\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = SessionConfig::from_yaml_str("connect_timeout_secs: 0").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skylark.yaml");
        std::fs::write(&path, "user_agent: test-agent\n").unwrap();
        let config = SessionConfig::load(&path).unwrap();
        assert_eq!(config.user_agent, "test-agent");

        let missing = SessionConfig::load(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(missing, ConfigError::ReadError { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SessionConfig::default();
        config
            .apply_overrides(lookup(&[
                (vars::CONNECT_TIMEOUT_SECS, "3"),
                (vars::USER_AGENT, "agent/1"),
                (vars::GZIP, "0"),
                (vars::WORKER_THREADS, "2"),
            ]))
            .unwrap();
        assert_eq!(config.connect_timeout_secs, 3);
        assert_eq!(config.user_agent, "agent/1");
        assert!(!config.gzip);
        assert_eq!(config.worker_threads, 2);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = SessionConfig::default();
        let err = config
            .apply_overrides(lookup(&[(vars::REQUEST_TIMEOUT_SECS, "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref var, .. } if var == vars::REQUEST_TIMEOUT_SECS));
    }

    #[test]
    fn test_environment_selects_base_url() {
        let env = ApiEnvironment::new("https://api.example.com", "https://upload.example.com");
        assert_eq!(env.base_url(BaseUrlKind::Api), "https://api.example.com");
        assert_eq!(env.base_url(BaseUrlKind::Upload), "https://upload.example.com");
        assert!(env.validate().is_ok());
    }

    #[test]
    fn test_environment_validation() {
        let env = ApiEnvironment::new("https://api.example.com", "upload");
        assert!(matches!(env.validate(), Err(ConfigError::ValidationError { .. })));
    }

    #[test]
    fn test_environment_from_yaml() {
        let env: ApiEnvironment = serde_yaml::from_str(
            "api_base_url: https://api.example.com\nupload_base_url: https://upload.example.com\n",
        )
        .unwrap();
        assert_eq!(env.api_base_url, "https://api.example.com");
    }
}
