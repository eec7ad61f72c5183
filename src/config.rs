//! YAML configuration file support.
//!
//! The service reads one YAML file at startup and never touches it again.
//! Everything except `auth_token` has a default.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! auth_token: ["secret123", "other-client"]
//! host: 127.0.0.1
//! port: 8000
//! allowed_cors: ["*"]
//!
//! log_level: info
//! max_body_size_mb: 10
//! timeout_secs: 30
//!
//! engine:
//!   model_path: models/common.onnx
//!   charset_path: models/charset.json
//!   intra_threads: 1
//!   max_width: 4096
//! ```

use std::fs;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Errors that can occur when loading the YAML configuration file
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Top-level service configuration.
///
/// Built once in `main` and shared read-only with every request handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Tokens accepted in the `auth_token` form field
    #[serde(default, deserialize_with = "one_or_many")]
    pub auth_token: Vec<String>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by the CORS layer; `"*"` allows every origin
    #[serde(default = "default_allowed_cors", deserialize_with = "one_or_many")]
    pub allowed_cors: Vec<String>,

    /// Default tracing filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub engine: EngineConfig,
}

impl ServiceConfig {
    /// Build a config accepting `tokens`, with every other key at its default
    pub fn with_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            auth_token: tokens.into_iter().map(Into::into).collect(),
            host: default_host(),
            port: default_port(),
            allowed_cors: default_allowed_cors(),
            log_level: default_log_level(),
            max_body_size_mb: default_max_body_size_mb(),
            timeout_secs: default_timeout_secs(),
            engine: EngineConfig::default(),
        }
    }

    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: ServiceConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.auth_token.is_empty() {
            return Err(ConfigLoadError::MissingField("auth_token".to_string()));
        }
        if self.auth_token.iter().any(|t| t.is_empty()) {
            return Err(ConfigLoadError::Validation(
                "auth_token entries must not be empty".to_string(),
            ));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigLoadError::Validation(
                "host must not be empty".to_string(),
            ));
        }
        if self.max_body_size_mb == 0 {
            return Err(ConfigLoadError::Validation(
                "max_body_size_mb must be >= 1".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigLoadError::Validation(
                "timeout_secs must be >= 1".to_string(),
            ));
        }
        self.engine.validate()
    }

    /// Resolve the socket address to bind to.
    ///
    /// Hostnames such as `localhost` are resolved; the first result wins.
    pub fn socket_addr(&self) -> io::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("{}:{} did not resolve to an address", self.host, self.port),
                )
            })
    }

    /// Whether the CORS origin list contains the `*` wildcard
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_cors.iter().any(|o| o.trim() == "*")
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }
}

/// Recognition model location and runtime knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// JSON charset: either `["", "a", ...]` or `{"charset": [...]}`
    #[serde(default = "default_charset_path")]
    pub charset_path: PathBuf,

    /// ONNX Runtime intra-op threads; runtime default when unset
    #[serde(default)]
    pub intra_threads: Option<usize>,

    /// Widest model input, in pixels after scaling to the model height
    #[serde(default = "default_max_width")]
    pub max_width: u32,
}

impl EngineConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.intra_threads == Some(0) {
            return Err(ConfigLoadError::Validation(
                "engine.intra_threads must be >= 1".to_string(),
            ));
        }
        if self.max_width == 0 {
            return Err(ConfigLoadError::Validation(
                "engine.max_width must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            charset_path: default_charset_path(),
            intra_threads: None,
            max_width: default_max_width(),
        }
    }
}

/// Accept either a YAML sequence or a single scalar string.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_allowed_cors() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_body_size_mb() -> usize {
    10
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/common.onnx")
}

fn default_charset_path() -> PathBuf {
    PathBuf::from("models/charset.json")
}

fn default_max_width() -> u32 {
    4096
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config = ServiceConfig::from_yaml(r#"auth_token: ["secret123"]"#).unwrap();
        assert_eq!(config.auth_token, vec!["secret123".to_string()]);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8000);
        assert_eq!(config.allowed_cors, vec!["*".to_string()]);
        assert!(config.allows_any_origin());
        assert_eq!(config.max_body_size(), 10 * 1024 * 1024);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.engine.model_path, PathBuf::from("models/common.onnx"));
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
auth_token:
  - alpha
  - beta
host: 0.0.0.0
port: 9100
allowed_cors:
  - https://app.example.com
log_level: debug
max_body_size_mb: 2
timeout_secs: 5
engine:
  model_path: /opt/models/captcha.onnx
  charset_path: /opt/models/captcha.json
  intra_threads: 2
  max_width: 1024
"#;

        let config = ServiceConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.auth_token.len(), 2);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9100);
        assert!(!config.allows_any_origin());
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.max_body_size(), 2 * 1024 * 1024);
        assert_eq!(config.engine.intra_threads, Some(2));
        assert_eq!(config.engine.max_width, 1024);
        assert_eq!(
            config.engine.charset_path,
            PathBuf::from("/opt/models/captcha.json")
        );
    }

    #[test]
    fn test_single_token_scalar() {
        let config = ServiceConfig::from_yaml("auth_token: lonely").unwrap();
        assert_eq!(config.auth_token, vec!["lonely".to_string()]);
    }

    #[test]
    fn test_missing_tokens_rejected() {
        let err = ServiceConfig::from_yaml("port: 8000").unwrap_err();
        assert!(matches!(err, ConfigLoadError::MissingField(ref f) if f == "auth_token"));

        let err = ServiceConfig::from_yaml("auth_token: []").unwrap_err();
        assert!(matches!(err, ConfigLoadError::MissingField(_)));
    }

    #[test]
    fn test_empty_token_entry_rejected() {
        let err = ServiceConfig::from_yaml(r#"auth_token: ["ok", ""]"#).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = ServiceConfig::from_yaml("auth_token: [unterminated").unwrap_err();
        assert!(matches!(err, ConfigLoadError::YamlParse(_)));

        let err = ServiceConfig::from_yaml("auth_token: [a]\nport: not-a-port").unwrap_err();
        assert!(matches!(err, ConfigLoadError::YamlParse(_)));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let err = ServiceConfig::from_yaml("auth_token: [a]\nmax_body_size_mb: 0").unwrap_err();
        assert!(err.to_string().contains("max_body_size_mb"));

        let err = ServiceConfig::from_yaml("auth_token: [a]\nengine:\n  intra_threads: 0")
            .unwrap_err();
        assert!(err.to_string().contains("intra_threads"));

        let err = ServiceConfig::from_yaml("auth_token: [a]\nengine:\n  max_width: 0")
            .unwrap_err();
        assert!(err.to_string().contains("max_width"));
    }

    #[test]
    fn test_load_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"auth_token: [\"secret123\"]\nport: 8123\n")
            .unwrap();

        let config = ServiceConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.port, 8123);
    }

    #[test]
    fn test_missing_file() {
        let err = ServiceConfig::from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigLoadError::FileRead(_)));
    }

    #[test]
    fn test_socket_addr() {
        let mut config = ServiceConfig::with_tokens(["t"]);
        config.port = 8123;
        let addr = config.socket_addr().unwrap();
        assert_eq!(addr.port(), 8123);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_wildcard_anywhere_in_list() {
        let config =
            ServiceConfig::from_yaml("auth_token: [a]\nallowed_cors: [\"https://x.dev\", \"*\"]")
                .unwrap();
        assert!(config.allows_any_origin());
    }
}
