//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via DBAPI_CONFIG or --config)
//! 3. Environment variables

use dbapi_protocol::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Channel broker limits.
    pub broker: BrokerConfig,
    /// Certificate details reported by the instance info endpoint.
    pub https: HttpsInfoConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

impl Config {
    /// Loads configuration from `DBAPI_CONFIG` if set, then applies
    /// environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var("DBAPI_CONFIG") {
            Ok(path) => Self::load_from(path),
            Err(_) => Ok(Self::from_env()),
        }
    }

    /// Loads configuration from the given file, then applies environment
    /// variable overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.auth.apply_env_overrides();
        self.broker.apply_env_overrides();
        self.https.apply_env_overrides();
        self.metrics.apply_env_overrides();
    }

    /// Loads secrets from external file if configured.
    pub fn load_secrets(&mut self) -> Result<(), ConfigError> {
        self.auth.load_secrets()
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker.validate()?;
        for hash in &self.auth.token_hashes {
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigError::ValidationError(format!(
                    "token hash '{}' is not a SHA-256 hex digest",
                    hash
                )));
            }
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_connections: 1000,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("DBAPI_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(max) = std::env::var("DBAPI_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Whether requests must carry a valid token.
    pub required: bool,
    /// Whether loopback callers must present a token too.
    pub require_token_for_localhost: bool,
    /// List of valid token hashes (SHA-256 hex strings).
    /// Generate hashes with: `dbapi hash-token <token>`
    pub token_hashes: Vec<String>,
    /// Optional path to external secrets file containing token hashes (one per line).
    pub secrets_file: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            required: true,
            require_token_for_localhost: true,
            token_hashes: Vec::new(),
            secrets_file: None,
        }
    }
}

impl AuthConfig {
    fn apply_env_overrides(&mut self) {
        if let Some(required) = env_flag("DBAPI_AUTH_REQUIRED") {
            self.required = required;
        }

        if let Some(required) = env_flag("DBAPI_REQUIRE_TOKEN_FOR_LOCALHOST") {
            self.require_token_for_localhost = required;
        }

        if let Ok(hash) = std::env::var("DBAPI_AUTH_TOKEN_HASH") {
            if !hash.is_empty() {
                self.token_hashes.push(hash);
            }
        }

        if let Ok(path) = std::env::var("DBAPI_AUTH_SECRETS_FILE") {
            self.secrets_file = Some(PathBuf::from(path));
        }
    }

    /// Loads token hashes from the secrets file if configured.
    pub fn load_secrets(&mut self) -> Result<(), ConfigError> {
        if let Some(ref path) = self.secrets_file {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(path.clone(), e))?;
            for line in content.lines() {
                let line = line.trim();
                // Skip empty lines and comments
                if !line.is_empty() && !line.starts_with('#') {
                    self.token_hashes.push(line.to_string());
                }
            }
        }
        Ok(())
    }

    /// Returns whether authentication is effectively disabled.
    pub fn is_disabled(&self) -> bool {
        !self.required
    }
}

/// Channel broker limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Maximum number of distinct channels.
    pub max_channels: usize,
    /// Maximum number of messages held by one channel.
    pub max_messages_per_channel: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_channels: 50,
            max_messages_per_channel: 100,
        }
    }
}

impl BrokerConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(max) = std::env::var("DBAPI_MAX_CHANNELS") {
            if let Ok(n) = max.parse() {
                self.max_channels = n;
            }
        }

        if let Ok(max) = std::env::var("DBAPI_MAX_MESSAGES_PER_CHANNEL") {
            if let Ok(n) = max.parse() {
                self.max_messages_per_channel = n;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_channels == 0 {
            return Err(ConfigError::ValidationError(
                "broker.max_channels must be at least 1".to_string(),
            ));
        }
        if self.max_messages_per_channel == 0 {
            return Err(ConfigError::ValidationError(
                "broker.max_messages_per_channel must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Certificate details for the instance info endpoint.
///
/// TLS is terminated in front of this server; these fields only describe it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpsInfoConfig {
    pub enabled: bool,
    pub self_signed: bool,
    /// Base64 certificate hash.
    pub certificate: String,
}

impl HttpsInfoConfig {
    fn apply_env_overrides(&mut self) {
        if let Some(enabled) = env_flag("DBAPI_HTTPS_ENABLED") {
            self.enabled = enabled;
        }
        if let Some(self_signed) = env_flag("DBAPI_HTTPS_SELF_SIGNED") {
            self.self_signed = self_signed;
        }
        if let Ok(certificate) = std::env::var("DBAPI_HTTPS_CERTIFICATE") {
            self.certificate = certificate;
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics HTTP server.
    pub enabled: bool,
    /// Address to bind the metrics server to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9090)),
        }
    }
}

impl MetricsConfig {
    fn apply_env_overrides(&mut self) {
        if let Some(enabled) = env_flag("DBAPI_METRICS_ENABLED") {
            self.enabled = enabled;
        }
        if let Ok(addr) = std::env::var("DBAPI_METRICS_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
