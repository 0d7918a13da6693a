//! Client Configuration
//!
//! Connection settings for one robot, loaded from defaults, an optional TOML
//! file, environment variables and explicit overrides. A [`ClientConfig`] is
//! built fresh for every client and never mutated after the client starts.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. Explicit overrides ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! The configuration file lives at `$XDG_CONFIG_HOME/otbridge/client.toml`
//! (typically `~/.config/otbridge/client.toml`).
//!
//! # Example Configuration
//!
//! ```toml
//! [robot]
//! address = "169.254.10.12"
//! port = 31950
//! protocol_version = "3"
//! request_timeout_secs = 300
//!
//! [session]
//! alias_policy = "reject"
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Field |
//! |---|---|
//! | `OTBRIDGE_ROBOT_ADDRESS` (or `OPENTRONS_ROBOT_IP`) | `robot_address` |
//! | `OTBRIDGE_ROBOT_PORT` | `port` |
//! | `OTBRIDGE_PROTOCOL_VERSION` | `protocol_version` |
//! | `OTBRIDGE_REQUEST_TIMEOUT_SECS` | `request_timeout` |
//! | `OTBRIDGE_ALIAS_POLICY` | `alias_policy` |

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::AliasPolicy;

/// Default robot server port
pub const DEFAULT_PORT: u16 = 31950;

/// Default robot HTTP API version
pub const DEFAULT_PROTOCOL_VERSION: &str = "3";

/// Default request timeout
///
/// Commands sent with `waitUntilComplete` hold the request open while the
/// robot moves, so this is much longer than a typical HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Explicit override
    Override,
    /// Environment variable
    Env,
    /// TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Override => write!(f, "override"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[robot]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotToml {
    /// Robot IP address or host name
    pub address: Option<String>,

    /// Robot server port
    pub port: Option<u16>,

    /// Value of the `opentrons-version` header
    pub protocol_version: Option<String>,

    /// Whole-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

/// `[session]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// `reject` or `replace`
    pub alias_policy: Option<AliasPolicy>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Robot connection section
    pub robot: RobotToml,

    /// Session behaviour section
    pub session: SessionToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Connection and session settings for one client
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Robot IP address or host name
    pub robot_address: String,

    /// Robot server port
    pub port: u16,

    /// Value of the `opentrons-version` header
    pub protocol_version: String,

    /// Whole-request timeout
    pub request_timeout: Duration,

    /// Duplicate alias handling
    pub alias_policy: AliasPolicy,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            robot_address: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            alias_policy: AliasPolicy::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Defaults pointed at `robot_address`
    #[must_use]
    pub fn new(robot_address: impl Into<String>) -> Self {
        Self {
            robot_address: robot_address.into(),
            source: ConfigSource::Override,
            ..Self::default()
        }
    }

    /// Set the port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the protocol version header value
    #[must_use]
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    /// Set the request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the alias policy
    #[must_use]
    pub fn with_alias_policy(mut self, policy: AliasPolicy) -> Self {
        self.alias_policy = policy;
        self
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check values the client cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.robot_address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "robot address must not be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::ValidationError(
                "robot port must not be 0".to_string(),
            ));
        }
        if self.protocol_version.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "protocol version must not be empty".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/otbridge/client.toml` or
/// `~/.config/otbridge/client.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("otbridge").join("client.toml"))
}

/// Load configuration from the default file, environment and defaults
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the resulting configuration is invalid. A missing file is not an error.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the resulting configuration is invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with a custom environment lookup
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ClientToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    if let Some(ref address) = toml.robot.address {
        config.robot_address.clone_from(address);
    }
    if let Some(port) = toml.robot.port {
        config.port = port;
    }
    if let Some(ref version) = toml.robot.protocol_version {
        config.protocol_version.clone_from(version);
    }
    if let Some(secs) = toml.robot.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }

    if let Some(policy) = toml.session.alias_policy {
        config.alias_policy = policy;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ClientConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(address) = env("OTBRIDGE_ROBOT_ADDRESS").or_else(|| env("OPENTRONS_ROBOT_IP")) {
        config.robot_address = address;
        config.source = ConfigSource::Env;
    }
    if let Some(port) = env("OTBRIDGE_ROBOT_PORT") {
        if let Ok(port) = port.parse::<u16>() {
            config.port = port;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(version) = env("OTBRIDGE_PROTOCOL_VERSION") {
        config.protocol_version = version;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = env("OTBRIDGE_REQUEST_TIMEOUT_SECS") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.request_timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(policy) = env("OTBRIDGE_ALIAS_POLICY") {
        if let Some(policy) = AliasPolicy::parse(&policy) {
            config.alias_policy = policy;
            config.source = ConfigSource::Env;
        } else {
            tracing::warn!(value = %policy, "Ignoring unknown OTBRIDGE_ALIAS_POLICY");
        }
    }
}

// =============================================================================
// Override Support
// =============================================================================

/// Explicit overrides applied after loading
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Robot address override
    pub robot_address: Option<String>,

    /// Port override
    pub port: Option<u16>,

    /// Request timeout override
    pub request_timeout: Option<Duration>,

    /// Alias policy override
    pub alias_policy: Option<AliasPolicy>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set robot address override
    #[must_use]
    pub fn with_robot_address(mut self, address: impl Into<String>) -> Self {
        self.robot_address = Some(address.into());
        self
    }

    /// Set port override
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set request timeout override
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set alias policy override
    #[must_use]
    pub fn with_alias_policy(mut self, policy: AliasPolicy) -> Self {
        self.alias_policy = Some(policy);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ClientConfig) {
        if self.robot_address.is_some()
            || self.port.is_some()
            || self.request_timeout.is_some()
            || self.alias_policy.is_some()
        {
            config.source = ConfigSource::Override;
        }

        if let Some(ref address) = self.robot_address {
            config.robot_address.clone_from(address);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(timeout) = self.request_timeout {
            config.request_timeout = timeout;
        }
        if let Some(policy) = self.alias_policy {
            config.alias_policy = policy;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
