//! Update client configuration
//!
//! Loaded from YAML or TOML, or built programmatically:
//!
//! ```yaml
//! host: "192.168.1.50"
//! port: 21
//! ftp:
//!   connect_timeout_ms: 5000
//!   command_timeout_ms: 30000
//! ```
//!
//! Login credentials, the control file name and the remote directory are fixed
//! by the module firmware and are not part of the configuration.

use std::path::Path;

use femc_ftp::{FtpClientConfig, DEFAULT_FTP_PORT};
use serde::{Deserialize, Serialize};

/// Configuration for [`FirmwareUpdateClient`](crate::FirmwareUpdateClient)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Module host name or address; when set the client connects on construction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// FTP control port (default: 21)
    #[serde(default = "default_port")]
    pub port: u16,

    /// FTP timeouts and limits
    #[serde(default)]
    pub ftp: FtpClientConfig,
}

fn default_port() -> u16 {
    DEFAULT_FTP_PORT
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            ftp: FtpClientConfig::default(),
        }
    }
}

impl UpdateConfig {
    /// Configuration for `host` with default settings
    pub fn for_host(host: impl Into<String>) -> Self {
        Self::builder().host(host).build()
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize configuration to YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Create a builder for programmatic configuration
    pub fn builder() -> UpdateConfigBuilder {
        UpdateConfigBuilder::new()
    }
}

/// Builder for UpdateConfig
#[derive(Debug, Default)]
pub struct UpdateConfigBuilder {
    config: UpdateConfig,
}

impl UpdateConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: UpdateConfig::default(),
        }
    }

    /// Set the module host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = Some(host.into());
        self
    }

    /// Set the FTP control port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the TCP connect timeout in milliseconds
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.ftp.connect_timeout_ms = ms;
        self
    }

    /// Set the per-command reply timeout in milliseconds
    pub fn command_timeout_ms(mut self, ms: u64) -> Self {
        self.config.ftp.command_timeout_ms = ms;
        self
    }

    /// Set the data connection idle timeout in milliseconds
    pub fn data_timeout_ms(mut self, ms: u64) -> Self {
        self.config.ftp.data_timeout_ms = ms;
        self
    }

    /// Build the configuration
    pub fn build(self) -> UpdateConfig {
        self.config
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
host: "192.168.1.50"
ftp:
  connect_timeout_ms: 5000
  data_timeout_ms: 60000
"#;

        let config = UpdateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.host.as_deref(), Some("192.168.1.50"));
        assert_eq!(config.port, 21);
        assert_eq!(config.ftp.connect_timeout_ms, 5000);
        assert_eq!(config.ftp.data_timeout_ms, 60000);
        assert_eq!(config.ftp.command_timeout_ms, 30_000);
    }

    #[test]
    fn test_toml_parsing() {
        let toml = r#"
host = "femc-bench"
port = 2121

[ftp]
command_timeout_ms = 1000
"#;

        let config = UpdateConfig::from_toml(toml).unwrap();
        assert_eq!(config.host.as_deref(), Some("femc-bench"));
        assert_eq!(config.port, 2121);
        assert_eq!(config.ftp.command_timeout_ms, 1000);
    }

    #[test]
    fn test_empty_yaml_has_no_host() {
        let config = UpdateConfig::from_yaml("{}").unwrap();
        assert_eq!(config.host, None);
        assert_eq!(config.port, 21);
        assert_eq!(config.ftp, FtpClientConfig::default());
    }

    #[test]
    fn test_builder() {
        let config = UpdateConfig::builder()
            .host("10.0.0.7")
            .port(2121)
            .connect_timeout_ms(1500)
            .command_timeout_ms(2500)
            .data_timeout_ms(3500)
            .build();

        assert_eq!(config.host.as_deref(), Some("10.0.0.7"));
        assert_eq!(config.port, 2121);
        assert_eq!(config.ftp.connect_timeout_ms, 1500);
        assert_eq!(config.ftp.command_timeout_ms, 2500);
        assert_eq!(config.ftp.data_timeout_ms, 3500);
    }

    #[test]
    fn test_yaml_round_trip_keeps_host() {
        let config = UpdateConfig::for_host("femc-7");
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("femc-7"));
        assert_eq!(UpdateConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let err = UpdateConfig::from_yaml_file("/nonexistent/femc.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
