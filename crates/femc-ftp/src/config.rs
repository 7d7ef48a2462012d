//! FTP session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default FTP control port
pub const DEFAULT_FTP_PORT: u16 = 21;

/// Timeouts and limits for one FTP session
///
/// Embedded FTP servers have no interactive recovery path, so every step is
/// bounded: a server that stops answering surfaces as a timeout instead of a hang.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtpClientConfig {
    /// TCP connect timeout for control and data connections (default: 10s)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Time allowed for a complete reply to one command (default: 30s)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// Idle timeout on the data connection during a transfer (default: 30s)
    #[serde(default = "default_data_timeout")]
    pub data_timeout_ms: u64,

    /// Maximum number of lines accepted in a multi-line reply
    #[serde(default = "default_max_reply_lines")]
    pub max_reply_lines: usize,

    /// Buffer size for binary transfers
    #[serde(default = "default_transfer_chunk_size")]
    pub transfer_chunk_size: usize,
}

impl Default for FtpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            command_timeout_ms: default_command_timeout(),
            data_timeout_ms: default_data_timeout(),
            max_reply_lines: default_max_reply_lines(),
            transfer_chunk_size: default_transfer_chunk_size(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_command_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_data_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_max_reply_lines() -> usize {
    64
}

fn default_transfer_chunk_size() -> usize {
    16 * 1024
}

impl FtpClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn data_timeout(&self) -> Duration {
        Duration::from_millis(self.data_timeout_ms)
    }
}

/// Credential triple sent during login
///
/// The account is only sent when the server asks for it after the password.
#[derive(Clone, PartialEq, Eq)]
pub struct FtpCredentials {
    pub user: String,
    pub password: String,
    pub account: String,
}

impl FtpCredentials {
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            account: account.into(),
        }
    }
}

impl std::fmt::Debug for FtpCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpCredentials")
            .field("user", &self.user)
            .field("password", &"***")
            .field("account", &self.account)
            .finish()
    }
}

/// Host and port of an FTP server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpTarget {
    pub host: String,
    pub port: u16,
}

impl FtpTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for FtpTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FtpClientConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.command_timeout(), Duration::from_secs(30));
        assert_eq!(config.data_timeout(), Duration::from_secs(30));
        assert_eq!(config.transfer_chunk_size, 16 * 1024);
    }

    #[test]
    fn test_credentials_debug_masks_password() {
        let creds = FtpCredentials::new("update", "secret", "update");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("update"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_target_display() {
        assert_eq!(FtpTarget::new("femc-1", 21).to_string(), "femc-1:21");
        assert_eq!(FtpTarget::new("::1", 2121).to_string(), "[::1]:2121");
    }
}
