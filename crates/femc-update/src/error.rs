//! Error types for firmware update operations

use std::path::PathBuf;

use femc_ftp::FtpError;
use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for firmware update operations
pub type Result<T> = std::result::Result<T, UpdateError>;

/// Errors surfaced by [`FirmwareUpdateClient`](crate::FirmwareUpdateClient)
///
/// Nothing is retried or recovered internally; every failure reaches the caller.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Transport or login failure, or transport failure during a round trip
    #[error("Connection error: {0}")]
    Connection(#[source] FtpError),

    /// No host was given and none is configured
    #[error("No host configured")]
    NoHost,

    /// The module rejected a read or write (missing file, permissions, storage full)
    #[error("Transfer of {name} failed: {source}")]
    Transfer {
        name: String,
        #[source]
        source: FtpError,
    },

    /// A local file could not be opened, created, read, or written
    #[error("Local file {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Remote data did not have the expected shape
    #[error("Protocol data error: {0}")]
    ProtocolData(String),

    /// Operation needs an active session
    #[error("Not connected to a module")]
    NotConnected,

    /// Name cannot be used for the requested operation
    #[error("Invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// The runtime driving the session could not be created
    #[error("Runtime error: {0}")]
    Runtime(#[source] std::io::Error),

    /// A blocking operation was called from inside an async runtime
    #[error("Blocking update client used inside an async runtime")]
    InsideAsyncRuntime,

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl UpdateError {
    pub(crate) fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason,
        }
    }

    /// Classify an FTP failure that happened while transferring `name`
    ///
    /// `local` is the local file involved, reported when the sink or source failed.
    /// Undecodable text is a [`ProtocolData`](Self::ProtocolData) error.
    pub(crate) fn from_transfer(name: &str, local: Option<&std::path::Path>, err: FtpError) -> Self {
        match err {
            FtpError::Sink(source) | FtpError::Source(source) => Self::LocalIo {
                path: local.map(PathBuf::from).unwrap_or_default(),
                source,
            },
            FtpError::InvalidData(msg) => Self::ProtocolData(format!("{}: {}", name, msg)),
            err if err.is_transport() => Self::Connection(err),
            err => Self::Transfer {
                name: name.to_string(),
                source: err,
            },
        }
    }

    /// True for connection-class failures (transport, login, timeout, missing host)
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::NoHost)
    }

    /// True when the module rejected a transfer or no session was active
    pub fn is_transfer_fault(&self) -> bool {
        matches!(self, Self::Transfer { .. } | Self::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use femc_ftp::FtpReply;

    #[test]
    fn test_rejection_maps_to_transfer() {
        let err = UpdateError::from_transfer(
            "FEMC.EXE",
            None,
            FtpError::rejected("RETR", FtpReply::new(550, "File not found")),
        );
        match &err {
            UpdateError::Transfer { name, source } => {
                assert_eq!(name, "FEMC.EXE");
                assert_eq!(source.reply_code(), Some(550));
            }
            other => panic!("Expected Transfer, got {:?}", other),
        }
        assert!(err.is_transfer_fault());
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_transport_failure_maps_to_connection() {
        let err = UpdateError::from_transfer(
            "FEMC.EXE",
            None,
            FtpError::Timeout("data connection idle".into()),
        );
        assert!(matches!(err, UpdateError::Connection(FtpError::Timeout(_))));
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_sink_failure_maps_to_local_io() {
        let err = UpdateError::from_transfer(
            "FEMC.EXE",
            Some(std::path::Path::new("out/FEMC.EXE")),
            FtpError::Sink(std::io::Error::other("disk full")),
        );
        match err {
            UpdateError::LocalIo { path, .. } => assert_eq!(path, PathBuf::from("out/FEMC.EXE")),
            other => panic!("Expected LocalIo, got {:?}", other),
        }
    }

    #[test]
    fn test_undecodable_text_maps_to_protocol_data() {
        let err = UpdateError::from_transfer(
            "RUN_FEMC.BAT",
            None,
            FtpError::InvalidData("line 1 is not UTF-8".into()),
        );
        match err {
            UpdateError::ProtocolData(msg) => assert!(msg.contains("RUN_FEMC.BAT")),
            other => panic!("Expected ProtocolData, got {:?}", other),
        }
    }

    #[test]
    fn test_not_connected_is_transfer_fault() {
        assert!(UpdateError::NotConnected.is_transfer_fault());
        assert!(UpdateError::NoHost.is_connection_error());
    }
}
