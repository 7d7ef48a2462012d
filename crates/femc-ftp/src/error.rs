//! FTP session errors

use thiserror::Error;

use crate::reply::FtpReply;

/// Result type alias for FTP session operations
pub type Result<T> = std::result::Result<T, FtpError>;

/// Errors raised by the FTP session layer
#[derive(Debug, Error)]
pub enum FtpError {
    /// TCP connection to the server could not be established
    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A step did not complete within its configured timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Control or data channel I/O failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server closed the control connection
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// Server sent something that is not a valid FTP reply
    #[error("Invalid reply: {0}")]
    InvalidReply(String),

    /// Server answered a command with a negative or unexpected reply
    #[error("{command} rejected: {reply}")]
    Rejected { command: String, reply: FtpReply },

    /// Passive mode reply could not be used to open a data connection
    #[error("Passive mode failed: {0}")]
    PassiveMode(String),

    /// Writing retrieved data to the local sink failed
    #[error("Local sink write failed: {0}")]
    Sink(#[source] std::io::Error),

    /// Retrieved text could not be decoded
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Reading data to store from the local source failed
    #[error("Local source read failed: {0}")]
    Source(#[source] std::io::Error),
}

impl FtpError {
    /// Create a rejection error from the command verb and the server reply
    pub fn rejected(command: impl Into<String>, reply: FtpReply) -> Self {
        Self::Rejected {
            command: command.into(),
            reply,
        }
    }

    /// True for failures of the transport itself rather than a server decision
    ///
    /// Rejections, undecodable data and local sink/source failures are not
    /// transport failures.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::Timeout(_)
                | Self::Io(_)
                | Self::ConnectionClosed
                | Self::InvalidReply(_)
                | Self::PassiveMode(_)
        )
    }

    /// The server reply code, when the server rejected a command
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { reply, .. } => Some(reply.code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_is_not_transport() {
        let err = FtpError::rejected("RETR", FtpReply::new(550, "File not found"));
        assert!(!err.is_transport());
        assert_eq!(err.reply_code(), Some(550));
        assert_eq!(err.to_string(), "RETR rejected: 550 File not found");
    }

    #[test]
    fn test_timeout_is_transport() {
        let err = FtpError::Timeout("reply to USER".into());
        assert!(err.is_transport());
        assert_eq!(err.reply_code(), None);
    }

    #[test]
    fn test_invalid_data_is_not_transport() {
        let err = FtpError::InvalidData("line 1 is not UTF-8".into());
        assert!(!err.is_transport());
        assert_eq!(err.reply_code(), None);
    }

    #[test]
    fn test_sink_failure_is_local() {
        let err = FtpError::Sink(std::io::Error::other("disk full"));
        assert!(!err.is_transport());
    }
}
