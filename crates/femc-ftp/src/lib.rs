//! femc-ftp - minimal FTP session layer for FEMC module updates
//!
//! Implements the subset of FTP (RFC 959) that the FEMC firmware-update
//! server understands: login with an optional account, `TYPE A`/`TYPE I`,
//! passive-mode `RETR`/`STOR`/`NLST`, and `QUIT`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ FtpConnector ──connect──▶ Box<dyn FtpSession> │
//! │                                              │
//! │ TcpFtpSession                                │
//! │   ControlChannel  (commands / ReplyParser)   │
//! │   transfer        (PASV data connections)    │
//! │                                              │
//! │ MockFtpSession    (in-memory, for tests)     │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use femc_ftp::{FtpClientConfig, FtpConnector, FtpCredentials, FtpTarget, TcpConnector};
//!
//! let connector = TcpConnector::new(FtpClientConfig::default());
//! let mut session = connector.connect(&FtpTarget::new("192.168.1.50", 21)).await?;
//! session.login(&FtpCredentials::new("user", "pass", "acct")).await?;
//! let lines = session.retrieve_lines("README.TXT").await?;
//! session.quit().await?;
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod mock;
pub mod reply;
pub mod session;
mod transfer;

pub use config::{FtpClientConfig, FtpCredentials, FtpTarget, DEFAULT_FTP_PORT};
pub use error::{FtpError, Result};
pub use mock::{MockConnector, MockFtpServer};
pub use reply::{FtpReply, ReplyClass};
pub use session::{FtpConnector, FtpSession, TcpConnector, TcpFtpSession, TransferType};
