//! femc-update - firmware and configuration deployment for FEMC modules
//!
//! Connects to the FTP server of an FEMC module (3.x firmware), uploads and
//! downloads files in its storage directory, and selects the executable the
//! module boots on its next restart.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ FirmwareUpdateClient (blocking)                  │
//! │   session lifecycle   connect / disconnect / Drop │
//! │   boot selector       get_exe_name / set_exe_name │
//! │   transfer engine     put_file / get_file         │
//! └───────────────────────┬──────────────────────────┘
//!                         │ owned tokio runtime
//! ┌───────────────────────┴──────────────────────────┐
//! │ femc-ftp: FtpConnector ──▶ Box<dyn FtpSession>    │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use femc_update::{FirmwareUpdateClient, UpdateConfig};
//!
//! # fn main() -> femc_update::Result<()> {
//! let config = UpdateConfig::from_yaml_file("femc.yaml")?;
//! FirmwareUpdateClient::with_session(config, |client| {
//!     client.put_file("build/FEMC_3_6.EXE")?;
//!     client.set_exe_name("FEMC_3_6.EXE")
//! })?;
//! # Ok(())
//! # }
//! ```

mod boot;
mod client;
pub mod config;
mod error;
pub mod testing;
mod transfer;

pub use boot::CONTROL_FILE;
pub use client::{update_credentials, FirmwareUpdateClient, SessionState, REMOTE_STORAGE_DIR};
pub use config::{ConfigError, UpdateConfig, UpdateConfigBuilder};
pub use error::{Result, UpdateError};
