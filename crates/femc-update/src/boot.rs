//! Boot executable selection
//!
//! The module runs `RUN_FEMC.BAT` at startup. The batch file holds a single
//! line naming the executable to launch, so selecting new firmware means
//! rewriting that line. The change takes effect on the next reboot.

use tracing::{debug, info, instrument};

use crate::client::FirmwareUpdateClient;
use crate::error::{Result, UpdateError};

/// Control file naming the executable to run after reboot
pub const CONTROL_FILE: &str = "RUN_FEMC.BAT";

impl FirmwareUpdateClient {
    /// Name of the executable the module will run after its next reboot
    ///
    /// Reads the first line of the control file. An empty control file, a blank
    /// first line or text that is not UTF-8 is a [`UpdateError::ProtocolData`]
    /// error.
    #[instrument(skip(self))]
    pub fn get_exe_name(&mut self) -> Result<String> {
        let lines = self.with_active_session(|runtime, session| {
            runtime
                .block_on(session.retrieve_lines(CONTROL_FILE))
                .map_err(|e| UpdateError::from_transfer(CONTROL_FILE, None, e))
        })?;

        let name = lines
            .into_iter()
            .next()
            .ok_or_else(|| UpdateError::ProtocolData(format!("{} is empty", CONTROL_FILE)))?;
        if name.trim().is_empty() {
            return Err(UpdateError::ProtocolData(format!(
                "{} starts with a blank line",
                CONTROL_FILE
            )));
        }
        debug!(%name, "Boot executable");
        Ok(name)
    }

    /// Select the executable to run after the next reboot
    ///
    /// Replaces the control file with `name` followed by one line terminator.
    /// The module is not rebooted, and `name` is not checked against the files
    /// present on the module.
    #[instrument(skip(self))]
    pub fn set_exe_name(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(UpdateError::invalid_name(name, "executable name is empty"));
        }
        if name.contains(['\r', '\n']) {
            return Err(UpdateError::invalid_name(
                name,
                "executable name contains a line terminator",
            ));
        }

        self.with_active_session(|runtime, session| {
            runtime
                .block_on(session.store_lines(CONTROL_FILE, &[name.to_string()]))
                .map_err(|e| UpdateError::from_transfer(CONTROL_FILE, None, e))
        })?;

        info!(name, "Boot executable selected for next reboot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use femc_ftp::MockFtpServer;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::client::update_credentials;
    use crate::config::UpdateConfig;

    fn connected(server: &MockFtpServer) -> FirmwareUpdateClient {
        FirmwareUpdateClient::with_connector(
            UpdateConfig::for_host("femc-1"),
            Arc::new(server.connector()),
        )
        .unwrap()
    }

    #[test]
    fn test_set_then_get() {
        let server = MockFtpServer::new(update_credentials());
        let mut client = connected(&server);

        client.set_exe_name("FIRMWARE_V3.EXE").unwrap();
        assert_eq!(client.get_exe_name().unwrap(), "FIRMWARE_V3.EXE");
        assert_eq!(
            server.file(CONTROL_FILE).unwrap(),
            b"FIRMWARE_V3.EXE\r\n".to_vec()
        );
    }

    #[test]
    fn test_control_file_uses_ascii_mode() {
        let server = MockFtpServer::new(update_credentials());
        let mut client = connected(&server);

        client.set_exe_name("FEMC.EXE").unwrap();
        client.get_exe_name().unwrap();

        let commands = server.commands();
        assert!(commands.contains(&"TYPE A".to_string()));
        assert!(!commands.contains(&"TYPE I".to_string()));
    }

    #[test]
    fn test_set_replaces_previous_content() {
        let server = MockFtpServer::new(update_credentials());
        server.insert_file(CONTROL_FILE, "OLD.EXE\r\nleftover\r\n");
        let mut client = connected(&server);

        client.set_exe_name("NEW.EXE").unwrap();
        assert_eq!(server.file(CONTROL_FILE).unwrap(), b"NEW.EXE\r\n".to_vec());
    }

    #[test]
    fn test_get_returns_first_line_only() {
        let server = MockFtpServer::new(update_credentials());
        server.insert_file(CONTROL_FILE, "FEMC_3_6.EXE\r\nREM trailing\r\n");
        let mut client = connected(&server);

        assert_eq!(client.get_exe_name().unwrap(), "FEMC_3_6.EXE");
    }

    #[test]
    fn test_empty_control_file_is_protocol_error() {
        let server = MockFtpServer::new(update_credentials());
        server.insert_file(CONTROL_FILE, "");
        let mut client = connected(&server);

        assert!(matches!(
            client.get_exe_name(),
            Err(UpdateError::ProtocolData(_))
        ));
    }

    #[test]
    fn test_blank_first_line_is_protocol_error() {
        let server = MockFtpServer::new(update_credentials());
        server.insert_file(CONTROL_FILE, "\r\nFEMC.EXE\r\n");
        let mut client = connected(&server);

        assert!(matches!(
            client.get_exe_name(),
            Err(UpdateError::ProtocolData(_))
        ));
        assert!(client.is_connected());
    }

    #[test]
    fn test_non_utf8_control_file_is_protocol_error() {
        let server = MockFtpServer::new(update_credentials());
        server.insert_file(CONTROL_FILE, vec![b'F', 0xFF, b'.', b'E', b'X', b'E', b'\r', b'\n']);
        let mut client = connected(&server);

        assert!(matches!(
            client.get_exe_name(),
            Err(UpdateError::ProtocolData(_))
        ));
    }

    #[test]
    fn test_transport_failure_disconnects() {
        let server = MockFtpServer::new(update_credentials());
        server.insert_file(CONTROL_FILE, "FEMC.EXE\r\n");
        server.set_fail_transfers(true);
        let mut client = connected(&server);

        let err = client.get_exe_name().unwrap_err();
        assert!(err.is_connection_error(), "unexpected {:?}", err);
        assert!(!client.is_connected());
        assert!(matches!(
            client.set_exe_name("FEMC.EXE"),
            Err(UpdateError::NotConnected)
        ));
        assert_eq!(server.quits(), 0);
    }

    #[test]
    fn test_missing_control_file_is_transfer_fault() {
        let server = MockFtpServer::new(update_credentials());
        let mut client = connected(&server);

        let err = client.get_exe_name().unwrap_err();
        assert!(err.is_transfer_fault(), "unexpected {:?}", err);
    }

    #[test]
    fn test_multi_line_name_rejected_before_io() {
        let server = MockFtpServer::new(update_credentials());
        let mut client = connected(&server);
        let before = server.commands().len();

        assert!(matches!(
            client.set_exe_name("A.EXE\r\nB.EXE"),
            Err(UpdateError::InvalidName { .. })
        ));
        assert!(matches!(
            client.set_exe_name(""),
            Err(UpdateError::InvalidName { .. })
        ));
        assert_eq!(server.commands().len(), before);
    }

    #[test]
    fn test_requires_connection() {
        let server = MockFtpServer::new(update_credentials());
        let mut client =
            FirmwareUpdateClient::with_connector(UpdateConfig::default(), Arc::new(server.connector()))
                .unwrap();

        assert!(matches!(client.get_exe_name(), Err(UpdateError::NotConnected)));
        assert!(matches!(
            client.set_exe_name("FEMC.EXE"),
            Err(UpdateError::NotConnected)
        ));
    }
}
