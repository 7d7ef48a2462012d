//! In-memory FTP session for testing
//!
//! [`MockFtpServer`] holds the shared state (files, command log, failure knobs);
//! [`MockConnector`] hands out [`MockFtpSession`]s that operate on it. No sockets
//! are involved, so tests can run without a network stack.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::{FtpCredentials, FtpTarget};
use crate::error::{FtpError, Result};
use crate::reply::FtpReply;
use crate::session::{FtpConnector, FtpSession};

#[derive(Debug)]
struct MockState {
    files: BTreeMap<String, Vec<u8>>,
    commands: Vec<String>,
    connections: usize,
    quits: usize,
    credentials: FtpCredentials,
    refuse_connections: bool,
    read_only: bool,
    fail_transfers: bool,
}

/// Shared state of a fake FTP server
#[derive(Debug, Clone)]
pub struct MockFtpServer {
    state: Arc<Mutex<MockState>>,
}

impl MockFtpServer {
    /// Create a server accepting the given credentials
    pub fn new(credentials: FtpCredentials) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                files: BTreeMap::new(),
                commands: Vec::new(),
                connections: 0,
                quits: 0,
                credentials,
                refuse_connections: false,
                read_only: false,
                fail_transfers: false,
            })),
        }
    }

    /// Connector whose sessions operate on this server
    pub fn connector(&self) -> MockConnector {
        MockConnector {
            server: self.clone(),
        }
    }

    /// Place a file on the server
    pub fn insert_file(&self, name: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.state.lock().files.insert(name.into(), contents.into());
    }

    /// Raw contents of a stored file
    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(name).cloned()
    }

    /// Names of all stored files
    pub fn file_names(&self) -> Vec<String> {
        self.state.lock().files.keys().cloned().collect()
    }

    /// Every command received so far, passwords masked
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    /// Number of sessions opened
    pub fn connections(&self) -> usize {
        self.state.lock().connections
    }

    /// Number of `QUIT` commands received
    pub fn quits(&self) -> usize {
        self.state.lock().quits
    }

    /// Refuse new connections (simulates an unreachable host)
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connections = refuse;
    }

    /// Reject every store (simulates full or read-only storage)
    pub fn set_read_only(&self, read_only: bool) {
        self.state.lock().read_only = read_only;
    }

    /// Fail every data transfer with a data connection timeout
    pub fn set_fail_transfers(&self, fail: bool) {
        self.state.lock().fail_transfers = fail;
    }

    fn record(&self, command: impl Into<String>) {
        self.state.lock().commands.push(command.into());
    }
}

/// Connector for [`MockFtpServer`]
#[derive(Debug, Clone)]
pub struct MockConnector {
    server: MockFtpServer,
}

#[async_trait]
impl FtpConnector for MockConnector {
    async fn connect(&self, target: &FtpTarget) -> Result<Box<dyn FtpSession>> {
        {
            let mut state = self.server.state.lock();
            if state.refuse_connections {
                return Err(FtpError::Connect {
                    addr: target.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "connection refused",
                    ),
                });
            }
            state.connections += 1;
        }
        Ok(Box::new(MockFtpSession {
            server: self.server.clone(),
            logged_in: false,
            closed: false,
        }))
    }
}

/// Session against a [`MockFtpServer`]
#[derive(Debug)]
pub struct MockFtpSession {
    server: MockFtpServer,
    logged_in: bool,
    closed: bool,
}

impl MockFtpSession {
    fn ensure_ready(&self, command: &str) -> Result<()> {
        if self.closed {
            return Err(FtpError::ConnectionClosed);
        }
        if !self.logged_in {
            return Err(FtpError::rejected(command, FtpReply::new(530, "Not logged in")));
        }
        Ok(())
    }

    /// Data phase outcome once the transfer command has been accepted
    fn data_phase(&self) -> Result<()> {
        if self.server.state.lock().fail_transfers {
            return Err(FtpError::Timeout("data connection idle".into()));
        }
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Vec<u8>> {
        self.server
            .file(name)
            .ok_or_else(|| FtpError::rejected("RETR", FtpReply::new(550, "File not found")))
    }

    fn save(&self, name: &str, contents: Vec<u8>) -> Result<()> {
        let mut state = self.server.state.lock();
        if state.read_only {
            return Err(FtpError::rejected(
                "STOR",
                FtpReply::new(552, "Insufficient storage space"),
            ));
        }
        state.files.insert(name.to_string(), contents);
        Ok(())
    }
}

#[async_trait]
impl FtpSession for MockFtpSession {
    async fn login(&mut self, credentials: &FtpCredentials) -> Result<()> {
        if self.closed {
            return Err(FtpError::ConnectionClosed);
        }
        self.server.record(format!("USER {}", credentials.user));
        self.server.record("PASS ***");
        self.server.record("ACCT ***");

        let expected = self.server.state.lock().credentials.clone();
        if *credentials != expected {
            return Err(FtpError::rejected(
                "login",
                FtpReply::new(530, "Login incorrect"),
            ));
        }
        self.logged_in = true;
        Ok(())
    }

    async fn quit(&mut self) -> Result<()> {
        if self.closed {
            return Err(FtpError::ConnectionClosed);
        }
        self.server.record("QUIT");
        self.server.state.lock().quits += 1;
        self.closed = true;
        Ok(())
    }

    async fn retrieve_lines(&mut self, name: &str) -> Result<Vec<String>> {
        self.ensure_ready("RETR")?;
        self.server.record("TYPE A");
        self.server.record(format!("RETR {}", name));

        let contents = self.load(name)?;
        self.data_phase()?;
        let text = String::from_utf8(contents)
            .map_err(|_| FtpError::InvalidData(format!("{} is not UTF-8", name)))?;
        Ok(text.lines().map(str::to_string).collect())
    }

    async fn store_lines(&mut self, name: &str, lines: &[String]) -> Result<()> {
        self.ensure_ready("STOR")?;
        self.server.record("TYPE A");
        self.server.record(format!("STOR {}", name));

        self.data_phase()?;
        let contents: String = lines.iter().map(|l| format!("{}\r\n", l)).collect();
        self.save(name, contents.into_bytes())
    }

    async fn retrieve_binary(
        &mut self,
        name: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        self.ensure_ready("RETR")?;
        self.server.record("TYPE I");
        self.server.record(format!("RETR {}", name));

        let contents = self.load(name)?;
        self.data_phase()?;
        sink.write_all(&contents).await.map_err(FtpError::Sink)?;
        sink.flush().await.map_err(FtpError::Sink)?;
        Ok(contents.len() as u64)
    }

    async fn store_binary(
        &mut self,
        name: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64> {
        self.ensure_ready("STOR")?;
        self.server.record("TYPE I");
        self.server.record(format!("STOR {}", name));

        self.data_phase()?;
        let mut contents = Vec::new();
        source
            .read_to_end(&mut contents)
            .await
            .map_err(FtpError::Source)?;
        let len = contents.len() as u64;
        self.save(name, contents)?;
        Ok(len)
    }

    async fn list_names(&mut self) -> Result<Vec<String>> {
        self.ensure_ready("NLST")?;
        self.server.record("TYPE A");
        self.server.record("NLST");
        self.data_phase()?;
        Ok(self.server.file_names())
    }
}
