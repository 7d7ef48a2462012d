//! FTP session trait and TCP implementation
//!
//! [`FtpSession`] is the narrow contract the update client needs from an FTP
//! library: login, graceful quit, line-mode and binary-mode transfers of named
//! files, and a name listing. [`FtpConnector`] opens sessions, which lets tests
//! substitute the in-memory [`mock`](crate::mock) implementation.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::config::{FtpClientConfig, FtpCredentials, FtpTarget};
use crate::control::{verb, ControlChannel};
use crate::error::{FtpError, Result};
use crate::transfer;

/// Transfer representation type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    /// `TYPE A`: text, lines terminated by CRLF on the wire
    Ascii,
    /// `TYPE I`: bytes transferred unchanged
    Image,
}

impl TransferType {
    fn command(self) -> &'static str {
        match self {
            Self::Ascii => "TYPE A",
            Self::Image => "TYPE I",
        }
    }
}

/// An open FTP session
#[async_trait]
pub trait FtpSession: Send {
    /// Authenticate; the account is sent only if the server asks for it
    async fn login(&mut self, credentials: &FtpCredentials) -> Result<()>;

    /// Send `QUIT` and close the control connection
    async fn quit(&mut self) -> Result<()>;

    /// Retrieve a file in ASCII mode as lines without terminators
    async fn retrieve_lines(&mut self, name: &str) -> Result<Vec<String>>;

    /// Store a file in ASCII mode, one CRLF-terminated line per entry
    async fn store_lines(&mut self, name: &str, lines: &[String]) -> Result<()>;

    /// Retrieve a file in image mode into `sink`, returning the byte count
    async fn retrieve_binary(
        &mut self,
        name: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64>;

    /// Store a file in image mode from `source`, returning the byte count
    async fn store_binary(
        &mut self,
        name: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64>;

    /// List file names in the current directory
    async fn list_names(&mut self) -> Result<Vec<String>>;
}

/// Opens FTP sessions
#[async_trait]
pub trait FtpConnector: Send + Sync {
    /// Connect and read the server greeting; does not log in
    async fn connect(&self, target: &FtpTarget) -> Result<Box<dyn FtpSession>>;
}

/// Connector for real FTP servers over TCP
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    config: FtpClientConfig,
}

impl TcpConnector {
    pub fn new(config: FtpClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl FtpConnector for TcpConnector {
    async fn connect(&self, target: &FtpTarget) -> Result<Box<dyn FtpSession>> {
        let session = TcpFtpSession::connect(target, &self.config).await?;
        Ok(Box::new(session))
    }
}

/// FTP session over a TCP control connection with passive-mode data connections
pub struct TcpFtpSession {
    control: ControlChannel,
    config: FtpClientConfig,
}

impl TcpFtpSession {
    /// Connect to `target` and wait for the greeting
    pub async fn connect(target: &FtpTarget, config: &FtpClientConfig) -> Result<Self> {
        let addr = target.to_string();
        info!(%addr, "Connecting to FTP server");

        let stream = tokio::time::timeout(
            config.connect_timeout(),
            TcpStream::connect((target.host.as_str(), target.port)),
        )
        .await
        .map_err(|_| FtpError::Timeout(format!("connecting to {}", addr)))?
        .map_err(|source| FtpError::Connect {
            addr: addr.clone(),
            source,
        })?;

        let mut control = ControlChannel::new(stream, config)?;

        // 120: service ready in a few minutes, a second reply follows
        let mut greeting = control.read_reply().await?;
        if greeting.code == 120 {
            greeting = control.read_reply().await?;
        }
        if !greeting.is_completion() {
            return Err(FtpError::rejected("CONNECT", greeting));
        }

        Ok(Self {
            control,
            config: config.clone(),
        })
    }

    /// Switch representation type, open a passive data connection and issue `command`
    ///
    /// The server must answer `command` with a preliminary (1xx) reply before
    /// data flows.
    async fn begin_transfer(
        &mut self,
        transfer_type: TransferType,
        command: &str,
    ) -> Result<TcpStream> {
        self.control
            .expect_completion(transfer_type.command())
            .await?;
        let data = transfer::open_passive(&mut self.control, &self.config).await?;

        let reply = self.control.command(command).await?;
        if !reply.is_preliminary() {
            return Err(FtpError::rejected(verb(command), reply));
        }
        Ok(data)
    }

    /// Read the reply that closes a transfer started by `command`
    async fn finish_transfer(&mut self, command: &str) -> Result<()> {
        let reply = self.control.read_reply().await?;
        if reply.is_completion() {
            Ok(())
        } else {
            Err(FtpError::rejected(verb(command), reply))
        }
    }

    /// Finish a transfer whose data phase produced `outcome`
    ///
    /// When the data phase failed locally or its text was undecodable, the
    /// closing reply is still drained so the control channel stays in step for
    /// the next command. After a transport failure the session is unusable.
    async fn complete<T>(&mut self, command: &str, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.finish_transfer(command).await?;
                Ok(value)
            }
            Err(
                err @ (FtpError::Sink(_) | FtpError::Source(_) | FtpError::InvalidData(_)),
            ) => {
                if let Err(e) = self.control.read_reply().await {
                    debug!(%e, "No closing reply after aborted transfer");
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl FtpSession for TcpFtpSession {
    async fn login(&mut self, credentials: &FtpCredentials) -> Result<()> {
        let mut reply = self
            .control
            .command(&format!("USER {}", credentials.user))
            .await?;
        if reply.is_intermediate() {
            reply = self
                .control
                .command(&format!("PASS {}", credentials.password))
                .await?;
        }
        if reply.is_intermediate() {
            reply = self
                .control
                .command(&format!("ACCT {}", credentials.account))
                .await?;
        }
        if !reply.is_completion() {
            return Err(FtpError::rejected("login", reply));
        }

        info!(user = %credentials.user, "FTP login accepted");
        Ok(())
    }

    async fn quit(&mut self) -> Result<()> {
        let reply = self.control.command("QUIT").await;
        self.control.shutdown().await;

        let reply = reply?;
        if reply.is_negative() {
            return Err(FtpError::rejected("QUIT", reply));
        }
        Ok(())
    }

    async fn retrieve_lines(&mut self, name: &str) -> Result<Vec<String>> {
        let command = format!("RETR {}", name);
        let data = self.begin_transfer(TransferType::Ascii, &command).await?;
        let lines = transfer::read_lines(data, self.config.data_timeout()).await;
        self.complete(&command, lines).await
    }

    async fn store_lines(&mut self, name: &str, lines: &[String]) -> Result<()> {
        let command = format!("STOR {}", name);
        let data = self.begin_transfer(TransferType::Ascii, &command).await?;
        let written = transfer::write_lines(data, lines, self.config.data_timeout()).await;
        self.complete(&command, written).await
    }

    async fn retrieve_binary(
        &mut self,
        name: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        let command = format!("RETR {}", name);
        let data = self.begin_transfer(TransferType::Image, &command).await?;
        let copied = transfer::copy_to_sink(
            data,
            sink,
            self.config.transfer_chunk_size,
            self.config.data_timeout(),
        )
        .await;
        self.complete(&command, copied).await
    }

    async fn store_binary(
        &mut self,
        name: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64> {
        let command = format!("STOR {}", name);
        let data = self.begin_transfer(TransferType::Image, &command).await?;
        let copied = transfer::copy_from_source(
            data,
            source,
            self.config.transfer_chunk_size,
            self.config.data_timeout(),
        )
        .await;
        self.complete(&command, copied).await
    }

    async fn list_names(&mut self) -> Result<Vec<String>> {
        let data = self.begin_transfer(TransferType::Ascii, "NLST").await?;
        let names = transfer::read_lines(data, self.config.data_timeout()).await;
        self.complete("NLST", names).await
    }
}
