//! FTP control channel

use std::borrow::Cow;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::FtpClientConfig;
use crate::error::{FtpError, Result};
use crate::reply::{FtpReply, ReplyParser};

/// First word of a command line, used in error messages
pub(crate) fn verb(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or(command)
}

/// Command line as it may appear in logs
fn redact(command: &str) -> Cow<'_, str> {
    let verb = verb(command);
    if verb.eq_ignore_ascii_case("PASS") || verb.eq_ignore_ascii_case("ACCT") {
        Cow::Owned(format!("{} ***", verb))
    } else {
        Cow::Borrowed(command)
    }
}

/// Line-oriented command/reply channel to the server
pub struct ControlChannel {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
    command_timeout: Duration,
    max_reply_lines: usize,
}

impl ControlChannel {
    pub fn new(stream: TcpStream, config: &FtpClientConfig) -> Result<Self> {
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            peer,
            command_timeout: config.command_timeout(),
            max_reply_lines: config.max_reply_lines,
        })
    }

    /// Address of the server end of the control connection
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Send one command line
    pub async fn send(&mut self, command: &str) -> Result<()> {
        debug!(command = %redact(command), "FTP >");
        let line = format!("{}\r\n", command);
        tokio::time::timeout(self.command_timeout, self.writer.write_all(line.as_bytes()))
            .await
            .map_err(|_| FtpError::Timeout(format!("sending {}", verb(command))))??;
        Ok(())
    }

    /// Read one complete reply
    pub async fn read_reply(&mut self) -> Result<FtpReply> {
        tokio::time::timeout(self.command_timeout, self.read_reply_inner())
            .await
            .map_err(|_| FtpError::Timeout("waiting for server reply".into()))?
    }

    async fn read_reply_inner(&mut self) -> Result<FtpReply> {
        let mut parser = ReplyParser::new(self.max_reply_lines);
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(FtpError::ConnectionClosed);
            }
            if let Some(reply) = parser.feed(&line)? {
                debug!(code = reply.code, text = %reply.text(), "FTP <");
                return Ok(reply);
            }
        }
    }

    /// Send a command and read its reply
    pub async fn command(&mut self, command: &str) -> Result<FtpReply> {
        self.send(command).await?;
        self.read_reply().await
    }

    /// Send a command that must complete with a 2xx reply
    pub async fn expect_completion(&mut self, command: &str) -> Result<FtpReply> {
        let reply = self.command(command).await?;
        if reply.is_completion() {
            Ok(reply)
        } else {
            Err(FtpError::rejected(verb(command), reply))
        }
    }

    /// Close the write half; the server sees EOF on the control connection
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!(%e, "Control channel shutdown failed");
        }
    }
}
