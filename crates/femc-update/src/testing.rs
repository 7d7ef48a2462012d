//! Test utilities for femc-update
//!
//! [`StubFtpServer`] speaks enough real FTP over loopback TCP to exercise the
//! full client stack, sockets included, without an FEMC module on the bench.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::client::update_credentials;
use crate::config::UpdateConfig;

const DATA_ACCEPT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct StubState {
    files: BTreeMap<String, Vec<u8>>,
    commands: Vec<String>,
    connections: usize,
    quits: usize,
    reject_logins: bool,
    read_only: bool,
    require_account: bool,
    stall_data: Option<Duration>,
    hang_up_mid_transfer: bool,
}

type Shared = Arc<Mutex<StubState>>;

/// An FTP server on 127.0.0.1 that shuts down when dropped
///
/// Accepts the update login (`USER`, `PASS`, then `ACCT` unless disabled) and
/// serves files from memory over passive-mode data connections.
pub struct StubFtpServer {
    addr: SocketAddr,
    state: Shared,
    runtime: Option<Runtime>,
}

impl StubFtpServer {
    /// Bind to an ephemeral loopback port and start accepting connections
    pub fn start() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;

        let listener = runtime.block_on(TcpListener::bind("127.0.0.1:0"))?;
        let addr = listener.local_addr()?;

        let state: Shared = Arc::new(Mutex::new(StubState {
            files: BTreeMap::new(),
            commands: Vec::new(),
            connections: 0,
            quits: 0,
            reject_logins: false,
            read_only: false,
            require_account: true,
            stall_data: None,
            hang_up_mid_transfer: false,
        }));

        runtime.spawn(accept_loop(listener, state.clone()));
        debug!(%addr, "Stub FTP server listening");

        Ok(Self {
            addr,
            state,
            runtime: Some(runtime),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Client configuration pointing at this server, with short timeouts
    pub fn config(&self) -> UpdateConfig {
        UpdateConfig::builder()
            .host(self.host())
            .port(self.port())
            .connect_timeout_ms(2_000)
            .command_timeout_ms(5_000)
            .data_timeout_ms(5_000)
            .build()
    }

    /// Client configuration for this server without a host, so nothing connects on construction
    pub fn config_without_host(&self) -> UpdateConfig {
        let mut config = self.config();
        config.host = None;
        config
    }

    /// Place a file in the server's storage directory
    pub fn insert_file(&self, name: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.state.lock().files.insert(name.into(), contents.into());
    }

    /// Contents of a stored file
    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(name).cloned()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.state.lock().files.keys().cloned().collect()
    }

    /// Every command received, in order, with `PASS`/`ACCT` arguments masked
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    /// Number of control connections accepted
    pub fn connections(&self) -> usize {
        self.state.lock().connections
    }

    /// Number of `QUIT` commands received
    pub fn quits(&self) -> usize {
        self.state.lock().quits
    }

    /// Answer every password or account with 530
    pub fn set_reject_logins(&self, reject: bool) {
        self.state.lock().reject_logins = reject;
    }

    /// Refuse uploads with 550
    pub fn set_read_only(&self, read_only: bool) {
        self.state.lock().read_only = read_only;
    }

    /// Whether `PASS` is answered with 332 (account required)
    pub fn set_require_account(&self, require: bool) {
        self.state.lock().require_account = require;
    }

    /// Send the first half of each download, then go silent on the data
    /// connection for `stall` before sending the rest
    pub fn set_stall_data(&self, stall: Option<Duration>) {
        self.state.lock().stall_data = stall;
    }

    /// Send the first half of each download, then close the data and control
    /// connections without a closing reply
    pub fn set_hang_up_mid_transfer(&self, hang_up: bool) {
        self.state.lock().hang_up_mid_transfer = hang_up;
    }
}

impl Drop for StubFtpServer {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn accept_loop(listener: TcpListener, state: Shared) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                state.lock().connections += 1;
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, state).await {
                        debug!(%peer, %e, "Stub FTP connection ended with error");
                    }
                });
            }
            Err(e) => {
                debug!(%e, "Stub FTP accept failed");
                return;
            }
        }
    }
}

/// Per-connection protocol state
#[derive(Default)]
struct Conversation {
    user_ok: bool,
    password_ok: bool,
    logged_in: bool,
    passive: Option<TcpListener>,
}

async fn reply(out: &mut OwnedWriteHalf, code: u16, text: &str) -> std::io::Result<()> {
    out.write_all(format!("{} {}\r\n", code, text).as_bytes())
        .await
}

fn record(state: &Shared, verb: &str, arg: &str) {
    let entry = match verb {
        "PASS" | "ACCT" => format!("{} ***", verb),
        _ if arg.is_empty() => verb.to_string(),
        _ => format!("{} {}", verb, arg),
    };
    state.lock().commands.push(entry);
}

fn is_bare_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

async fn serve_connection(stream: TcpStream, state: Shared) -> std::io::Result<()> {
    let local_ip = stream.local_addr()?.ip();
    let (read, mut out) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    let mut conv = Conversation::default();

    reply(&mut out, 220, "FEMC FTP server ready").await?;

    while let Some(line) = lines.next_line().await? {
        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };
        record(&state, &verb, &arg);

        match verb.as_str() {
            "USER" => {
                conv.user_ok = arg == update_credentials().user;
                conv.password_ok = false;
                conv.logged_in = false;
                reply(&mut out, 331, "Password required").await?;
            }
            "PASS" => {
                let (reject, require_account) = {
                    let s = state.lock();
                    (s.reject_logins, s.require_account)
                };
                if !conv.user_ok || reject || arg != update_credentials().password {
                    reply(&mut out, 530, "Login incorrect").await?;
                } else if require_account {
                    conv.password_ok = true;
                    reply(&mut out, 332, "Account required").await?;
                } else {
                    conv.logged_in = true;
                    reply(&mut out, 230, "User logged in").await?;
                }
            }
            "ACCT" => {
                let reject = state.lock().reject_logins;
                if conv.password_ok && !reject && arg == update_credentials().account {
                    conv.logged_in = true;
                    reply(&mut out, 230, "User logged in").await?;
                } else {
                    reply(&mut out, 530, "Login incorrect").await?;
                }
            }
            "QUIT" => {
                state.lock().quits += 1;
                reply(&mut out, 221, "Goodbye").await?;
                return Ok(());
            }
            "NOOP" => reply(&mut out, 200, "OK").await?,
            "SYST" => reply(&mut out, 215, "MSDOS").await?,
            _ if !conv.logged_in => reply(&mut out, 530, "Not logged in").await?,
            "TYPE" => match arg.to_ascii_uppercase().as_str() {
                "A" | "I" => reply(&mut out, 200, "Type set").await?,
                _ => reply(&mut out, 504, "Type not supported").await?,
            },
            "PASV" => {
                let listener = TcpListener::bind(SocketAddr::new(local_ip, 0)).await?;
                let port = listener.local_addr()?.port();
                let octets = match local_ip {
                    IpAddr::V4(v4) => v4.octets(),
                    IpAddr::V6(_) => Ipv4Addr::LOCALHOST.octets(),
                };
                conv.passive = Some(listener);
                let text = format!(
                    "Entering Passive Mode ({},{},{},{},{},{})",
                    octets[0],
                    octets[1],
                    octets[2],
                    octets[3],
                    port >> 8,
                    port & 0xff
                );
                reply(&mut out, 227, &text).await?;
            }
            "RETR" => {
                let Some(passive) = conv.passive.take() else {
                    reply(&mut out, 425, "Use PASV first").await?;
                    continue;
                };
                let contents = if is_bare_name(&arg) {
                    state.lock().files.get(&arg).cloned()
                } else {
                    None
                };
                let Some(contents) = contents else {
                    reply(&mut out, 550, "File not found").await?;
                    continue;
                };
                let (stall, hang_up) = {
                    let s = state.lock();
                    (s.stall_data, s.hang_up_mid_transfer)
                };
                reply(&mut out, 150, "Opening data connection").await?;
                let mut data = accept_data(&passive).await?;
                let (head, tail) = contents.split_at(contents.len() / 2);
                data.write_all(head).await?;
                data.flush().await?;
                if hang_up {
                    debug!(file = %arg, "Stub FTP hanging up mid-transfer");
                    return Ok(());
                }
                if let Some(stall) = stall {
                    tokio::time::sleep(stall).await;
                }
                data.write_all(tail).await?;
                data.shutdown().await?;
                drop(data);
                reply(&mut out, 226, "Transfer complete").await?;
            }
            "STOR" => {
                let Some(passive) = conv.passive.take() else {
                    reply(&mut out, 425, "Use PASV first").await?;
                    continue;
                };
                let refused = state.lock().read_only || !is_bare_name(&arg);
                if refused {
                    reply(&mut out, 550, "Permission denied").await?;
                    continue;
                }
                reply(&mut out, 150, "Ready to receive").await?;
                let mut data = accept_data(&passive).await?;
                let mut contents = Vec::new();
                data.read_to_end(&mut contents).await?;
                state.lock().files.insert(arg, contents);
                reply(&mut out, 226, "Transfer complete").await?;
            }
            "NLST" => {
                let Some(passive) = conv.passive.take() else {
                    reply(&mut out, 425, "Use PASV first").await?;
                    continue;
                };
                let listing: String = state
                    .lock()
                    .files
                    .keys()
                    .map(|name| format!("{}\r\n", name))
                    .collect();
                reply(&mut out, 150, "Here comes the listing").await?;
                let mut data = accept_data(&passive).await?;
                data.write_all(listing.as_bytes()).await?;
                data.shutdown().await?;
                drop(data);
                reply(&mut out, 226, "Transfer complete").await?;
            }
            _ => reply(&mut out, 502, "Command not implemented").await?,
        }
    }
    Ok(())
}

async fn accept_data(listener: &TcpListener) -> std::io::Result<TcpStream> {
    let (stream, _) = tokio::time::timeout(DATA_ACCEPT_TIMEOUT, listener.accept())
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "no data connection"))??;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_points_at_server() {
        let server = StubFtpServer::start().unwrap();
        let config = server.config();
        assert_eq!(config.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.port, server.port());
        assert_eq!(server.config_without_host().host, None);
    }

    #[test]
    fn test_bare_names() {
        assert!(is_bare_name("FEMC.EXE"));
        assert!(!is_bare_name("../FEMC.EXE"));
        assert!(!is_bare_name(r"C:\ALMA\FEMC.EXE"));
        assert!(!is_bare_name(""));
    }
}
