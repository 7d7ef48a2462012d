//! Blocking FEMC update client and its session lifecycle

use std::fmt;
use std::sync::Arc;

use femc_ftp::{FtpConnector, FtpCredentials, FtpError, FtpSession, FtpTarget, TcpConnector};
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info, instrument, warn};

use crate::config::UpdateConfig;
use crate::error::{Result, UpdateError};

/// Directory on the module that the update login is confined to
pub const REMOTE_STORAGE_DIR: &str = r"C:\ALMA";

const UPDATE_USER: &str = "update";
const UPDATE_PASSWORD: &str = "update";
const UPDATE_ACCOUNT: &str = "update";

/// The fixed login that restricts the session to [`REMOTE_STORAGE_DIR`]
pub fn update_credentials() -> FtpCredentials {
    FtpCredentials::new(UPDATE_USER, UPDATE_PASSWORD, UPDATE_ACCOUNT)
}

/// Session state of a [`FirmwareUpdateClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connected,
}

/// Client for the FTP server of an FEMC module running 3.x firmware
///
/// All operations block until the round trip with the module completes. The
/// FTP layer is async and is driven by a runtime owned by the client; called
/// from within an async task, operations fail with
/// [`UpdateError::InsideAsyncRuntime`].
///
/// At most one session is open at a time. Dropping a connected client sends
/// `QUIT` before the connection closes, so a module with few session slots is
/// never left holding a stale login. A transport failure during an operation
/// ends the session: the client becomes disconnected without sending `QUIT`.
///
/// # Example
///
/// ```rust,no_run
/// use femc_update::FirmwareUpdateClient;
///
/// # fn main() -> femc_update::Result<()> {
/// let mut client = FirmwareUpdateClient::connect_to("192.168.1.50")?;
/// client.put_file("build/FEMC_3_6.EXE")?;
/// client.set_exe_name("FEMC_3_6.EXE")?;
/// assert_eq!(client.get_exe_name()?, "FEMC_3_6.EXE");
/// client.disconnect()?;
/// # Ok(())
/// # }
/// ```
pub struct FirmwareUpdateClient {
    config: UpdateConfig,
    connector: Arc<dyn FtpConnector>,
    // Declared before `runtime`: the session's sockets belong to its reactor
    session: Option<Box<dyn FtpSession>>,
    // Only taken by `Drop`
    runtime: Option<Runtime>,
}

impl FirmwareUpdateClient {
    /// Create a client; connects immediately if `config.host` is set
    pub fn new(config: UpdateConfig) -> Result<Self> {
        let connector = Arc::new(TcpConnector::new(config.ftp.clone()));
        Self::with_connector(config, connector)
    }

    /// Create a client and connect to `host` with default settings
    pub fn connect_to(host: impl Into<String>) -> Result<Self> {
        Self::new(UpdateConfig::for_host(host))
    }

    /// Create a client that opens sessions through `connector`
    ///
    /// Connects immediately if `config.host` is set.
    pub fn with_connector(config: UpdateConfig, connector: Arc<dyn FtpConnector>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(UpdateError::Runtime)?;

        let mut client = Self {
            config,
            connector,
            session: None,
            runtime: Some(runtime),
        };
        if client.config.host.is_some() {
            client.connect(None)?;
        }
        Ok(client)
    }

    /// Connect, run `f`, and disconnect on every exit path
    ///
    /// An error from `f` takes precedence over an error from disconnecting.
    pub fn with_session<T, F>(config: UpdateConfig, f: F) -> Result<T>
    where
        F: FnOnce(&mut FirmwareUpdateClient) -> Result<T>,
    {
        Self::new(config)?.scoped(f)
    }

    /// Consume the client: connect if needed, run `f`, then disconnect
    pub fn scoped<T, F>(mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut FirmwareUpdateClient) -> Result<T>,
    {
        if !self.is_connected() {
            self.connect(None)?;
        }
        let outcome = f(&mut self);
        let closed = self.disconnect();
        let value = outcome?;
        closed?;
        Ok(value)
    }

    /// Connect and log in
    ///
    /// `host` replaces the configured host when given. An already open session
    /// is closed first.
    #[instrument(skip(self))]
    pub fn connect(&mut self, host: Option<&str>) -> Result<()> {
        if let Some(host) = host {
            self.config.host = Some(host.to_string());
        }
        let host = self.config.host.clone().ok_or(UpdateError::NoHost)?;

        if self.session.is_some() {
            debug!("Closing previous session before reconnecting");
            self.disconnect()?;
        }

        let target = FtpTarget::new(host, self.config.port);
        let runtime = self.runtime()?;
        let session = runtime
            .block_on(open_session(self.connector.as_ref(), &target))
            .map_err(UpdateError::Connection)?;

        info!(%target, "Connected to FEMC module");
        self.session = Some(session);
        Ok(())
    }

    /// Send `QUIT` and release the session
    ///
    /// The session is released even if `QUIT` fails. Does nothing when not connected.
    #[instrument(skip(self))]
    pub fn disconnect(&mut self) -> Result<()> {
        if self.session.is_none() {
            return Ok(());
        }
        ensure_blocking_allowed()?;
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        let runtime = self.runtime.as_ref().ok_or_else(runtime_shut_down)?;
        let result = runtime.block_on(session.quit());
        drop(session);

        info!(host = ?self.config.host, "Disconnected from FEMC module");
        result.map_err(UpdateError::Connection)
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn state(&self) -> SessionState {
        if self.is_connected() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    /// The configured module host
    pub fn host(&self) -> Option<&str> {
        self.config.host.as_deref()
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Runtime for a blocking call
    fn runtime(&self) -> Result<&Runtime> {
        ensure_blocking_allowed()?;
        self.runtime.as_ref().ok_or_else(runtime_shut_down)
    }

    /// Run `op` against the open session
    ///
    /// Fails with `NotConnected` before `op` runs when there is no session. When
    /// `op` fails with a connection error the command/reply exchange can no
    /// longer be trusted, so the session is dropped without `QUIT`.
    pub(crate) fn with_active_session<T, F>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&Runtime, &mut Box<dyn FtpSession>) -> Result<T>,
    {
        let Some(session) = self.session.as_mut() else {
            return Err(UpdateError::NotConnected);
        };
        ensure_blocking_allowed()?;
        let runtime = self.runtime.as_ref().ok_or_else(runtime_shut_down)?;

        let result = op(runtime, session);
        if let Err(UpdateError::Connection(e)) = &result {
            warn!(%e, host = ?self.config.host, "Session lost; now disconnected");
            self.session = None;
        }
        result
    }
}

/// Blocking on the owned runtime panics on a thread that is already driving one
fn ensure_blocking_allowed() -> Result<()> {
    if Handle::try_current().is_ok() {
        return Err(UpdateError::InsideAsyncRuntime);
    }
    Ok(())
}

fn runtime_shut_down() -> UpdateError {
    UpdateError::Runtime(std::io::Error::other("runtime already shut down"))
}

/// Connect and log in; a session whose login fails is closed politely
async fn open_session(
    connector: &dyn FtpConnector,
    target: &FtpTarget,
) -> std::result::Result<Box<dyn FtpSession>, FtpError> {
    let mut session = connector.connect(target).await?;
    if let Err(err) = session.login(&update_credentials()).await {
        if let Err(e) = session.quit().await {
            debug!(%e, "QUIT after failed login");
        }
        return Err(err);
    }
    Ok(session)
}

impl Drop for FirmwareUpdateClient {
    fn drop(&mut self) {
        let in_runtime = Handle::try_current().is_ok();

        if self.session.is_some() {
            let result = if in_runtime {
                // QUIT from a worker thread outside the async context
                match std::thread::scope(|scope| scope.spawn(|| self.disconnect()).join()) {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("Disconnect worker panicked");
                        Ok(())
                    }
                }
            } else {
                self.disconnect()
            };
            if let Err(e) = result {
                warn!(%e, "Disconnect on drop failed");
            }
            self.session = None;
        }

        if in_runtime {
            // Dropping a runtime blocks, which an async context does not allow
            if let Some(runtime) = self.runtime.take() {
                runtime.shutdown_background();
            }
        }
    }
}

impl fmt::Debug for FirmwareUpdateClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirmwareUpdateClient")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
