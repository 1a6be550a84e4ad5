//! External tunnel client process
//!
//! The client is a black box: the supervisor starts it with a fixed
//! argument set, watches whether it is still running and stops it through
//! its management port, killing it when that does not work.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::TunnelConfig;
use crate::error::{TunnelError, TunnelResult};

/// Command sent on the management port to stop the client
const CLOSE_COMMAND: &[u8] = b"signal SIGTERM\n";
const MANAGEMENT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Whether a managed process is still alive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Exited, with its exit code when one is available
    Exited(Option<i32>),
}

/// A running client process owned by the supervisor
#[async_trait]
pub trait ManagedProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Check for exit without waiting
    fn state(&mut self) -> ProcessState;

    /// Ask the process to shut down. Returns whether the request was delivered.
    async fn request_close(&mut self) -> bool;

    /// Terminate the process and reap it
    async fn kill(&mut self);
}

/// Starts client processes
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Whether a client executable can be found
    fn is_available(&self) -> bool;

    async fn launch(&self, config_path: &Path) -> TunnelResult<Box<dyn ManagedProcess>>;
}

// =============================================================================
// OpenVPN-compatible client
// =============================================================================

/// Launches the configured client binary
pub struct ClientLauncher {
    binary: String,
    cipher: String,
    verbosity: u8,
    management_port: u16,
}

impl ClientLauncher {
    pub fn new(config: &TunnelConfig) -> Self {
        Self {
            binary: config.client_binary.clone(),
            cipher: config.cipher.clone(),
            verbosity: config.verbosity,
            management_port: config.management_port,
        }
    }

    fn resolve(&self) -> Option<PathBuf> {
        which::which(&self.binary).ok()
    }

    /// Arguments passed to the client
    pub fn arguments(&self, config_path: &Path) -> Vec<String> {
        vec![
            "--config".to_string(),
            config_path.display().to_string(),
            "--data-ciphers".to_string(),
            self.cipher.clone(),
            "--verb".to_string(),
            self.verbosity.to_string(),
            "--management".to_string(),
            "127.0.0.1".to_string(),
            self.management_port.to_string(),
        ]
    }
}

#[async_trait]
impl ProcessLauncher for ClientLauncher {
    fn is_available(&self) -> bool {
        self.resolve().is_some()
    }

    async fn launch(&self, config_path: &Path) -> TunnelResult<Box<dyn ManagedProcess>> {
        let binary = self
            .resolve()
            .ok_or_else(|| TunnelError::ClientUnavailable(format!("'{}' not found", self.binary)))?;

        let mut child = Command::new(&binary)
            .args(self.arguments(config_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TunnelError::Launch(format!("{}: {}", binary.display(), e)))?;

        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, "stderr");
        }

        info!(
            binary = %binary.display(),
            pid = child.id(),
            config = %config_path.display(),
            "Tunnel client started"
        );
        Ok(Box::new(ChildProcess {
            child,
            management_port: self.management_port,
        }))
    }
}

/// Forward client output lines into the log
fn forward_output<R>(reader: R, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "fieldlink_tunnel::process", stream, "{}", line);
        }
    });
}

/// A client started by [`ClientLauncher`]
pub struct ChildProcess {
    child: Child,
    management_port: u16,
}

#[async_trait]
impl ManagedProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn state(&mut self) -> ProcessState {
        match self.child.try_wait() {
            Ok(Some(status)) => ProcessState::Exited(status.code()),
            Ok(None) => ProcessState::Running,
            Err(e) => {
                warn!(error = %e, "Cannot query tunnel client status");
                ProcessState::Exited(None)
            }
        }
    }

    async fn request_close(&mut self) -> bool {
        let addr = ("127.0.0.1", self.management_port);
        let mut stream =
            match tokio::time::timeout(MANAGEMENT_CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    debug!(port = self.management_port, error = %e, "Management port unreachable");
                    return false;
                }
                Err(_) => {
                    debug!(port = self.management_port, "Management port connect timed out");
                    return false;
                }
            };

        match stream.write_all(CLOSE_COMMAND).await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Failed to send close request");
                false
            }
        }
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "Failed to kill tunnel client");
        }
    }
}
