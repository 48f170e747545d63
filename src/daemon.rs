// SPDX-License-Identifier: GPL-3.0-only
//! Control socket daemon
//!
//! Listens on a Unix socket and serves every connection in its own task:
//! read one request line, run it against the display set, write the response,
//! close. A client that never finishes its line only holds up its own task.

use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::command::{self, Reply, Request};
use crate::config::Config;
use crate::error::RequestError;
use crate::monitor::DisplayManager;
use crate::protocols::sway::SwaySocket;

/// Requests longer than this are cut off and rejected
const MAX_REQUEST_LEN: u64 = 4096;

/// How long a client may take to send its request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ControlServer {
    manager: DisplayManager,
    sway: SwaySocket,
    socket_path: PathBuf,
}

impl ControlServer {
    pub fn new(manager: DisplayManager, sway: SwaySocket, socket_path: PathBuf) -> Self {
        Self {
            manager,
            sway,
            socket_path,
        }
    }

    /// Build the display set from `config`, read back power states and
    /// brightness, then apply the default level
    pub async fn start(config: &Config, socket_path: PathBuf) -> Result<Self> {
        let sway = SwaySocket::new();
        let displays = config.build_displays(&sway);
        info!("Managing {} display(s)", displays.len());

        let manager = DisplayManager::new(displays, config.settings.clone());
        let status = manager.read_back_power().await?;
        info!("Power state at startup: {:?}", status.power);
        manager.read_back_brightness().await?;

        let report = manager.reset().await?;
        for (name, err) in report.failures() {
            warn!("Could not apply default level to {}: {}", name, err);
        }

        Ok(Self::new(manager, sway, socket_path))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the control socket, replacing a stale one
    pub fn bind(&self) -> Result<UnixListener> {
        let path = &self.socket_path;
        if matches!(path.try_exists(), Ok(true)) {
            warn!("Removing existing socket at {}", path.display());
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
        }
        let listener = UnixListener::bind(path)
            .with_context(|| format!("Failed to bind control socket {}", path.display()))?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict permissions of {}", path.display()))?;
        info!("Listening on {}", path.display());
        Ok(listener)
    }

    /// Accept connections until `shutdown` completes, then remove the socket
    pub async fn run(self, listener: UnixListener, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Failed to accept control connection: {}", e);
                            continue;
                        }
                    };
                    let manager = self.manager.clone();
                    let sway = self.sway.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &manager, &sway).await {
                            debug!("Control connection ended with error: {}", e);
                        }
                    });
                }
                () = &mut shutdown => {
                    info!("Shutting down");
                    break;
                }
            }
        }

        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            warn!("Failed to remove {}: {}", self.socket_path.display(), e);
        }
        Ok(())
    }
}

async fn handle_connection(
    stream: UnixStream,
    manager: &DisplayManager,
    sway: &SwaySocket,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader.take(MAX_REQUEST_LEN));
    let mut line = String::new();

    let result = match tokio::time::timeout(REQUEST_TIMEOUT, reader.read_line(&mut line)).await {
        Err(_) => Err(RequestError::InvalidRequest(format!(
            "no request within {:?}",
            REQUEST_TIMEOUT
        ))),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
            Err(RequestError::InvalidRequest("request is not UTF-8".into()))
        }
        Ok(Err(e)) => return Err(e),
        Ok(Ok(_)) if !line.ends_with('\n') && line.len() as u64 >= MAX_REQUEST_LEN => {
            Err(RequestError::InvalidRequest("request too long".into()))
        }
        Ok(Ok(_)) => match line.parse::<Request>() {
            Ok(request) => {
                debug!("Request: {:?}", request);
                execute(manager, sway, request).await
            }
            Err(e) => Err(e),
        },
    };

    if let Err(ref e) = result {
        info!("Rejected request {:?}: {}", line.trim(), e);
    }
    writer.write_all(command::render(&result).as_bytes()).await?;
    writer.shutdown().await
}

/// Run one request against the display set
pub async fn execute(
    manager: &DisplayManager,
    sway: &SwaySocket,
    request: Request,
) -> Result<Reply, RequestError> {
    let level_max = manager.settings().level_max;
    let report = match request {
        Request::SetLevel(level) => manager.set_level(level).await?,
        Request::Step(step) => manager.step(step).await?,
        Request::Max => manager.set_level(0).await?,
        Request::Min => manager.set_level(i64::from(level_max)).await?,
        Request::Default => manager.reset().await?,
        Request::Status => return manager.status().await.map(Reply::Status),
        Request::Power(state, None) => manager.set_power(state).await?,
        Request::Power(state, Some(name)) => manager.set_display_power(&name, state).await?,
        Request::Toggle(None) => manager.toggle().await?,
        Request::Toggle(Some(name)) => manager.toggle_display(&name).await?,
        Request::SwaySock(path) => {
            info!("Using sway socket {}", path.display());
            sway.set(path);
            return Ok(Reply::Ack);
        }
    };
    Ok(Reply::Report(report))
}
