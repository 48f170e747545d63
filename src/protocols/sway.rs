// SPDX-License-Identifier: GPL-3.0-only
//! Display power through the sway IPC socket
//!
//! Messages use the i3-ipc framing: the magic string `i3-ipc`, a native-endian
//! u32 payload length, a native-endian u32 message type, then the payload.
//! Replies use the same framing with a JSON payload.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use super::{OnOffControl, PowerState};
use crate::error::{BackendError, Result};

const MAGIC: &[u8; 6] = b"i3-ipc";
const HEADER_LEN: usize = MAGIC.len() + 8;

const RUN_COMMAND: u32 = 0;
const GET_OUTPUTS: u32 = 3;

/// Replies larger than this are treated as malformed
const MAX_REPLY_LEN: usize = 4 * 1024 * 1024;

/// Location of the compositor socket, shared by every sway control
///
/// Falls back to `$SWAYSOCK` until an explicit path is set. The daemon may
/// start before the compositor, so the path can be replaced at runtime.
#[derive(Debug, Clone, Default)]
pub struct SwaySocket {
    path: Arc<RwLock<Option<PathBuf>>>,
}

impl SwaySocket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: PathBuf) {
        let mut guard = self.path.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(path);
    }

    pub fn resolve(&self) -> Option<PathBuf> {
        let guard = self.path.read().unwrap_or_else(|e| e.into_inner());
        guard
            .clone()
            .or_else(|| std::env::var_os("SWAYSOCK").map(PathBuf::from))
    }
}

#[derive(Debug, Deserialize)]
struct CommandReply {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutputReply {
    name: String,
    #[serde(default)]
    power: Option<bool>,
    // sway < 1.8
    #[serde(default)]
    dpms: Option<bool>,
}

/// Power control for one sway output
#[derive(Debug, Clone)]
pub struct SwayDpmsControl {
    output: String,
    socket: SwaySocket,
}

impl SwayDpmsControl {
    pub fn new(output: impl Into<String>, socket: SwaySocket) -> Self {
        Self {
            output: output.into(),
            socket,
        }
    }

    async fn request(&self, message_type: u32, payload: &str) -> Result<Vec<u8>> {
        let path = self
            .socket
            .resolve()
            .ok_or_else(|| BackendError::Ipc("no sway socket known (SWAYSOCK unset)".into()))?;
        exchange(&path, message_type, payload.as_bytes())
            .await
            .map_err(|e| BackendError::Ipc(format!("{}: {}", path.display(), e)))
    }
}

/// Send one framed message and read one framed reply
async fn exchange(path: &Path, message_type: u32, payload: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut stream = UnixStream::connect(path).await?;

    let mut message = Vec::with_capacity(HEADER_LEN + payload.len());
    message.extend_from_slice(MAGIC);
    message.extend_from_slice(&(payload.len() as u32).to_ne_bytes());
    message.extend_from_slice(&message_type.to_ne_bytes());
    message.extend_from_slice(payload);
    stream.write_all(&message).await?;

    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).await?;
    if &header[..MAGIC.len()] != MAGIC {
        return Err(invalid("reply has no i3-ipc magic"));
    }
    let len = u32::from_ne_bytes([header[6], header[7], header[8], header[9]]) as usize;
    let reply_type = u32::from_ne_bytes([header[10], header[11], header[12], header[13]]);
    if reply_type != message_type {
        return Err(invalid(format!(
            "reply type {} does not match request type {}",
            reply_type, message_type
        )));
    }
    if len > MAX_REPLY_LEN {
        return Err(invalid(format!("reply of {} bytes is too large", len)));
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(body)
}

fn invalid(msg: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg.into())
}

impl OnOffControl for SwayDpmsControl {
    async fn read_power(&self) -> Result<PowerState> {
        let body = self.request(GET_OUTPUTS, "").await?;
        let outputs: Vec<OutputReply> = serde_json::from_slice(&body)
            .map_err(|e| BackendError::Ipc(format!("malformed GET_OUTPUTS reply: {}", e)))?;
        let output = outputs
            .iter()
            .find(|o| o.name == self.output)
            .ok_or_else(|| BackendError::Ipc(format!("sway has no output {}", self.output)))?;
        match output.power.or(output.dpms) {
            Some(true) => Ok(PowerState::On),
            Some(false) => Ok(PowerState::Off),
            None => Err(BackendError::Ipc(format!(
                "sway does not report power for {}",
                self.output
            ))),
        }
    }

    async fn write_power(&self, state: PowerState) -> Result<()> {
        let command = format!("output \"{}\" power {}", self.output, state);
        debug!(output = %self.output, %state, "Sending sway command");
        let body = self.request(RUN_COMMAND, &command).await?;
        let replies: Vec<CommandReply> = serde_json::from_slice(&body)
            .map_err(|e| BackendError::Ipc(format!("malformed RUN_COMMAND reply: {}", e)))?;
        if replies.is_empty() {
            return Err(BackendError::Ipc("empty RUN_COMMAND reply".into()));
        }
        if let Some(failed) = replies.iter().find(|r| !r.success) {
            return Err(BackendError::Ipc(
                failed
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("sway rejected {:?}", command)),
            ));
        }
        Ok(())
    }
}
