// SPDX-License-Identifier: GPL-3.0-only
//! One-shot client for the control socket

use std::path::Path;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::command::ResponseKind;

/// Exit status when the daemon could not be reached or answered garbage
pub const TRANSPORT_FAILURE: u8 = 3;

/// Send one request line and return the raw response
pub async fn send(socket_path: &Path, request: &str) -> Result<String> {
    let mut stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("Failed to connect to {}", socket_path.display()))?;

    let mut line = request.trim().to_string();
    line.push('\n');
    stream.write_all(line.as_bytes()).await?;
    stream.shutdown().await?;

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .context("Failed to read response")?;
    if response.is_empty() {
        bail!("Daemon closed the connection without answering");
    }
    Ok(response)
}

/// Send `request`, print the response and map it to an exit status
pub async fn run(socket_path: &Path, request: &str) -> u8 {
    let response = match send(socket_path, request).await {
        Ok(response) => response,
        Err(e) => {
            eprintln!("{:#}", e);
            return TRANSPORT_FAILURE;
        }
    };
    print!("{}", response);

    match ResponseKind::from_response(&response) {
        Some(kind) => kind.exit_code(),
        None => {
            warn!("Unrecognized response from daemon");
            TRANSPORT_FAILURE
        }
    }
}
