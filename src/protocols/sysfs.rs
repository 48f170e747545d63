// SPDX-License-Identifier: GPL-3.0-only
//! sysfs device-file control
//!
//! Backlight class devices expose `brightness` and `bl_power` next to each
//! other. A control address may name the device directory, in which case the
//! right sibling is picked per capability, or a single file that is used as-is.

use std::path::PathBuf;

use super::{BrightnessControl, OnOffControl, PowerState};
use crate::error::{BackendError, Result};

/// File written for brightness when the address is a directory
pub const FILE_BRIGHTNESS: &str = "brightness";

/// File written for power when the address is a directory
pub const FILE_POWER: &str = "bl_power";

/// `FB_BLANK_UNBLANK`
const POWER_ON: u8 = 0;

/// `FB_BLANK_POWERDOWN`
const POWER_OFF: u8 = 4;

/// sysfs control rooted at a device directory or a single attribute file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysfsControl {
    path: PathBuf,
}

impl SysfsControl {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve the attribute file for `name`
    ///
    /// The directory check happens per call so a device that appears after
    /// startup is picked up.
    async fn attribute(&self, name: &str) -> PathBuf {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_dir() => self.path.join(name),
            _ => self.path.clone(),
        }
    }

    async fn read_integer(&self, name: &str) -> Result<u32> {
        let path = self.attribute(name).await;
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| BackendError::io(&path, e))?;
        contents
            .trim()
            .parse()
            .map_err(|_| BackendError::io(&path, format!("not an integer: {:?}", contents.trim())))
    }

    async fn write_integer(&self, name: &str, value: u32) -> Result<()> {
        let path = self.attribute(name).await;
        debug!(path = %path.display(), value, "Writing sysfs attribute");
        tokio::fs::write(&path, value.to_string())
            .await
            .map_err(|e| BackendError::io(&path, e))
    }
}

impl BrightnessControl for SysfsControl {
    async fn read_brightness(&self) -> Result<u32> {
        self.read_integer(FILE_BRIGHTNESS).await
    }

    async fn write_brightness(&self, raw: u32) -> Result<()> {
        self.write_integer(FILE_BRIGHTNESS, raw).await
    }
}

impl OnOffControl for SysfsControl {
    async fn read_power(&self) -> Result<PowerState> {
        let value = self.read_integer(FILE_POWER).await?;
        Ok(if value == u32::from(POWER_ON) {
            PowerState::On
        } else {
            PowerState::Off
        })
    }

    async fn write_power(&self, state: PowerState) -> Result<()> {
        let value = match state {
            PowerState::On => POWER_ON,
            PowerState::Off => POWER_OFF,
        };
        self.write_integer(FILE_POWER, u32::from(value)).await
    }
}
