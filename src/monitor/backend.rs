// SPDX-License-Identifier: GPL-3.0-only
//! Backend selection for display control
//!
//! Control addresses in the configuration look like `sysfs:<path>`,
//! `ddcutil:<display-number>` or `swaydpms:<output>`. The scheme picks the
//! variant, the rest is the address handed to it.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{BackendError, Result};
use crate::protocols::ddcutil::DdcUtilControl;
use crate::protocols::sway::{SwayDpmsControl, SwaySocket};
use crate::protocols::sysfs::SysfsControl;
use crate::protocols::{BrightnessControl, OnOffControl, PowerState};

pub type DisplayId = String;

/// Parsed control address, before any backend state is attached
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum ControlAddress {
    /// An attribute file or device directory, e.g. /sys/class/backlight/intel_backlight
    Sysfs(PathBuf),
    /// Display number reported by `ddcutil detect`
    DdcUtil(u8),
    /// Output name known to sway, e.g. DP-3
    SwayDpms(String),
}

impl ControlAddress {
    pub fn supports_brightness(&self) -> bool {
        matches!(self, ControlAddress::Sysfs(_) | ControlAddress::DdcUtil(_))
    }

    pub fn supports_power(&self) -> bool {
        matches!(self, ControlAddress::Sysfs(_) | ControlAddress::SwayDpms(_))
    }

    /// Attach backend state to the address
    pub fn into_control(self, sway: &SwaySocket) -> ControlMethod {
        match self {
            ControlAddress::Sysfs(path) => ControlMethod::Sysfs(SysfsControl::new(path)),
            ControlAddress::DdcUtil(display) => ControlMethod::DdcUtil(DdcUtilControl::new(display)),
            ControlAddress::SwayDpms(output) => {
                ControlMethod::SwayDpms(SwayDpmsControl::new(output, sway.clone()))
            }
        }
    }
}

impl FromStr for ControlAddress {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (scheme, address) = s
            .split_once(':')
            .ok_or_else(|| format!("control {:?} has no scheme (expected <scheme>:<address>)", s))?;
        if address.is_empty() {
            return Err(format!("control {:?} has an empty address", s));
        }
        match scheme.to_ascii_lowercase().as_str() {
            "sysfs" => Ok(ControlAddress::Sysfs(PathBuf::from(address))),
            "ddcutil" => match address.parse::<u8>() {
                Ok(n) if n > 0 => Ok(ControlAddress::DdcUtil(n)),
                _ => Err(format!(
                    "ddcutil display {:?} must be a number from 1 to 255",
                    address
                )),
            },
            "swaydpms" => Ok(ControlAddress::SwayDpms(address.to_string())),
            other => Err(format!("unknown control scheme {:?}", other)),
        }
    }
}

impl TryFrom<String> for ControlAddress {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for ControlAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlAddress::Sysfs(path) => write!(f, "sysfs:{}", path.display()),
            ControlAddress::DdcUtil(display) => write!(f, "ddcutil:{}", display),
            ControlAddress::SwayDpms(output) => write!(f, "swaydpms:{}", output),
        }
    }
}

/// Backend type for display control
#[derive(Debug, Clone)]
pub enum ControlMethod {
    /// Device files under /sys
    Sysfs(SysfsControl),
    /// DDC/CI via the ddcutil tool (brightness only)
    DdcUtil(DdcUtilControl),
    /// sway output power (on/off only)
    SwayDpms(SwayDpmsControl),
}

impl BrightnessControl for ControlMethod {
    async fn read_brightness(&self) -> Result<u32> {
        match self {
            ControlMethod::Sysfs(control) => control.read_brightness().await,
            ControlMethod::DdcUtil(control) => control.read_brightness().await,
            ControlMethod::SwayDpms(_) => Err(BackendError::Unsupported("brightness")),
        }
    }

    async fn write_brightness(&self, raw: u32) -> Result<()> {
        match self {
            ControlMethod::Sysfs(control) => control.write_brightness(raw).await,
            ControlMethod::DdcUtil(control) => control.write_brightness(raw).await,
            ControlMethod::SwayDpms(_) => Err(BackendError::Unsupported("brightness")),
        }
    }
}

impl OnOffControl for ControlMethod {
    async fn read_power(&self) -> Result<PowerState> {
        match self {
            ControlMethod::Sysfs(control) => control.read_power().await,
            ControlMethod::SwayDpms(control) => control.read_power().await,
            ControlMethod::DdcUtil(_) => Err(BackendError::Unsupported("power control")),
        }
    }

    async fn write_power(&self, state: PowerState) -> Result<()> {
        match self {
            ControlMethod::Sysfs(control) => control.write_power(state).await,
            ControlMethod::SwayDpms(control) => control.write_power(state).await,
            ControlMethod::DdcUtil(_) => Err(BackendError::Unsupported("power control")),
        }
    }
}
