// SPDX-License-Identifier: GPL-3.0-only
//! Display control protocols
//!
//! This module contains implementations for the mechanisms used to reach a
//! display. A display uses one control for brightness and optionally one for
//! power; the two capabilities are separate traits because no mechanism is
//! guaranteed to offer both.

pub mod ddcutil;
pub mod sway;
pub mod sysfs;

use std::fmt;
use std::future::Future;

use crate::error::Result;

/// Power state of a display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn toggled(self) -> Self {
        match self {
            PowerState::On => PowerState::Off,
            PowerState::Off => PowerState::On,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PowerState::On => "on",
            PowerState::Off => "off",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read and write the raw brightness of a display
pub trait BrightnessControl: fmt::Debug + Send + Sync {
    /// Get the current raw brightness
    fn read_brightness(&self) -> impl Future<Output = Result<u32>> + Send;

    /// Set the raw brightness
    fn write_brightness(&self, raw: u32) -> impl Future<Output = Result<()>> + Send;
}

/// Read and write the power state of a display
pub trait OnOffControl: fmt::Debug + Send + Sync {
    /// Get the current power state
    fn read_power(&self) -> impl Future<Output = Result<PowerState>> + Send;

    /// Switch the display on or off
    fn write_power(&self, state: PowerState) -> impl Future<Output = Result<()>> + Send;
}
