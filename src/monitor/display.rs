// SPDX-License-Identifier: GPL-3.0-only
//! Per-display record: static calibration plus the live state the daemon
//! tracks between requests

use super::backend::{ControlMethod, DisplayId};
use crate::brightness::Calibration;
use crate::protocols::PowerState;

/// One configured display
#[derive(Debug)]
pub struct Display<C = ControlMethod> {
    pub(super) name: DisplayId,
    pub(super) calibration: Calibration,
    pub(super) brightness: C,
    pub(super) onoff: Option<C>,
    /// Last raw value known to be on the hardware
    pub(super) last_raw: Option<u32>,
    /// Last known power state, `None` until queried or switched
    pub(super) power: Option<PowerState>,
}

impl<C> Display<C> {
    pub fn new(
        name: impl Into<DisplayId>,
        calibration: Calibration,
        brightness: C,
        onoff: Option<C>,
    ) -> Self {
        Self {
            name: name.into(),
            calibration,
            brightness,
            onoff,
            last_raw: None,
            power: None,
        }
    }

    pub(super) fn snapshot(&self, leader: bool) -> DisplaySnapshot {
        DisplaySnapshot {
            name: self.name.clone(),
            raw: self.last_raw,
            power: self.power,
            has_power_control: self.onoff.is_some(),
            leader,
        }
    }
}

/// Copy of a display's live state, taken under the coordinator lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySnapshot {
    pub name: DisplayId,
    pub raw: Option<u32>,
    pub power: Option<PowerState>,
    pub has_power_control: bool,
    pub leader: bool,
}
