// SPDX-License-Identifier: GPL-3.0-only
//! Display set coordinator
//!
//! Owns every configured display together with the process-wide level and
//! power target. All of it sits behind one async mutex so that a level change
//! and a power transition can never interleave their per-display writes.
//!
//! # Failure policy
//!
//! - Brightness writes fan out to all displays at once. A failing display is
//!   recorded in the report and does not stop the others; the new level is
//!   accepted either way.
//! - Power transitions write the leader first. If the leader fails nothing
//!   else is touched and the request is rejected. Follower failures are
//!   recorded only.
//!
//! Every backend call is bounded by the backend timeout, and acquiring the
//! lock itself is bounded by the lock timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Mutex, MutexGuard};

use super::backend::{ControlMethod, DisplayId};
use super::display::{Display, DisplaySnapshot};
use crate::error::{BackendError, RequestError};
use crate::protocols::{BrightnessControl, OnOffControl, PowerState};

pub const DEFAULT_STEPS: u8 = 9;
pub const DEFAULT_LEVEL: u8 = 4;
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Coordinator settings taken from the configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Dimmest level; 0 is always the brightest
    pub level_max: u8,
    /// Level applied at startup and by `default`
    pub default_level: u8,
    pub backend_timeout: Duration,
    pub lock_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            level_max: DEFAULT_STEPS,
            default_level: DEFAULT_LEVEL,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// Direction of a one-step level change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Towards level 0
    Brighter,
    /// Towards the maximum level
    Dimmer,
}

/// What happened to one display during a request
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Written,
    /// The hardware already had the value, nothing was sent
    Unchanged,
    Failed(BackendError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayOutcome {
    pub display: DisplayId,
    pub outcome: Outcome,
}

/// Process state as seen by a status query
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub level: u8,
    pub level_max: u8,
    pub power: Option<PowerState>,
    pub displays: Vec<DisplaySnapshot>,
}

/// Result of an accepted request
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub outcomes: Vec<DisplayOutcome>,
    pub status: Status,
}

impl Report {
    pub fn failures(&self) -> impl Iterator<Item = (&str, &BackendError)> {
        self.outcomes.iter().filter_map(|o| match &o.outcome {
            Outcome::Failed(err) => Some((o.display.as_str(), err)),
            _ => None,
        })
    }

    /// Accepted, but at least one display did not follow
    pub fn is_partial(&self) -> bool {
        self.failures().next().is_some()
    }
}

struct ProcessState<C> {
    level: u8,
    power: Option<PowerState>,
    displays: Vec<Display<C>>,
}

impl<C> ProcessState<C> {
    /// First declared display with an on/off control
    fn leader(&self) -> Option<usize> {
        self.displays.iter().position(|d| d.onoff.is_some())
    }

    fn status(&self, level_max: u8) -> Status {
        let leader = self.leader();
        Status {
            level: self.level,
            level_max,
            power: self.power,
            displays: self
                .displays
                .iter()
                .enumerate()
                .map(|(i, d)| d.snapshot(Some(i) == leader))
                .collect(),
        }
    }

    fn find(&self, name: &str) -> Result<usize, RequestError> {
        self.displays
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| RequestError::UnknownDisplay(name.to_string()))
    }
}

/// Run one backend call, turning an expired deadline into a backend error
async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = crate::error::Result<T>>,
) -> crate::error::Result<T> {
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(BackendError::Timeout(timeout)))
}

/// Shared handle to the display set
pub struct DisplayManager<C = ControlMethod> {
    state: Arc<Mutex<ProcessState<C>>>,
    settings: Settings,
}

impl<C> DisplayManager<C>
where
    C: BrightnessControl + OnOffControl,
{
    /// Create the coordinator. The process level starts at the default level;
    /// nothing is written until [`reset`](Self::reset) or another request.
    pub fn new(displays: Vec<Display<C>>, settings: Settings) -> Self {
        let level = settings.default_level.min(settings.level_max);
        Self {
            state: Arc::new(Mutex::new(ProcessState {
                level,
                power: None,
                displays,
            })),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    async fn lock(&self) -> Result<MutexGuard<'_, ProcessState<C>>, RequestError> {
        tokio::time::timeout(self.settings.lock_timeout, self.state.lock())
            .await
            .map_err(|_| {
                error!(
                    "Display set still busy after {:?}, rejecting request",
                    self.settings.lock_timeout
                );
                RequestError::LockTimeout(self.settings.lock_timeout)
            })
    }

    /// Snapshot of the process state. Does not touch the hardware.
    pub async fn status(&self) -> Result<Status, RequestError> {
        let state = self.lock().await?;
        Ok(state.status(self.settings.level_max))
    }

    /// Apply `level` to every display
    pub async fn set_level(&self, level: i64) -> Result<Report, RequestError> {
        let level = u8::try_from(level)
            .ok()
            .filter(|l| *l <= self.settings.level_max)
            .ok_or(RequestError::InvalidLevel {
                level,
                max: self.settings.level_max,
            })?;
        let mut state = self.lock().await?;
        Ok(self.apply_level(&mut state, level).await)
    }

    /// Move one level brighter or dimmer, stopping at either end
    pub async fn step(&self, step: Step) -> Result<Report, RequestError> {
        let mut state = self.lock().await?;
        let level = match step {
            Step::Brighter => state.level.saturating_sub(1),
            Step::Dimmer => state.level.saturating_add(1).min(self.settings.level_max),
        };
        Ok(self.apply_level(&mut state, level).await)
    }

    /// Go back to the configured default level
    pub async fn reset(&self) -> Result<Report, RequestError> {
        let default_level = self.settings.default_level.min(self.settings.level_max);
        let mut state = self.lock().await?;
        Ok(self.apply_level(&mut state, default_level).await)
    }

    async fn apply_level(&self, state: &mut ProcessState<C>, level: u8) -> Report {
        let level_max = self.settings.level_max;
        let timeout = self.settings.backend_timeout;
        info!("Setting level {}/{}", level, level_max);

        let writes: Vec<_> = state
            .displays
            .iter()
            .map(|record| {
                let raw = record.calibration.raw_value(level, level_max);
                async move {
                    if record.last_raw == Some(raw) {
                        trace!(display = %record.name, raw, "Brightness unchanged");
                        return (raw, Outcome::Unchanged);
                    }
                    debug!(display = %record.name, raw, "Writing brightness");
                    match bounded(timeout, record.brightness.write_brightness(raw)).await {
                        Ok(()) => (raw, Outcome::Written),
                        Err(e) => (raw, Outcome::Failed(e)),
                    }
                }
            })
            .collect();
        let results = join_all(writes).await;

        let mut outcomes = Vec::with_capacity(results.len());
        for (record, (raw, outcome)) in state.displays.iter_mut().zip(results) {
            match &outcome {
                Outcome::Written => record.last_raw = Some(raw),
                Outcome::Unchanged => {}
                Outcome::Failed(e) => {
                    warn!("Failed to set brightness of {} to {}: {}", record.name, raw, e);
                    // unknown now, so the next request writes again
                    record.last_raw = None;
                }
            }
            outcomes.push(DisplayOutcome {
                display: record.name.clone(),
                outcome,
            });
        }

        // accepted even if some displays did not follow
        state.level = level;
        Report {
            outcomes,
            status: state.status(level_max),
        }
    }

    /// Switch every display with an on/off control to `target`, leader first
    pub async fn set_power(&self, target: PowerState) -> Result<Report, RequestError> {
        let mut state = self.lock().await?;
        self.transition(&mut state, target).await
    }

    /// Invert the leader's current power state and make every display follow
    pub async fn toggle(&self) -> Result<Report, RequestError> {
        let mut state = self.lock().await?;
        let leader = state.leader().ok_or_else(no_leader)?;
        let current = self
            .current_power(&mut state.displays[leader])
            .await
            .ok_or_else(|| RequestError::UnknownPowerState(state.displays[leader].name.clone()))?;
        self.transition(&mut state, current.toggled()).await
    }

    async fn transition(
        &self,
        state: &mut ProcessState<C>,
        target: PowerState,
    ) -> Result<Report, RequestError> {
        let timeout = self.settings.backend_timeout;
        let leader = state.leader().ok_or_else(no_leader)?;
        info!("Switching displays {}", target);

        {
            let record = &mut state.displays[leader];
            let Some(control) = record.onoff.as_ref() else {
                return Err(no_leader());
            };
            debug!(display = %record.name, %target, "Switching leader");
            if let Err(e) = bounded(timeout, control.write_power(target)).await {
                error!("Leader {} did not switch {}: {}", record.name, target, e);
                return Err(RequestError::LeaderFailed {
                    display: record.name.clone(),
                    source: e,
                });
            }
            record.power = Some(target);
        }
        state.power = Some(target);

        let writes: Vec<_> = state
            .displays
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != leader)
            .filter_map(|(i, d)| d.onoff.as_ref().map(|control| (i, d, control)))
            .map(|(i, record, control)| async move {
                debug!(display = %record.name, %target, "Switching follower");
                (i, bounded(timeout, control.write_power(target)).await)
            })
            .collect();
        let results = join_all(writes).await;

        let mut outcomes = vec![DisplayOutcome {
            display: state.displays[leader].name.clone(),
            outcome: Outcome::Written,
        }];
        for (i, result) in results {
            let record = &mut state.displays[i];
            let outcome = match result {
                Ok(()) => {
                    record.power = Some(target);
                    Outcome::Written
                }
                Err(e) => {
                    warn!("Follower {} did not switch {}: {}", record.name, target, e);
                    record.power = None;
                    Outcome::Failed(e)
                }
            };
            outcomes.push(DisplayOutcome {
                display: record.name.clone(),
                outcome,
            });
        }

        Ok(Report {
            outcomes,
            status: state.status(self.settings.level_max),
        })
    }

    /// Switch a single display, leaving the others alone
    pub async fn set_display_power(
        &self,
        name: &str,
        target: PowerState,
    ) -> Result<Report, RequestError> {
        let mut state = self.lock().await?;
        let index = state.find(name)?;
        self.switch_one(&mut state, index, target).await
    }

    /// Invert the power state of a single display
    pub async fn toggle_display(&self, name: &str) -> Result<Report, RequestError> {
        let mut state = self.lock().await?;
        let index = state.find(name)?;
        if state.displays[index].onoff.is_none() {
            return Err(no_power_control(name));
        }
        let current = self
            .current_power(&mut state.displays[index])
            .await
            .ok_or_else(|| RequestError::UnknownPowerState(name.to_string()))?;
        self.switch_one(&mut state, index, current.toggled()).await
    }

    async fn switch_one(
        &self,
        state: &mut ProcessState<C>,
        index: usize,
        target: PowerState,
    ) -> Result<Report, RequestError> {
        let is_leader = state.leader() == Some(index);
        let record = &mut state.displays[index];
        let Some(control) = record.onoff.as_ref() else {
            return Err(no_power_control(&record.name));
        };

        info!("Switching {} {}", record.name, target);
        let outcome = match bounded(self.settings.backend_timeout, control.write_power(target)).await
        {
            Ok(()) => {
                record.power = Some(target);
                Outcome::Written
            }
            Err(e) => {
                warn!("{} did not switch {}: {}", record.name, target, e);
                record.power = None;
                Outcome::Failed(e)
            }
        };
        let outcomes = vec![DisplayOutcome {
            display: record.name.clone(),
            outcome: outcome.clone(),
        }];

        if is_leader && outcome == Outcome::Written {
            state.power = Some(target);
        }
        Ok(Report {
            outcomes,
            status: state.status(self.settings.level_max),
        })
    }

    /// Read the power state from the hardware, falling back to the tracked
    /// state when the read fails. `None` means nobody knows.
    async fn current_power(&self, record: &mut Display<C>) -> Option<PowerState> {
        let control = record.onoff.as_ref()?;
        match bounded(self.settings.backend_timeout, control.read_power()).await {
            Ok(state) => {
                record.power = Some(state);
                Some(state)
            }
            Err(e) => {
                warn!(
                    "Cannot read power state of {} ({}), using last known state {:?}",
                    record.name, e, record.power
                );
                record.power
            }
        }
    }

    /// Seed the cached raw values from the hardware, best effort, so that the
    /// first level change skips displays already showing the right value
    pub async fn read_back_brightness(&self) -> Result<Status, RequestError> {
        let timeout = self.settings.backend_timeout;
        let mut state = self.lock().await?;

        let reads: Vec<_> = state
            .displays
            .iter()
            .map(|record| bounded(timeout, record.brightness.read_brightness()))
            .collect();
        let results = join_all(reads).await;

        for (record, result) in state.displays.iter_mut().zip(results) {
            match result {
                Ok(raw) => {
                    debug!(display = %record.name, raw, "Read back brightness");
                    record.last_raw = Some(raw);
                }
                Err(e) => debug!("Cannot read brightness of {}: {}", record.name, e),
            }
        }
        Ok(state.status(self.settings.level_max))
    }

    /// Seed the tracked power states from the hardware, best effort
    pub async fn read_back_power(&self) -> Result<Status, RequestError> {
        let timeout = self.settings.backend_timeout;
        let mut state = self.lock().await?;

        let reads: Vec<_> = state
            .displays
            .iter()
            .enumerate()
            .filter_map(|(i, d)| {
                d.onoff
                    .as_ref()
                    .map(|control| async move { (i, bounded(timeout, control.read_power()).await) })
            })
            .collect();
        let results = join_all(reads).await;

        for (i, result) in results {
            let record = &mut state.displays[i];
            match result {
                Ok(power) => {
                    debug!(display = %record.name, %power, "Read back power state");
                    record.power = Some(power);
                }
                Err(e) => warn!("Cannot read power state of {}: {}", record.name, e),
            }
        }

        let leader_power = state.leader().and_then(|i| state.displays[i].power);
        state.power = leader_power;
        Ok(state.status(self.settings.level_max))
    }
}

fn no_leader() -> RequestError {
    RequestError::NoPowerControl("no display has an on/off control".into())
}

fn no_power_control(name: &str) -> RequestError {
    RequestError::NoPowerControl(format!("{} has no on/off control", name))
}

impl<C> Clone for DisplayManager<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            settings: self.settings.clone(),
        }
    }
}
