// SPDX-License-Identifier: GPL-3.0-only
//! Configuration file
//!
//! The configuration is a TOML document with one `[[display]]` table per
//! display, in the order that decides the leader:
//!
//! ```toml
//! steps = 9
//! default_level = 4
//! backend_timeout_ms = 2000
//!
//! [[display]]
//! name = "laptop"
//! brightness_control = "sysfs:/sys/class/backlight/intel_backlight"
//! onoff_control = "sysfs:/sys/class/backlight/intel_backlight"
//! min = 750
//! max = 120000
//! ref_max = 90000
//! gamma = 2.2
//! ```
//!
//! Everything is validated here, before any display record exists. A file
//! that parses but describes an impossible calibration is rejected as a whole.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::brightness::Calibration;
use crate::error::ConfigError;
use crate::monitor::{
    ControlAddress, DEFAULT_BACKEND_TIMEOUT, DEFAULT_LEVEL, DEFAULT_LOCK_TIMEOUT, DEFAULT_STEPS,
    Display, DisplayId, Settings,
};
use crate::protocols::sway::SwaySocket;
use crate::protocols::sysfs::{FILE_BRIGHTNESS, FILE_POWER};

pub const APP_NAME: &str = "backlightd";
pub const CONFIG_FILE_NAME: &str = "config";
pub const SOCKET_FILE_NAME: &str = "backlight";

/// Raw brightness ceiling assumed for a linear display that gives no `max`
const LINEAR_DEFAULT_MAX: u32 = 100;

/// The file as written, before validation
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "snake_case")]
struct ConfigFile {
    steps: u8,
    default_level: u8,
    socket_path: Option<PathBuf>,
    backend_timeout_ms: u64,
    lock_timeout_ms: u64,
    display: Vec<DisplayEntry>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS,
            default_level: DEFAULT_LEVEL,
            socket_path: None,
            backend_timeout_ms: DEFAULT_BACKEND_TIMEOUT.as_millis() as u64,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
            display: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
struct DisplayEntry {
    name: DisplayId,
    brightness_control: Option<ControlAddress>,
    onoff_control: Option<ControlAddress>,
    min: Option<u32>,
    max: Option<u32>,
    ref_min: Option<u32>,
    ref_max: Option<u32>,
    gamma: Option<f64>,
}

/// Validated configuration of one display
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayConfig {
    pub name: DisplayId,
    pub brightness: ControlAddress,
    pub onoff: Option<ControlAddress>,
    pub calibration: Calibration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub settings: Settings,
    pub socket_path: Option<PathBuf>,
    /// In declaration order; the order decides the leader
    pub displays: Vec<DisplayConfig>,
}

impl Config {
    /// Read the configuration from `explicit`, or from the first file found
    /// in [`search_paths`]
    pub fn load(explicit: Option<&Path>) -> Result<(PathBuf, Self), ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidates = search_paths();
                candidates
                    .iter()
                    .find(|p| matches!(p.try_exists(), Ok(true)))
                    .cloned()
                    .ok_or(ConfigError::NotFound(candidates))?
            }
        };
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::parse(&contents)?;
        Ok((path, config))
    }

    /// Parse and validate a configuration document
    pub fn parse(document: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(document)?;

        if file.steps == 0 {
            return Err(ConfigError::Invalid("steps must be at least 1".into()));
        }
        if file.default_level > file.steps {
            return Err(ConfigError::Invalid(format!(
                "default_level {} is outside 0..={}",
                file.default_level, file.steps
            )));
        }
        let settings = Settings {
            level_max: file.steps,
            default_level: file.default_level,
            backend_timeout: millis("backend_timeout_ms", file.backend_timeout_ms)?,
            lock_timeout: millis("lock_timeout_ms", file.lock_timeout_ms)?,
        };

        if file.display.is_empty() {
            return Err(ConfigError::Invalid("no display configured".into()));
        }
        let displays = file
            .display
            .into_iter()
            .map(validate_display)
            .collect::<Result<Vec<_>, _>>()?;

        let mut names = HashSet::new();
        for entry in &displays {
            if !names.insert(entry.name.as_str()) {
                return Err(ConfigError::Display {
                    display: entry.name.clone(),
                    reason: "declared more than once".into(),
                });
            }
            // adjacent levels share a raw value when the range is narrower than the scale
            if entry.calibration.reference_span() < u32::from(settings.level_max) {
                warn!(
                    "Display {} has only {} raw steps between ref_min and ref_max for {} levels, \
                     some levels will look the same",
                    entry.name,
                    entry.calibration.reference_span(),
                    settings.level_max
                );
            }
        }
        if !displays.iter().any(|d| d.onoff.is_some()) {
            info!("No display has an on/off control, power requests will be rejected");
        }

        Ok(Self {
            settings,
            socket_path: file.socket_path,
            displays,
        })
    }

    /// Create the display records, in declaration order
    pub fn build_displays(&self, sway: &SwaySocket) -> Vec<Display> {
        self.displays
            .iter()
            .map(|d| {
                Display::new(
                    d.name.clone(),
                    d.calibration.clone(),
                    d.brightness.clone().into_control(sway),
                    d.onoff.clone().map(|a| a.into_control(sway)),
                )
            })
            .collect()
    }
}

fn validate_display(entry: DisplayEntry) -> Result<DisplayConfig, ConfigError> {
    let DisplayEntry {
        name,
        brightness_control,
        onoff_control,
        min,
        max,
        ref_min,
        ref_max,
        gamma,
    } = entry;
    let fail = |reason: String| ConfigError::Display {
        display: name.clone(),
        reason,
    };

    let brightness =
        brightness_control.ok_or_else(|| fail("brightness_control is required".into()))?;
    if !brightness.supports_brightness() {
        return Err(fail(format!("{} cannot control brightness", brightness)));
    }
    if let Some(ref onoff) = onoff_control {
        if !onoff.supports_power() {
            return Err(fail(format!("{} cannot switch displays on or off", onoff)));
        }
        if let (ControlAddress::Sysfs(b), ControlAddress::Sysfs(o)) = (&brightness, onoff) {
            if b == o && is_attribute_file(b) {
                return Err(fail(format!(
                    "{} is a single file and cannot hold both brightness and power, \
                     use the device directory",
                    b.display()
                )));
            }
        }
    }

    let max = match (max, gamma) {
        (Some(max), _) => max,
        (None, Some(g)) if g == 1.0 => LINEAR_DEFAULT_MAX,
        (None, _) => return Err(fail("max is required".into())),
    };
    let min = min.unwrap_or(0);
    let calibration = Calibration::new(
        min,
        max,
        ref_min.unwrap_or(min),
        ref_max.unwrap_or(max),
        gamma.unwrap_or(1.0),
    )
    .map_err(|source| ConfigError::Calibration {
        display: name.clone(),
        source,
    })?;

    Ok(DisplayConfig {
        name,
        brightness,
        onoff: onoff_control,
        calibration,
    })
}

/// A sysfs address that names one attribute rather than a device directory
fn is_attribute_file(path: &Path) -> bool {
    path.is_file()
        || path
            .file_name()
            .is_some_and(|name| name == FILE_BRIGHTNESS || name == FILE_POWER)
}

fn millis(key: &str, ms: u64) -> Result<Duration, ConfigError> {
    if ms == 0 {
        return Err(ConfigError::Invalid(format!("{} must be greater than zero", key)));
    }
    Ok(Duration::from_millis(ms))
}

/// Places searched for the configuration file, most specific first
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join(APP_NAME).join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from("/etc").join(APP_NAME).join(CONFIG_FILE_NAME));
    paths
}

/// `$XDG_RUNTIME_DIR/backlight`, or `/run/user/<uid>/backlight` without it
pub fn default_socket_path() -> PathBuf {
    let runtime_dir = dirs::runtime_dir().unwrap_or_else(|| {
        // SAFETY: getuid has no preconditions and cannot fail
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/run/user/{}", uid))
    });
    runtime_dir.join(SOCKET_FILE_NAME)
}

/// Control socket location: the explicit path, then the configured one, then
/// the runtime directory default
pub fn resolve_socket_path(explicit: Option<PathBuf>, config: Option<&Config>) -> PathBuf {
    explicit
        .or_else(|| config.and_then(|c| c.socket_path.clone()))
        .unwrap_or_else(default_socket_path)
}
