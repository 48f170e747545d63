// SPDX-License-Identifier: GPL-3.0-only
//! Error types for the daemon
//!
//! Each layer gets its own error enum so that the coordinator can tell a
//! per-display hardware failure (recorded, never fatal) apart from a rejected
//! request or a configuration problem (fatal at startup).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Invalid calibration parameters for one display
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("max ({max}) must be greater than min ({min})")]
    EmptyRange { min: u32, max: u32 },

    #[error("ref-min ({ref_min}) is below min ({min})")]
    RefMinBelowMin { ref_min: u32, min: u32 },

    #[error("ref-max ({ref_max}) is above max ({max})")]
    RefMaxAboveMax { ref_max: u32, max: u32 },

    #[error("ref-min ({ref_min}) must be less than ref-max ({ref_max})")]
    EmptyReferenceRange { ref_min: u32, ref_max: u32 },

    #[error("gamma must be a positive number, got {0}")]
    Gamma(f64),
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no configuration file found (looked in {0:?})")]
    NotFound(Vec<PathBuf>),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("display {display}: {source}")]
    Calibration {
        display: String,
        #[source]
        source: CalibrationError,
    },

    #[error("display {display}: {reason}")]
    Display { display: String, reason: String },

    #[error("{0}")]
    Invalid(String),
}

/// Failure of a single backend operation on one display
///
/// These never escape the coordinator as fatal errors; they are collected
/// into a per-display outcome and rendered to the client.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("{path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("{tool}: {reason}")]
    ExternalTool { tool: String, reason: String },

    #[error("{0}")]
    Ipc(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("{0} is not supported by this control method")]
    Unsupported(&'static str),
}

impl BackendError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        BackendError::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Short tag used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Io { .. } => "io",
            BackendError::ExternalTool { .. } => "external-tool",
            BackendError::Ipc(_) => "ipc",
            BackendError::Timeout(_) => "timeout",
            BackendError::Unsupported(_) => "unsupported",
        }
    }
}

/// A request the coordinator refused to carry out
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("level {level} is outside 0..={max}")]
    InvalidLevel { level: i64, max: u8 },

    #[error("no display named {0}")]
    UnknownDisplay(String),

    #[error("{0}")]
    NoPowerControl(String),

    #[error("power state of {0} is unknown, refusing to toggle")]
    UnknownPowerState(String),

    #[error("leader {display} failed: {source}")]
    LeaderFailed {
        display: String,
        #[source]
        source: BackendError,
    },

    #[error("display set busy for more than {0:?}")]
    LockTimeout(Duration),
}

impl RequestError {
    /// Short tag used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            RequestError::InvalidRequest(_) => "invalid-request",
            RequestError::InvalidLevel { .. } => "invalid-level",
            RequestError::UnknownDisplay(_) => "unknown-display",
            RequestError::NoPowerControl(_) => "no-power-control",
            RequestError::UnknownPowerState(_) => "unknown-power-state",
            RequestError::LeaderFailed { .. } => "leader-failed",
            RequestError::LockTimeout(_) => "lock-timeout",
        }
    }
}

/// Result type alias for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;
