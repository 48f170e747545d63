// SPDX-License-Identifier: GPL-3.0-only
//! Keeps the perceived brightness of several displays in step

#[macro_use]
extern crate tracing;

pub mod brightness;
pub mod client;
pub mod command;
pub mod config;
pub mod daemon;
pub mod error;
pub mod monitor;
pub mod protocols;
