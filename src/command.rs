// SPDX-License-Identifier: GPL-3.0-only
//! Control socket protocol
//!
//! A client sends one line, `<verb> [argument]`, and gets back a response
//! whose first line is `ok`, `partial` or `error <kind>: <detail>`, followed
//! by payload lines describing the state after the request.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::RequestError;
use crate::monitor::{DisplayId, Report, Status, Step};
use crate::protocols::PowerState;

/// Target word that addresses every display
pub const ALL_DISPLAYS: &str = "all";

/// A parsed client request
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    SetLevel(i64),
    Step(Step),
    /// Level 0
    Max,
    /// The highest level
    Min,
    /// The configured default level
    Default,
    Status,
    /// Switch all displays, or only the named one (`all` also means every display)
    Power(PowerState, Option<DisplayId>),
    Toggle(Option<DisplayId>),
    /// Use this compositor socket from now on
    SwaySock(PathBuf),
}

impl FromStr for Request {
    type Err = RequestError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let verb = verb.to_ascii_lowercase();
        let arg = (!rest.is_empty()).then_some(rest);

        let no_arg = |request: Request| match arg {
            None => Ok(request),
            Some(_) => Err(invalid(format!("{} takes no argument", verb))),
        };
        // `all` names the whole display set
        let target = || match arg {
            None => Ok(None),
            Some(name) if name.eq_ignore_ascii_case(ALL_DISPLAYS) => Ok(None),
            Some(name) if name.split_whitespace().count() > 1 => {
                Err(invalid(format!("{} takes at most one display name", verb)))
            }
            Some(name) => Ok(Some(name.to_string())),
        };
        let whole_set = |request: Request| match arg {
            None => Ok(request),
            Some(name) if name.eq_ignore_ascii_case(ALL_DISPLAYS) => Ok(request),
            Some(_) => Err(invalid(format!("{} only applies to all displays", verb))),
        };

        match verb.as_str() {
            "set-level" | "level" => {
                let arg = arg.ok_or_else(|| invalid("set-level needs a level".into()))?;
                arg.parse()
                    .map(Request::SetLevel)
                    .map_err(|_| invalid(format!("{:?} is not a level", arg)))
            }
            "inc" | "up" => whole_set(Request::Step(Step::Brighter)),
            "dec" | "down" => whole_set(Request::Step(Step::Dimmer)),
            "max" => no_arg(Request::Max),
            "min" => no_arg(Request::Min),
            "default" => no_arg(Request::Default),
            "status" => no_arg(Request::Status),
            "on" => Ok(Request::Power(PowerState::On, target()?)),
            "off" => Ok(Request::Power(PowerState::Off, target()?)),
            "toggle" => Ok(Request::Toggle(target()?)),
            "swaysock" => arg
                .map(|path| Request::SwaySock(PathBuf::from(path)))
                .ok_or_else(|| invalid("swaysock needs a path".into())),
            "" => Err(invalid("empty request".into())),
            other => Err(invalid(format!("unknown request {:?}", other))),
        }
    }
}

fn invalid(msg: String) -> RequestError {
    RequestError::InvalidRequest(msg)
}

/// What an accepted request produced
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Report(Report),
    Status(Status),
    Ack,
}

/// First line of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Accepted and every display followed
    Ok,
    /// Accepted, some displays failed
    Partial,
    /// Rejected
    Error,
}

impl ResponseKind {
    /// Classify a response by its first line
    pub fn from_response(response: &str) -> Option<Self> {
        let first = response.lines().next()?.trim();
        match first.split_whitespace().next()? {
            "ok" => Some(ResponseKind::Ok),
            "partial" => Some(ResponseKind::Partial),
            "error" => Some(ResponseKind::Error),
            _ => None,
        }
    }

    pub fn exit_code(self) -> u8 {
        match self {
            ResponseKind::Ok => 0,
            ResponseKind::Partial => 1,
            ResponseKind::Error => 2,
        }
    }
}

/// Render the response text for a request result
pub fn render(result: &Result<Reply, RequestError>) -> String {
    let mut out = String::new();
    match result {
        Err(e) => {
            let _ = writeln!(out, "error {}: {}", e.kind(), e);
        }
        Ok(Reply::Ack) => out.push_str("ok\n"),
        Ok(Reply::Status(status)) => {
            out.push_str("ok\n");
            render_status(&mut out, status);
        }
        Ok(Reply::Report(report)) => {
            out.push_str(if report.is_partial() { "partial\n" } else { "ok\n" });
            for (display, err) in report.failures() {
                let _ = writeln!(out, "failed {} {}: {}", display, err.kind(), err);
            }
            render_status(&mut out, &report.status);
        }
    }
    out
}

fn render_status(out: &mut String, status: &Status) {
    let _ = writeln!(out, "level {}/{}", status.level, status.level_max);
    let _ = writeln!(out, "power {}", power_str(status.power));
    for display in &status.displays {
        let raw = display
            .raw
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unknown".into());
        let power = if display.has_power_control {
            power_str(display.power)
        } else {
            "none"
        };
        let _ = write!(out, "display {} raw={} power={}", display.name, raw, power);
        if display.leader {
            out.push_str(" leader");
        }
        out.push('\n');
    }
}

fn power_str(power: Option<PowerState>) -> &'static str {
    power.map(PowerState::as_str).unwrap_or("unknown")
}
