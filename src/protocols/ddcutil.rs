// SPDX-License-Identifier: GPL-3.0-only
//! DDC/CI brightness through the `ddcutil` command-line tool
//!
//! Each read or write spawns one `ddcutil` process addressed by the 1-based
//! display number reported by `ddcutil detect`. The child is killed if the
//! caller stops waiting for it.

use std::process::Stdio;

use tokio::process::Command;

use super::BrightnessControl;
use crate::error::{BackendError, Result};

/// VCP (Virtual Control Panel) code for brightness
const BRIGHTNESS_CODE: &str = "10";

const DEFAULT_PROGRAM: &str = "ddcutil";

/// Brightness control through `ddcutil`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdcUtilControl {
    display: u8,
    program: String,
    base_args: Vec<String>,
}

impl DdcUtilControl {
    /// Create a control for `ddcutil --display <display>`
    pub fn new(display: u8) -> Self {
        Self {
            display,
            program: DEFAULT_PROGRAM.to_string(),
            base_args: Vec::new(),
        }
    }

    /// Run `program` with `base_args` in front of the usual ddcutil arguments
    #[cfg(test)]
    fn with_command(display: u8, program: &str, base_args: &[&str]) -> Self {
        Self {
            display,
            program: program.to_string(),
            base_args: base_args.iter().map(|a| a.to_string()).collect(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args)
            .args(args)
            .arg("--display")
            .arg(self.display.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(display = self.display, ?args, "Running {}", self.program);

        let output = cmd.output().await.map_err(|e| self.error(e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = match stderr.trim() {
                "" => format!("exited with {}", output.status),
                msg => format!("exited with {}: {}", output.status, msg),
            };
            return Err(self.error(reason));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn error(&self, reason: impl std::fmt::Display) -> BackendError {
        BackendError::ExternalTool {
            tool: self.program.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Current value from `ddcutil getvcp --brief` output (`VCP 10 C <cur> <max>`)
fn parse_brief(output: &str) -> Option<u32> {
    let mut fields = output.split_whitespace();
    if fields.next()? != "VCP" {
        return None;
    }
    if !fields.next()?.eq_ignore_ascii_case(BRIGHTNESS_CODE) {
        return None;
    }
    // C = continuous feature
    if fields.next()? != "C" {
        return None;
    }
    fields.next()?.parse().ok()
}

impl BrightnessControl for DdcUtilControl {
    async fn read_brightness(&self) -> Result<u32> {
        let output = self.run(&["getvcp", BRIGHTNESS_CODE, "--brief"]).await?;
        parse_brief(&output)
            .ok_or_else(|| self.error(format!("unexpected output: {:?}", output.trim())))
    }

    async fn write_brightness(&self, raw: u32) -> Result<()> {
        let value = raw.to_string();
        self.run(&["setvcp", BRIGHTNESS_CODE, &value, "--noverify"])
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_brief() {
        assert_eq!(parse_brief("VCP 10 C 50 100\n"), Some(50));
        assert_eq!(parse_brief("VCP 10 SNC x01"), None);
        assert_eq!(parse_brief("Display not found"), None);
        assert_eq!(parse_brief(""), None);
    }

    #[tokio::test]
    async fn test_write_passes_value_and_display() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("args");
        let script = format!("echo \"$@\" > {}", log.display());
        let control = DdcUtilControl::with_command(2, "sh", &["-c", &script, "ddcutil"]);

        control.write_brightness(37).await.unwrap();
        let args = std::fs::read_to_string(&log).unwrap();
        assert_eq!(args.trim(), "setvcp 10 37 --noverify --display 2");
    }

    #[tokio::test]
    async fn test_read_parses_stdout() {
        let control =
            DdcUtilControl::with_command(1, "sh", &["-c", "echo 'VCP 10 C 64 100'", "ddcutil"]);
        assert_eq!(control.read_brightness().await.unwrap(), 64);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_tool_error() {
        let control = DdcUtilControl::with_command(
            1,
            "sh",
            &["-c", "echo 'No monitor detected' >&2; exit 1", "ddcutil"],
        );
        let err = control.write_brightness(10).await.unwrap_err();
        assert_eq!(err.kind(), "external-tool");
        assert!(err.to_string().contains("No monitor detected"));
    }

    #[tokio::test]
    async fn test_missing_tool_is_tool_error() {
        let control =
            DdcUtilControl::with_command(1, "/nonexistent/ddcutil-for-tests", &[]);
        assert!(matches!(
            control.write_brightness(10).await,
            Err(BackendError::ExternalTool { .. })
        ));
    }
}
