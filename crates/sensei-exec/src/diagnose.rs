//! Lexical failure diagnosis over captured stderr.
//!
//! Signatures are checked in rank order; the first hit names the cause.
//! The suggested fix, when present, is a full [`CommandProposal`] that
//! re-enters classification like any other command.

use std::fmt;

use serde::Serialize;

use crate::proposal::CommandProposal;
use crate::runner::ExecutionResult;

/// Recognized classes of command failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    MissingCommand,
    PermissionDenied,
    MissingPath,
    DiskFull,
    Network,
    Timeout,
    Unknown,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MissingCommand => "command not found",
            Self::PermissionDenied => "permission denied",
            Self::MissingPath => "no such file or directory",
            Self::DiskFull => "no space left on device",
            Self::Network => "network failure",
            Self::Timeout => "timed out",
            Self::Unknown => "unknown failure",
        };
        f.write_str(text)
    }
}

/// A diagnosed failure: the cause, a human-readable sentence, and an
/// optional fix proposal.
#[derive(Clone, Debug)]
pub struct FailureReport {
    pub cause: FailureCause,
    pub likely_cause: String,
    pub suggested_fix: Option<CommandProposal>,
}

/// Maps a failed [`ExecutionResult`] to a [`FailureReport`].
///
/// Knows the host's package manager so a missing-command fix installs
/// with the right tool.
#[derive(Clone, Debug)]
pub struct Diagnoser {
    package_manager: Option<String>,
}

impl Diagnoser {
    #[must_use]
    pub fn new(package_manager: Option<String>) -> Self {
        Self { package_manager }
    }

    #[must_use]
    pub fn diagnose(&self, result: &ExecutionResult) -> FailureReport {
        if result.timed_out {
            return FailureReport {
                cause: FailureCause::Timeout,
                likely_cause: "The command exceeded its time limit and was killed.".to_string(),
                suggested_fix: None,
            };
        }

        let stderr = result.stderr_lossy().to_lowercase();

        if stderr.contains("command not found") || stderr.contains("not found") {
            let program = missing_program(result);
            let suggested_fix = self.install_command(&program).map(|install| {
                CommandProposal::new(
                    install,
                    result.command.clone(),
                    format!("Install the missing `{program}` package."),
                )
            });
            return FailureReport {
                cause: FailureCause::MissingCommand,
                likely_cause: format!("`{program}` is not installed or not on PATH."),
                suggested_fix,
            };
        }

        if stderr.contains("permission denied") || stderr.contains("operation not permitted") {
            let suggested_fix = sudo_fix(&result.command);
            return FailureReport {
                cause: FailureCause::PermissionDenied,
                likely_cause: "The command lacks permission for what it tried to do.".to_string(),
                suggested_fix,
            };
        }

        if stderr.contains("no space left on device") || stderr.contains("disk full") {
            return FailureReport {
                cause: FailureCause::DiskFull,
                likely_cause: "The target filesystem is out of space.".to_string(),
                suggested_fix: Some(CommandProposal::new(
                    "df -h",
                    result.command.clone(),
                    "Show filesystem usage to find what filled up.",
                )),
            };
        }

        if stderr.contains("no such file or directory") {
            return FailureReport {
                cause: FailureCause::MissingPath,
                likely_cause: "A file or directory the command referenced does not exist."
                    .to_string(),
                suggested_fix: None,
            };
        }

        if stderr.contains("could not resolve")
            || stderr.contains("connection refused")
            || stderr.contains("connection timed out")
            || stderr.contains("network is unreachable")
            || stderr.contains("temporary failure in name resolution")
        {
            return FailureReport {
                cause: FailureCause::Network,
                likely_cause: "A network request failed; the host may be offline or the remote down."
                    .to_string(),
                suggested_fix: None,
            };
        }

        FailureReport {
            cause: FailureCause::Unknown,
            likely_cause: format!("The command exited with code {}.", result.exit_code),
            suggested_fix: None,
        }
    }

    fn install_command(&self, program: &str) -> Option<String> {
        if program.is_empty() {
            return None;
        }
        let pm = self.package_manager.as_deref()?;
        let install = match pm {
            "apt" | "apt-get" => format!("sudo apt install -y {program}"),
            "pacman" => format!("sudo pacman -S --noconfirm {program}"),
            "dnf" => format!("sudo dnf install -y {program}"),
            "yum" => format!("sudo yum install -y {program}"),
            "zypper" => format!("sudo zypper install -y {program}"),
            "apk" => format!("sudo apk add {program}"),
            "brew" => format!("brew install {program}"),
            _ => return None,
        };
        Some(install)
    }
}

/// The program named in a "command not found" message, falling back to
/// the first token of the command line.
fn missing_program(result: &ExecutionResult) -> String {
    let stderr = result.stderr_lossy();
    for line in stderr.lines() {
        // "zsh: command not found: htop"
        if let Some(rest) = line.split("command not found:").nth(1) {
            let name = rest.trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
        // "bash: htop: command not found" or "sh: 1: htop: command not found"
        if let Some(prefix) = line.trim_end().strip_suffix("command not found") {
            let head = prefix.trim_end().trim_end_matches(':');
            if let Some(name) = head.rsplit(':').next() {
                let name = name.trim();
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }
    }
    result
        .command
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

fn sudo_fix(command: &str) -> Option<CommandProposal> {
    let trimmed = command.trim_start();
    if trimmed.starts_with("sudo ") || trimmed == "sudo" {
        return None;
    }
    Some(CommandProposal::new(
        format!("sudo {trimmed}"),
        command.to_string(),
        "Retry with elevated privileges.",
    ))
}
