//! Lexical risk classification of shell commands.
//!
//! Classification is deliberately dumb: ordered regex tables over the raw
//! command text, no shell parsing, no model involvement. The blocked table
//! is scanned before the confirm table, so a command matching both tiers
//! always lands on the stricter one.

use regex::Regex;
use serde::Serialize;

use crate::config::RiskConfig;
use crate::error::ExecError;

/// Risk tier assigned to a command before it may run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Runs without interaction.
    Safe,
    /// Requires an explicit user approval first.
    ConfirmRequired,
    /// Never runs. There is no override.
    Blocked,
}

/// Outcome of classifying one command.
#[derive(Clone, Debug)]
pub struct Classification {
    pub tier: RiskTier,
    /// Human-readable labels of every matched rule. For `Blocked` this
    /// holds exactly the first match; for `ConfirmRequired` it holds all
    /// matches so the user sees every reason at once.
    pub matched: Vec<String>,
}

#[derive(Debug)]
struct Rule {
    pattern: Regex,
    label: String,
}

/// Patterns that can never run, with the label shown to the user.
const BLOCKED_PATTERNS: &[(&str, &str)] = &[
    (r"rm\s+-rf\s*/\s*$", "recursive force-delete of the filesystem root"),
    (
        r"rm\s+-rf\s*/(bin|boot|etc|home|lib|sbin|usr|var)\b",
        "recursive force-delete of a system directory",
    ),
    (r"--no-preserve-root", "explicit root-deletion override"),
    (
        r"\bdd\b.*\bof=/dev/(sd|hd|nvme|vd)",
        "raw write to a block device",
    ),
    (r">\s*/dev/(sd|hd|nvme|vd)", "raw redirect onto a block device"),
    (r"\bmkfs(\.[a-z0-9]+)?\b", "filesystem format"),
    (
        r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
        "fork bomb",
    ),
    (r"chmod\s+(-R\s+)?777\s+/\s*$", "world-writable filesystem root"),
    (r"chown\s+-R\b.*\s+/\s*$", "recursive ownership change of /"),
];

/// Patterns that require explicit approval, with the reason shown.
const CONFIRM_PATTERNS: &[(&str, &str)] = &[
    (r"\bsudo\b", "runs with elevated privileges"),
    (r"\brm\s+(-[a-zA-Z]*r[a-zA-Z]*f|-[a-zA-Z]*f[a-zA-Z]*r)\b", "recursively force-deletes files"),
    (r"\brm\s+-[a-zA-Z]*r\b", "recursively deletes files"),
    (
        r"\b(curl|wget)\b.*\|\s*(ba|z|da)?sh\b",
        "pipes a downloaded script into a shell",
    ),
    (r"\bchmod\s+-R\b", "recursively changes permissions"),
    (r"\bchown\s+-R\b", "recursively changes ownership"),
    (r"\bdd\b", "performs a low-level disk copy"),
    (
        r"\b(apt|apt-get)\s+(remove|purge|autoremove)\b",
        "removes installed packages",
    ),
    (r"\bpacman\s+-R", "removes installed packages"),
    (r"\b(dnf|yum)\s+(remove|erase)\b", "removes installed packages"),
    (r"\bzypper\s+(remove|rm)\b", "removes installed packages"),
    (r"\bapk\s+del\b", "removes installed packages"),
    (
        r"\bsystemctl\s+(stop|disable|mask)\b",
        "stops or disables a system service",
    ),
    (r"\bkillall\b", "kills processes by name"),
    (r"\buserdel\b|\bgroupdel\b", "deletes a user or group"),
];

/// Ordered-table classifier. Built once at startup; classification itself
/// is infallible.
#[derive(Debug)]
pub struct RiskClassifier {
    blocked: Vec<Rule>,
    confirm: Vec<Rule>,
}

impl RiskClassifier {
    /// Build the classifier from the built-in tables plus operator extras.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::InvalidPattern`] if an operator-supplied regex
    /// fails to compile. Built-in patterns are covered by tests and cannot
    /// fail here in practice, but go through the same path.
    pub fn new(config: &RiskConfig) -> Result<Self, ExecError> {
        let mut blocked = compile_builtin(BLOCKED_PATTERNS)?;
        for pattern in &config.blocked {
            blocked.push(compile_extra(pattern)?);
        }
        let mut confirm = compile_builtin(CONFIRM_PATTERNS)?;
        for pattern in &config.confirm {
            confirm.push(compile_extra(pattern)?);
        }
        Ok(Self { blocked, confirm })
    }

    /// Classify a command. Blocked rules win over confirm rules; within
    /// the blocked table the first match wins.
    #[must_use]
    pub fn classify(&self, command: &str) -> Classification {
        for rule in &self.blocked {
            if rule.pattern.is_match(command) {
                return Classification {
                    tier: RiskTier::Blocked,
                    matched: vec![rule.label.clone()],
                };
            }
        }
        let matched: Vec<String> = self
            .confirm
            .iter()
            .filter(|rule| rule.pattern.is_match(command))
            .map(|rule| rule.label.clone())
            .collect();
        if matched.is_empty() {
            Classification {
                tier: RiskTier::Safe,
                matched,
            }
        } else {
            Classification {
                tier: RiskTier::ConfirmRequired,
                matched,
            }
        }
    }
}

fn compile_builtin(table: &[(&str, &str)]) -> Result<Vec<Rule>, ExecError> {
    table
        .iter()
        .map(|(pattern, label)| {
            Ok(Rule {
                pattern: compile(pattern)?,
                label: (*label).to_string(),
            })
        })
        .collect()
}

fn compile_extra(pattern: &str) -> Result<Rule, ExecError> {
    Ok(Rule {
        pattern: compile(pattern)?,
        label: format!("matches operator pattern `{pattern}`"),
    })
}

fn compile(pattern: &str) -> Result<Regex, ExecError> {
    Regex::new(pattern).map_err(|source| ExecError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}
