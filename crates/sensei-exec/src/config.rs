use serde::{Deserialize, Serialize};

/// Configuration for the execution pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Shell used to run commands. Falls back to `$SHELL`, then `/bin/sh`.
    #[serde(default)]
    pub shell: Option<String>,
    /// Wall-clock limit per command, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Automatic retries after the first failed attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Extra risk patterns merged on top of the built-in tables.
///
/// Operator patterns are additive only: they can tighten policy but
/// never remove a built-in rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default)]
    pub blocked: Vec<String>,
    #[serde(default)]
    pub confirm: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,
    /// "stdout" or a file path.
    #[serde(default = "default_audit_destination")]
    pub destination: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_audit_destination() -> String {
    "stdout".to_string()
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            shell: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            risk: RiskConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            destination: default_audit_destination(),
        }
    }
}
