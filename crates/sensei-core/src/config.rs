use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use sensei_exec::{ExecConfig, RiskClassifier};

/// Top-level configuration, one section per subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for the profile, progress, and audit files.
    /// Defaults to `~/.sensei`.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub learning: LearningConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Rescan the host once the stored profile is older than this.
    #[serde(default = "default_refresh_days")]
    pub refresh_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_max_output_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.2
}

fn default_refresh_days() -> i64 {
    7
}

fn default_true() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            refresh_days: default_refresh_days(),
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to sensible defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed,
    /// or if an operator risk pattern fails to compile.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("SENSEI_GEMINI_API_KEY")
            && !key.is_empty()
        {
            self.llm.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("SENSEI_MODEL")
            && !model.is_empty()
        {
            self.llm.model = model;
        }
    }

    /// Fail fast on bad operator input instead of at first use.
    fn validate(&self) -> anyhow::Result<()> {
        RiskClassifier::new(&self.exec.risk).context("invalid risk pattern in config")?;
        anyhow::ensure!(
            self.exec.timeout_secs > 0,
            "exec.timeout_secs must be positive"
        );
        Ok(())
    }

    /// Resolved data directory: the configured one, or `~/.sensei`.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.data_dir {
            return dir.clone();
        }
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sensei")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert_eq!(config.exec.timeout_secs, 30);
        assert!(config.learning.enabled);
    }

    #[test]
    #[serial]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [llm]
            model = "gemini-2.5-pro"

            [exec]
            timeout_secs = 10
            "#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.llm.model, "gemini-2.5-pro");
        assert_eq!(config.exec.timeout_secs, 10);
        assert_eq!(config.exec.max_retries, 2);
        assert_eq!(config.profile.refresh_days, 7);
    }

    #[test]
    #[serial]
    fn env_overrides_api_key_and_model() {
        let dir = tempfile::tempdir().unwrap();
        // SAFETY: serialized with #[serial]; no other thread touches env.
        unsafe {
            std::env::set_var("SENSEI_GEMINI_API_KEY", "from-env");
            std::env::set_var("SENSEI_MODEL", "gemini-env-model");
        }
        let config = Config::load(&dir.path().join("nope.toml")).unwrap();
        unsafe {
            std::env::remove_var("SENSEI_GEMINI_API_KEY");
            std::env::remove_var("SENSEI_MODEL");
        }
        assert_eq!(config.llm.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.llm.model, "gemini-env-model");
    }

    #[test]
    #[serial]
    fn invalid_risk_pattern_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [exec.risk]
            blocked = ["(unclosed"]
            "#,
        )
        .unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    #[serial]
    fn zero_timeout_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[exec]\ntimeout_secs = 0\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn explicit_data_dir_wins() {
        let config = Config {
            data_dir: Some(PathBuf::from("/tmp/custom")),
            ..Config::default()
        };
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/custom"));
    }

    #[test]
    fn default_data_dir_is_under_home() {
        let config = Config::default();
        assert!(config.data_dir().ends_with(".sensei"));
    }
}
