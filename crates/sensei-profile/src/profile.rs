use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProfileError;
use crate::probe;

const PROFILE_JSON: &str = "system_profile.json";
const PROFILE_MD: &str = "system_profile.md";

/// At most this many package lines are kept; enough context without
/// bloating every prompt.
const PACKAGE_CAP: usize = 300;
const PACKAGE_SCAN_LIMIT: usize = 5000;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShellInfo {
    pub name: String,
    pub path: String,
    pub version: String,
}

/// Snapshot of the host: what's installed, how it's configured, and what
/// the user has to work with. Rendered to markdown as model context.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemProfile {
    pub generated_at: DateTime<Utc>,
    pub distro: String,
    pub distro_id: String,
    pub distro_version: String,
    pub kernel: String,
    pub package_manager: Option<String>,
    pub shell: ShellInfo,
    pub desktop: Option<String>,
    pub user: String,
    pub arch: String,
    pub cpu_threads: usize,
    pub ram_total_mb: u64,
    pub ram_available_mb: u64,
    pub tool_versions: Vec<(String, String)>,
    /// First [`PACKAGE_CAP`] installed packages.
    pub packages: Vec<String>,
    pub package_count: usize,
}

impl SystemProfile {
    /// Probe the host and build a fresh profile. Individual probe
    /// failures degrade to defaults rather than aborting the scan.
    pub async fn scan() -> Self {
        let (distro, distro_id, distro_version) = probe::os_release().await;
        let kernel = probe::kernel_release().await;
        let package_manager = probe::detect_package_manager();
        let (shell_name, shell_path, shell_version) = probe::detect_shell().await;
        let (ram_total_mb, ram_available_mb) = probe::memory_mb().await;
        let tool_versions = probe::tool_versions().await;

        let mut packages = Vec::new();
        if let Some(ref pm) = package_manager {
            packages = probe::installed_packages(pm, PACKAGE_SCAN_LIMIT).await;
        }
        let package_count = packages.len();
        packages.truncate(PACKAGE_CAP);

        tracing::info!(
            distro = %distro,
            package_manager = package_manager.as_deref().unwrap_or("none"),
            tools = tool_versions.len(),
            packages = package_count,
            "system profile scanned"
        );

        Self {
            generated_at: Utc::now(),
            distro,
            distro_id,
            distro_version,
            kernel,
            package_manager,
            shell: ShellInfo {
                name: shell_name,
                path: shell_path,
                version: shell_version,
            },
            desktop: probe::detect_desktop(),
            user: std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
            arch: std::env::consts::ARCH.to_string(),
            cpu_threads: std::thread::available_parallelism().map_or(1, std::num::NonZero::get),
            ram_total_mb,
            ram_available_mb,
            tool_versions,
            packages,
            package_count,
        }
    }

    /// Render the profile as the markdown block fed to the model.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "# System Profile");
        let _ = writeln!(md, "Generated: {}", self.generated_at.to_rfc3339());
        let _ = writeln!(md);
        let _ = writeln!(md, "## Operating System");
        let _ = writeln!(md, "- Distribution: {}", self.distro);
        let _ = writeln!(md, "- Distro ID: {}", self.distro_id);
        if !self.distro_version.is_empty() {
            let _ = writeln!(md, "- Version: {}", self.distro_version);
        }
        let _ = writeln!(md, "- Kernel: {}", self.kernel);
        let _ = writeln!(md, "- Architecture: {}", self.arch);
        let _ = writeln!(md);
        let _ = writeln!(
            md,
            "## Package Manager\n- {}",
            self.package_manager.as_deref().unwrap_or("unknown")
        );
        let _ = writeln!(md);
        let _ = writeln!(md, "## Shell");
        let _ = writeln!(md, "- Shell: {}", self.shell.name);
        let _ = writeln!(md, "- Version: {}", self.shell.version);
        let _ = writeln!(md, "- Path: {}", self.shell.path);
        if let Some(ref desktop) = self.desktop {
            let _ = writeln!(md, "\n## Desktop\n- {desktop}");
        }
        let _ = writeln!(md);
        let _ = writeln!(md, "## User\n- Username: {}", self.user);
        let _ = writeln!(md);
        let _ = writeln!(md, "## Hardware");
        let _ = writeln!(md, "- CPU threads: {}", self.cpu_threads);
        let _ = writeln!(
            md,
            "- RAM: {} MB total, {} MB available",
            self.ram_total_mb, self.ram_available_mb
        );
        let _ = writeln!(md);
        let _ = writeln!(md, "## Installed Developer Tools");
        for (tool, version) in &self.tool_versions {
            let _ = writeln!(md, "- {tool}: {version}");
        }
        let _ = writeln!(md);
        let _ = writeln!(md, "## Installed Packages ({} total)", self.package_count);
        let _ = writeln!(md, "```");
        for package in &self.packages {
            let _ = writeln!(md, "{package}");
        }
        if self.package_count > self.packages.len() {
            let _ = writeln!(
                md,
                "... and {} more packages",
                self.package_count - self.packages.len()
            );
        }
        let _ = writeln!(md, "```");
        md
    }

    /// Persist both the JSON form and the rendered markdown under `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or written.
    pub async fn save(&self, dir: &Path) -> Result<(), ProfileError> {
        tokio::fs::create_dir_all(dir).await?;
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(dir.join(PROFILE_JSON), json).await?;
        tokio::fs::write(dir.join(PROFILE_MD), self.to_markdown()).await?;
        Ok(())
    }

    /// Load a previously saved profile, or `None` if absent or invalid.
    pub async fn load(dir: &Path) -> Option<Self> {
        let content = tokio::fs::read_to_string(dir.join(PROFILE_JSON))
            .await
            .ok()?;
        match serde_json::from_str(&content) {
            Ok(profile) => Some(profile),
            Err(err) => {
                tracing::warn!(%err, "stored system profile is invalid, rescanning");
                None
            }
        }
    }

    /// True once the profile is older than `max_age_days`.
    #[must_use]
    pub fn is_stale(&self, max_age_days: i64) -> bool {
        Utc::now() - self.generated_at > chrono::Duration::days(max_age_days)
    }

    #[must_use]
    pub fn markdown_path(dir: &Path) -> PathBuf {
        dir.join(PROFILE_MD)
    }
}
