//! Individual host probes. Each one degrades to a sensible default
//! instead of failing; a half-empty profile is still useful context.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const PACKAGE_LIST_TIMEOUT: Duration = Duration::from_secs(15);

const PACKAGE_MANAGERS: &[&str] = &[
    "apt", "pacman", "dnf", "zypper", "emerge", "apk", "yum", "brew",
];

const PROBED_TOOLS: &[&str] = &[
    "python3",
    "node",
    "npm",
    "git",
    "docker",
    "gcc",
    "make",
    "nvim",
    "vim",
    "go",
    "rustc",
    "cargo",
    "java",
    "kubectl",
    "terraform",
];

/// First package manager found on PATH.
#[must_use]
pub fn detect_package_manager() -> Option<String> {
    PACKAGE_MANAGERS
        .iter()
        .find(|pm| which(pm).is_some())
        .map(|pm| (*pm).to_string())
}

/// Minimal `which`: search PATH entries for an executable file.
#[must_use]
pub fn which(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(program);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// `$SHELL` name, path, and first version line.
pub async fn detect_shell() -> (String, String, String) {
    let path = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let name = Path::new(&path)
        .file_name()
        .map_or_else(|| path.clone(), |name| name.to_string_lossy().into_owned());
    let version = version_line(&path).await.unwrap_or_else(|| "unknown".to_string());
    (name, path, version)
}

/// Desktop environment or window manager from the session env.
#[must_use]
pub fn detect_desktop() -> Option<String> {
    std::env::var("XDG_CURRENT_DESKTOP")
        .or_else(|_| std::env::var("DESKTOP_SESSION"))
        .ok()
        .filter(|de| !de.is_empty())
}

/// Version lines for every probed developer tool found on PATH.
pub async fn tool_versions() -> Vec<(String, String)> {
    let mut versions = Vec::new();
    for tool in PROBED_TOOLS {
        if which(tool).is_none() {
            continue;
        }
        let line = version_line(tool)
            .await
            .unwrap_or_else(|| "installed".to_string());
        versions.push(((*tool).to_string(), line));
    }
    versions
}

/// Installed package list via the detected manager, capped at `limit`.
pub async fn installed_packages(package_manager: &str, limit: usize) -> Vec<String> {
    let listing: &[&str] = match package_manager {
        "apt" => &["dpkg-query", "-W", "-f=${Package} ${Version}\n"],
        "pacman" => &["pacman", "-Q"],
        "dnf" | "yum" | "zypper" => &["rpm", "-qa", "--queryformat", "%{NAME} %{VERSION}\n"],
        "apk" => &["apk", "list", "--installed"],
        _ => return Vec::new(),
    };

    let output = run_with_timeout(listing[0], &listing[1..], PACKAGE_LIST_TIMEOUT).await;
    let Some(output) = output else {
        return Vec::new();
    };
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(limit)
        .map(String::from)
        .collect()
}

/// Kernel release from procfs.
pub async fn kernel_release() -> String {
    tokio::fs::read_to_string("/proc/sys/kernel/osrelease")
        .await
        .map(|release| release.trim().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Total and available memory in megabytes, from /proc/meminfo.
pub async fn memory_mb() -> (u64, u64) {
    let Ok(meminfo) = tokio::fs::read_to_string("/proc/meminfo").await else {
        return (0, 0);
    };
    let total = meminfo_field(&meminfo, "MemTotal:");
    let available = meminfo_field(&meminfo, "MemAvailable:");
    (total / 1024, available / 1024)
}

fn meminfo_field(meminfo: &str, field: &str) -> u64 {
    meminfo
        .lines()
        .find(|line| line.starts_with(field))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse().ok())
        .unwrap_or(0)
}

/// Distro fields from /etc/os-release: (pretty name, id, version id).
pub async fn os_release() -> (String, String, String) {
    let content = tokio::fs::read_to_string("/etc/os-release")
        .await
        .unwrap_or_default();
    (
        os_release_field(&content, "PRETTY_NAME").unwrap_or_else(|| "unknown".to_string()),
        os_release_field(&content, "ID").unwrap_or_else(|| "unknown".to_string()),
        os_release_field(&content, "VERSION_ID").unwrap_or_default(),
    )
}

fn os_release_field(content: &str, key: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let (k, v) = line.split_once('=')?;
        if k != key {
            return None;
        }
        Some(v.trim().trim_matches('"').to_string())
    })
}

async fn version_line(program: &str) -> Option<String> {
    let output = run_with_timeout(program, &["--version"], PROBE_TIMEOUT).await?;
    output.lines().next().map(|line| line.trim().to_string())
}

async fn run_with_timeout(program: &str, args: &[&str], timeout: Duration) -> Option<String> {
    let fut = Command::new(program).args(args).output();
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if stdout.trim().is_empty() {
                // Some tools print their version to stderr.
                let stderr = String::from_utf8_lossy(&output.stderr);
                Some(stderr.into_owned())
            } else {
                Some(stdout.into_owned())
            }
        }
        Ok(Err(err)) => {
            tracing::debug!(program, %err, "probe failed to launch");
            None
        }
        Err(_) => {
            tracing::debug!(program, "probe timed out");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn which_finds_sh() {
        assert!(which("sh").is_some());
    }

    #[test]
    fn which_misses_nonexistent() {
        assert!(which("definitely-not-a-real-binary-xyz").is_none());
    }

    #[test]
    fn os_release_field_parses_quoted_values() {
        let content = "NAME=\"Debian GNU/Linux\"\nID=debian\nVERSION_ID=\"12\"\n";
        assert_eq!(
            os_release_field(content, "NAME").unwrap(),
            "Debian GNU/Linux"
        );
        assert_eq!(os_release_field(content, "ID").unwrap(), "debian");
        assert_eq!(os_release_field(content, "VERSION_ID").unwrap(), "12");
        assert!(os_release_field(content, "CODENAME").is_none());
    }

    #[test]
    fn meminfo_field_parses_kb() {
        let meminfo = "MemTotal:       16384000 kB\nMemAvailable:    8192000 kB\n";
        assert_eq!(meminfo_field(meminfo, "MemTotal:"), 16_384_000);
        assert_eq!(meminfo_field(meminfo, "MemAvailable:"), 8_192_000);
        assert_eq!(meminfo_field(meminfo, "SwapTotal:"), 0);
    }

    #[tokio::test]
    async fn detect_shell_reports_name_and_path() {
        let (name, path, _version) = detect_shell().await;
        assert!(!name.is_empty());
        assert!(!path.is_empty());
    }

    #[tokio::test]
    async fn kernel_release_is_nonempty() {
        let release = kernel_release().await;
        assert!(!release.is_empty());
    }

    #[tokio::test]
    async fn unknown_package_manager_lists_nothing() {
        let packages = installed_packages("not-a-pm", 10).await;
        assert!(packages.is_empty());
    }

    #[tokio::test]
    async fn version_line_for_missing_tool_is_none() {
        assert!(version_line("definitely-not-a-real-binary-xyz").await.is_none());
    }
}
