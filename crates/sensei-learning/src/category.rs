//! Command categorization for progress tracking.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    FileOps,
    Packages,
    Permissions,
    TextEditing,
    Networking,
    Processes,
    Git,
    Docker,
    System,
}

pub const ALL_CATEGORIES: &[Category] = &[
    Category::FileOps,
    Category::Packages,
    Category::Permissions,
    Category::TextEditing,
    Category::Networking,
    Category::Processes,
    Category::Git,
    Category::Docker,
    Category::System,
];

impl Category {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::FileOps => "File Ops",
            Self::Packages => "Packages",
            Self::Permissions => "Permissions",
            Self::TextEditing => "Text Editing",
            Self::Networking => "Networking",
            Self::Processes => "Processes",
            Self::Git => "Git",
            Self::Docker => "Docker",
            Self::System => "System",
        }
    }

    fn programs(self) -> &'static [&'static str] {
        match self {
            Self::FileOps => &[
                "ls", "cd", "cp", "mv", "rm", "mkdir", "rmdir", "find", "locate", "touch", "cat",
                "less", "more", "head", "tail", "tree", "file", "stat", "du", "df",
            ],
            Self::Packages => &[
                "apt", "apt-get", "pacman", "dnf", "yum", "zypper", "pip", "pip3", "npm", "yarn",
                "cargo", "gem", "brew", "apk",
            ],
            Self::Permissions => &[
                "chmod", "chown", "sudo", "su", "groups", "id", "whoami", "usermod",
            ],
            Self::TextEditing => &[
                "vim", "nvim", "nano", "vi", "sed", "awk", "grep", "cut", "tr", "sort", "uniq",
                "wc",
            ],
            Self::Networking => &[
                "ping", "curl", "wget", "ssh", "scp", "rsync", "netstat", "ifconfig", "ip",
                "traceroute", "nslookup", "dig",
            ],
            Self::Processes => &[
                "ps", "kill", "top", "htop", "nice", "bg", "fg", "jobs", "killall", "pkill",
                "pgrep",
            ],
            Self::Git => &["git"],
            Self::Docker => &["docker", "docker-compose", "podman"],
            Self::System => &[
                "uname", "uptime", "date", "cal", "history", "reboot", "shutdown", "systemctl",
                "journalctl",
            ],
        }
    }

    /// Categorize a command line by its first token. `sudo` categorizes
    /// as Permissions even when wrapping another command, matching how
    /// the first token reads.
    #[must_use]
    pub fn of_command(command: &str) -> Option<Self> {
        let program = command.split_whitespace().next()?;
        ALL_CATEGORIES
            .iter()
            .copied()
            .find(|category| category.programs().contains(&program))
    }
}
