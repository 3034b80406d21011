//! Achievement definitions and unlock checks.

use std::collections::BTreeMap;

use crate::category::Category;

#[derive(Clone, Copy, Debug)]
pub struct Achievement {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
    check: fn(&BTreeMap<Category, u64>, u64) -> bool,
}

impl Achievement {
    #[must_use]
    pub fn unlocked_by(&self, categories: &BTreeMap<Category, u64>, total: u64) -> bool {
        (self.check)(categories, total)
    }
}

fn category_count(categories: &BTreeMap<Category, u64>, category: Category) -> u64 {
    categories.get(&category).copied().unwrap_or(0)
}

pub const ACHIEVEMENTS: &[Achievement] = &[
    Achievement {
        id: "first_cmd",
        name: "First Steps",
        icon: "🌱",
        description: "Ran your first command",
        check: |_, total| total >= 1,
    },
    Achievement {
        id: "ten_cmds",
        name: "Getting Started",
        icon: "🚶",
        description: "Ran 10 commands total",
        check: |_, total| total >= 10,
    },
    Achievement {
        id: "file_explorer",
        name: "File Explorer",
        icon: "📂",
        description: "Used 5 file operation commands",
        check: |cats, _| category_count(cats, Category::FileOps) >= 5,
    },
    Achievement {
        id: "package_pro",
        name: "Package Pro",
        icon: "📦",
        description: "Installed or managed 3 packages",
        check: |cats, _| category_count(cats, Category::Packages) >= 3,
    },
    Achievement {
        id: "sudo_savvy",
        name: "Sudo Savvy",
        icon: "🛡️",
        description: "Used permission commands 3 times safely",
        check: |cats, _| category_count(cats, Category::Permissions) >= 3,
    },
    Achievement {
        id: "git_guru",
        name: "Git Guru",
        icon: "🔀",
        description: "Used git 5 times",
        check: |cats, _| category_count(cats, Category::Git) >= 5,
    },
    Achievement {
        id: "network_ninja",
        name: "Network Ninja",
        icon: "🌐",
        description: "Used 3 networking commands",
        check: |cats, _| category_count(cats, Category::Networking) >= 3,
    },
    Achievement {
        id: "text_master",
        name: "Text Master",
        icon: "✏️",
        description: "Used 4 text editing commands",
        check: |cats, _| category_count(cats, Category::TextEditing) >= 4,
    },
    Achievement {
        id: "docker_dev",
        name: "Docker Dev",
        icon: "🐳",
        description: "Used docker 3 times",
        check: |cats, _| category_count(cats, Category::Docker) >= 3,
    },
    Achievement {
        id: "fifty_cmds",
        name: "Power User",
        icon: "⚡",
        description: "Ran 50 commands total",
        check: |_, total| total >= 50,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn by_id(id: &str) -> &'static Achievement {
        ACHIEVEMENTS
            .iter()
            .find(|achievement| achievement.id == id)
            .unwrap()
    }

    #[test]
    fn first_command_unlocks_first_steps() {
        let categories = BTreeMap::new();
        assert!(!by_id("first_cmd").unlocked_by(&categories, 0));
        assert!(by_id("first_cmd").unlocked_by(&categories, 1));
    }

    #[test]
    fn category_thresholds() {
        let mut categories = BTreeMap::new();
        categories.insert(Category::Git, 4);
        assert!(!by_id("git_guru").unlocked_by(&categories, 100));
        categories.insert(Category::Git, 5);
        assert!(by_id("git_guru").unlocked_by(&categories, 100));
    }

    #[test]
    fn ids_are_unique() {
        let mut ids: Vec<_> = ACHIEVEMENTS.iter().map(|a| a.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), ACHIEVEMENTS.len());
    }

    #[test]
    fn there_are_ten_achievements() {
        assert_eq!(ACHIEVEMENTS.len(), 10);
    }
}
