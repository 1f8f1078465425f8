//! App directory filtering.
//!
//! Derives the visible app list from the platform's installed-app list and
//! the whitelist. The list is recomputed on every call; there is no
//! incremental diffing. The full-list variant (settings screen) supports a
//! free-text filter over label and identifier.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use tracing::debug;

/// One launchable app, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppEntry {
    /// Opaque app identifier (package name, desktop-entry id, ...).
    pub id: String,
    /// Display label.
    pub label: String,
    /// Icon name or path, if the platform reports one.
    pub icon: Option<String>,
}

/// Platform app enumeration boundary.
pub trait PackageDirectory {
    /// All launchable apps, in platform order.
    fn list_launchable_apps(&self) -> Vec<AppEntry>;
}

/// Sort entries case-insensitively by label. Ties keep input order (the
/// underlying sort is stable).
fn sort_by_label(entries: &mut [AppEntry]) {
    entries.sort_by_key(|e| e.label.to_lowercase());
}

/// The curated home-screen list: whitelisted apps only, never the launcher
/// itself, label-sorted.
pub fn visible_apps(
    dir: &dyn PackageDirectory,
    whitelist: &BTreeSet<String>,
    own_id: &str,
) -> Vec<AppEntry> {
    let mut apps: Vec<AppEntry> = dir
        .list_launchable_apps()
        .into_iter()
        .filter(|e| e.id != own_id && whitelist.contains(&e.id))
        .collect();
    sort_by_label(&mut apps);
    apps
}

/// The full installed list for the apps settings screen (own id still
/// excluded), label-sorted.
pub fn all_apps(dir: &dyn PackageDirectory, own_id: &str) -> Vec<AppEntry> {
    let mut apps: Vec<AppEntry> = dir
        .list_launchable_apps()
        .into_iter()
        .filter(|e| e.id != own_id)
        .collect();
    sort_by_label(&mut apps);
    apps
}

/// Free-text filter: an entry matches if its label or id contains `query`
/// as a case-insensitive substring. A blank query returns everything.
pub fn filter_apps(entries: &[AppEntry], query: &str) -> Vec<AppEntry> {
    let query = query.trim();
    if query.is_empty() {
        return entries.to_vec();
    }
    let q = query.to_lowercase();
    entries
        .iter()
        .filter(|e| e.label.to_lowercase().contains(&q) || e.id.to_lowercase().contains(&q))
        .cloned()
        .collect()
}

/// [`PackageDirectory`] backed by XDG desktop entries.
///
/// This is the concrete directory the CLI uses on a desktop host. Parsing is
/// deliberately minimal: only `Name`, `Icon`, and the visibility keys of the
/// `[Desktop Entry]` group are read.
pub struct DesktopEntryDirectory {
    search_dirs: Vec<PathBuf>,
}

impl DesktopEntryDirectory {
    /// Directory list from `$XDG_DATA_HOME` and `$XDG_DATA_DIRS`, with the
    /// usual fallbacks.
    pub fn from_env() -> Self {
        let mut search_dirs = Vec::new();

        if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
            search_dirs.push(PathBuf::from(data_home).join("applications"));
        } else if let Ok(home) = std::env::var("HOME") {
            search_dirs.push(PathBuf::from(home).join(".local/share/applications"));
        }

        let data_dirs = std::env::var("XDG_DATA_DIRS")
            .unwrap_or_else(|_| "/usr/local/share:/usr/share".to_string());
        for dir in data_dirs.split(':').filter(|d| !d.is_empty()) {
            search_dirs.push(PathBuf::from(dir).join("applications"));
        }

        Self { search_dirs }
    }

    pub fn with_dirs(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    /// Parse one .desktop file into an entry. Returns None for entries that
    /// should not be listed (NoDisplay, Hidden, non-Application types).
    fn parse_entry(id: &str, content: &str) -> Option<AppEntry> {
        let mut in_main_group = false;
        let mut name: Option<String> = None;
        let mut icon: Option<String> = None;
        let mut type_ok = true;

        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('[') {
                in_main_group = line == "[Desktop Entry]";
                continue;
            }
            if !in_main_group {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key.trim() {
                "Name" if name.is_none() => name = Some(value.trim().to_string()),
                "Icon" => icon = Some(value.trim().to_string()),
                "NoDisplay" | "Hidden" if value.trim() == "true" => return None,
                "Type" => type_ok = value.trim() == "Application",
                _ => {}
            }
        }

        if !type_ok {
            return None;
        }

        Some(AppEntry {
            id: id.to_string(),
            label: name?,
            icon,
        })
    }
}

impl PackageDirectory for DesktopEntryDirectory {
    fn list_launchable_apps(&self) -> Vec<AppEntry> {
        let mut apps = Vec::new();
        let mut seen = BTreeSet::new();

        for dir in &self.search_dirs {
            let Ok(read_dir) = fs::read_dir(dir) else {
                continue;
            };
            for dir_entry in read_dir.flatten() {
                let path = dir_entry.path();
                if path.extension().is_none_or(|e| e != "desktop") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                // Earlier dirs shadow later ones, per the XDG precedence.
                if !seen.insert(stem.to_string()) {
                    continue;
                }
                let Ok(content) = fs::read_to_string(&path) else {
                    continue;
                };
                if let Some(entry) = Self::parse_entry(stem, &content) {
                    apps.push(entry);
                }
            }
        }

        debug!("Found {} launchable desktop entries", apps.len());
        apps
    }
}
