//! The durable preference store.
//!
//! One TOML record holds all launcher preferences: the app whitelist, the
//! accent color, display toggles, and the hosted-widget id. Setters commit
//! to disk immediately, so reads always reflect the latest committed write
//! within the process and the record survives restarts. Missing keys (or a
//! missing file) fall back to the documented defaults; there is no other
//! versioning or migration logic.
//!
//! Access is single-threaded by contract: the store is only touched from the
//! main thread, so composite read-modify-write operations (whitelist edits)
//! need no locking, only the `&mut self` discipline the API enforces.

use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::theme::{Color, Theme};

/// Sentinel for "no hosted widget". Matches the host platform's invalid id.
pub const INVALID_WIDGET_ID: i64 = -1;

/// Default accent: the classic green.
const DEFAULT_ACCENT: Color = Color::new(0x7f, 0xbf, 0x3f);

/// Starter whitelist: apps that are always useful on a pared-down phone.
const DEFAULT_APPS: &[&str] = &[
    "com.android.dialer",
    "com.google.android.dialer",
    "com.android.contacts",
    "com.google.android.apps.messaging",
    "com.android.mms",
];

/// App grid icon size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IconSize {
    Small,
    #[default]
    Medium,
    Large,
    ExtraLarge,
}

impl fmt::Display for IconSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IconSize::Small => "small",
            IconSize::Medium => "medium",
            IconSize::Large => "large",
            IconSize::ExtraLarge => "extra_large",
        };
        f.write_str(s)
    }
}

impl FromStr for IconSize {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "small" => Ok(IconSize::Small),
            "medium" => Ok(IconSize::Medium),
            "large" => Ok(IconSize::Large),
            "extra_large" => Ok(IconSize::ExtraLarge),
            other => Err(format!(
                "invalid icon size '{}', expected small, medium, large, or extra_large",
                other
            )),
        }
    }
}

/// The persisted preference record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefs {
    /// App identifiers permitted to appear in the curated app list.
    pub whitelist: BTreeSet<String>,

    /// The single user-chosen color all foreground colors derive from.
    pub accent_color: Color,

    pub show_seconds: bool,
    pub use_24_hour: bool,
    pub greyscale_mode: bool,
    pub weather_enabled: bool,
    pub focus_mode_enabled: bool,
    pub show_app_labels: bool,
    pub override_wallpaper: bool,

    pub icon_size: IconSize,

    /// Id of the fully bound and configured hosted widget, or
    /// [`INVALID_WIDGET_ID`]. Only the widget host controller writes this,
    /// and only after a complete bind+configure cycle.
    pub widget_id: i64,

    /// Slot id of an in-flight widget handshake, or [`INVALID_WIDGET_ID`].
    /// Persisted before any external round-trip so a restart mid-handshake
    /// can roll the slot back instead of leaking it.
    pub pending_widget_id: i64,

    /// True until the first successful launch completes.
    pub first_run: bool,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            whitelist: DEFAULT_APPS.iter().map(|s| s.to_string()).collect(),
            accent_color: DEFAULT_ACCENT,
            show_seconds: false,
            use_24_hour: true,
            greyscale_mode: false,
            weather_enabled: false,
            focus_mode_enabled: false,
            show_app_labels: true,
            override_wallpaper: false,
            icon_size: IconSize::default(),
            widget_id: INVALID_WIDGET_ID,
            pending_widget_id: INVALID_WIDGET_ID,
            first_run: true,
        }
    }
}

/// File-backed store over [`Prefs`] with commit-on-set semantics.
pub struct PrefsStore {
    path: PathBuf,
    prefs: Prefs,
}

impl PrefsStore {
    /// Open the store at `explicit_path`, or at the default XDG location.
    ///
    /// A missing file is not an error: the store starts from defaults and
    /// the file is created on the first write.
    pub fn open(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        Self::load(path)
    }

    /// Load the record at `path`, falling back to defaults if it is missing.
    pub fn load(path: PathBuf) -> Result<Self> {
        let prefs = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let prefs: Prefs = toml::from_str(&content)?;
            debug!("Loaded preferences from {}", path.display());
            prefs
        } else {
            info!(
                "No preferences file at {}, starting from defaults",
                path.display()
            );
            Prefs::default()
        };

        Ok(Self { path, prefs })
    }

    /// Default prefs location: `$XDG_CONFIG_HOME/dumbhome/prefs.toml`, then
    /// `~/.config/dumbhome/prefs.toml`.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config).join("dumbhome/prefs.toml"));
        }
        if let Ok(home) = env::var("HOME") {
            return Ok(PathBuf::from(home).join(".config/dumbhome/prefs.toml"));
        }
        Err(Error::NoPrefsDir)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-only view of the whole record.
    pub fn prefs(&self) -> &Prefs {
        &self.prefs
    }

    /// Write the record to disk. Every setter calls this, so a successful
    /// setter return means the value is durable.
    fn commit(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = toml::to_string_pretty(&self.prefs)?;
        fs::write(&self.path, serialized)?;
        Ok(())
    }

    // ── Whitelist ──────────────────────────────────────────────────────

    pub fn whitelist(&self) -> &BTreeSet<String> {
        &self.prefs.whitelist
    }

    pub fn is_whitelisted(&self, id: &str) -> bool {
        self.prefs.whitelist.contains(id)
    }

    /// Add `id` to the whitelist. Idempotent: a no-op (without a disk write)
    /// if already present.
    pub fn include_app(&mut self, id: &str) -> Result<()> {
        if self.prefs.whitelist.insert(id.to_string()) {
            self.commit()?;
        }
        Ok(())
    }

    /// Remove `id` from the whitelist. Idempotent.
    pub fn exclude_app(&mut self, id: &str) -> Result<()> {
        if self.prefs.whitelist.remove(id) {
            self.commit()?;
        }
        Ok(())
    }

    // ── Theme ──────────────────────────────────────────────────────────

    pub fn accent_color(&self) -> Color {
        self.prefs.accent_color
    }

    pub fn set_accent_color(&mut self, color: Color) -> Result<()> {
        self.prefs.accent_color = color;
        self.commit()
    }

    /// The dimmed accent used for secondary text.
    pub fn dim_color(&self) -> Color {
        self.prefs.accent_color.dim()
    }

    pub fn theme(&self) -> Theme {
        Theme::from_accent(self.prefs.accent_color)
    }

    // ── Toggles ────────────────────────────────────────────────────────

    pub fn show_seconds(&self) -> bool {
        self.prefs.show_seconds
    }

    pub fn set_show_seconds(&mut self, value: bool) -> Result<()> {
        self.prefs.show_seconds = value;
        self.commit()
    }

    pub fn use_24_hour(&self) -> bool {
        self.prefs.use_24_hour
    }

    pub fn set_use_24_hour(&mut self, value: bool) -> Result<()> {
        self.prefs.use_24_hour = value;
        self.commit()
    }

    pub fn greyscale_mode(&self) -> bool {
        self.prefs.greyscale_mode
    }

    pub fn set_greyscale_mode(&mut self, value: bool) -> Result<()> {
        self.prefs.greyscale_mode = value;
        self.commit()
    }

    pub fn weather_enabled(&self) -> bool {
        self.prefs.weather_enabled
    }

    pub fn set_weather_enabled(&mut self, value: bool) -> Result<()> {
        self.prefs.weather_enabled = value;
        self.commit()
    }

    pub fn focus_mode_enabled(&self) -> bool {
        self.prefs.focus_mode_enabled
    }

    pub fn set_focus_mode_enabled(&mut self, value: bool) -> Result<()> {
        self.prefs.focus_mode_enabled = value;
        self.commit()
    }

    pub fn show_app_labels(&self) -> bool {
        self.prefs.show_app_labels
    }

    pub fn set_show_app_labels(&mut self, value: bool) -> Result<()> {
        self.prefs.show_app_labels = value;
        self.commit()
    }

    pub fn override_wallpaper(&self) -> bool {
        self.prefs.override_wallpaper
    }

    pub fn set_override_wallpaper(&mut self, value: bool) -> Result<()> {
        self.prefs.override_wallpaper = value;
        self.commit()
    }

    pub fn icon_size(&self) -> IconSize {
        self.prefs.icon_size
    }

    pub fn set_icon_size(&mut self, value: IconSize) -> Result<()> {
        self.prefs.icon_size = value;
        self.commit()
    }

    // ── Widget handle ──────────────────────────────────────────────────

    pub fn widget_id(&self) -> i64 {
        self.prefs.widget_id
    }

    pub fn set_widget_id(&mut self, id: i64) -> Result<()> {
        self.prefs.widget_id = id;
        self.commit()
    }

    pub fn has_widget(&self) -> bool {
        self.prefs.widget_id != INVALID_WIDGET_ID
    }

    pub fn pending_widget_id(&self) -> i64 {
        self.prefs.pending_widget_id
    }

    pub fn set_pending_widget_id(&mut self, id: i64) -> Result<()> {
        self.prefs.pending_widget_id = id;
        self.commit()
    }

    // ── First run ──────────────────────────────────────────────────────

    pub fn first_run(&self) -> bool {
        self.prefs.first_run
    }

    pub fn set_first_run(&mut self, value: bool) -> Result<()> {
        self.prefs.first_run = value;
        self.commit()
    }

    // ── Generic access for the CLI ─────────────────────────────────────

    /// Set a preference by its record key name, parsing `value`.
    ///
    /// Only user-facing keys are settable this way; the widget ids are owned
    /// by the widget host controller.
    pub fn set_by_key(&mut self, key: &str, value: &str) -> Result<()> {
        fn parse_bool(key: &str, value: &str) -> Result<bool> {
            value.parse::<bool>().map_err(|_| Error::InvalidValue {
                key: key.to_string(),
                reason: format!("'{}' is not a boolean (true/false)", value),
            })
        }

        match key {
            "accent_color" => {
                let color = Color::parse_hex(value).ok_or_else(|| Error::InvalidValue {
                    key: key.to_string(),
                    reason: format!("'{}' is not a hex color like #7fbf3f", value),
                })?;
                self.set_accent_color(color)
            }
            "icon_size" => {
                let size = value.parse::<IconSize>().map_err(|reason| Error::InvalidValue {
                    key: key.to_string(),
                    reason,
                })?;
                self.set_icon_size(size)
            }
            "show_seconds" => {
                let v = parse_bool(key, value)?;
                self.set_show_seconds(v)
            }
            "use_24_hour" => {
                let v = parse_bool(key, value)?;
                self.set_use_24_hour(v)
            }
            "show_app_labels" => {
                let v = parse_bool(key, value)?;
                self.set_show_app_labels(v)
            }
            other => Err(Error::InvalidValue {
                key: other.to_string(),
                reason: "unknown or non-settable preference key".to_string(),
            }),
        }
    }

    /// Human-readable dump of the record for `prefs show`.
    pub fn summary(&self) -> String {
        let p = &self.prefs;
        let mut out = String::new();
        out.push_str("Preferences:\n");
        out.push_str(&format!("  accent_color: {}\n", p.accent_color));
        out.push_str(&format!("  dim_color: {}\n", self.dim_color()));
        out.push_str(&format!("  show_seconds: {}\n", p.show_seconds));
        out.push_str(&format!("  use_24_hour: {}\n", p.use_24_hour));
        out.push_str(&format!("  greyscale_mode: {}\n", p.greyscale_mode));
        out.push_str(&format!("  weather_enabled: {}\n", p.weather_enabled));
        out.push_str(&format!("  focus_mode_enabled: {}\n", p.focus_mode_enabled));
        out.push_str(&format!("  show_app_labels: {}\n", p.show_app_labels));
        out.push_str(&format!("  override_wallpaper: {}\n", p.override_wallpaper));
        out.push_str(&format!("  icon_size: {}\n", p.icon_size));
        if p.widget_id == INVALID_WIDGET_ID {
            out.push_str("  widget: none\n");
        } else {
            out.push_str(&format!("  widget: slot {}\n", p.widget_id));
        }
        out.push_str(&format!("  whitelist ({} apps):\n", p.whitelist.len()));
        for id in &p.whitelist {
            out.push_str(&format!("    {}\n", id));
        }
        out
    }
}
