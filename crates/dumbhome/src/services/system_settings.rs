//! System-settings toggles.
//!
//! Greyscale, focus mode, and the wallpaper override each pair a persisted
//! preference with a best-effort write into the host system. The host writes
//! can fail (missing permission, unsupported compositor), so each toggle has
//! an explicit failure policy:
//!
//! - greyscale only commits when the host accepted the write; a refused
//!   write leaves the pref and the control at the prior state.
//! - focus mode only commits on enable if the notification filter actually
//!   engaged; disabling always commits so the user can never get stuck in it.
//! - the wallpaper override only commits on enable if the wallpaper write
//!   succeeded; disabling always commits.

use dumbhome_core::{PrefsStore, Result};
use tracing::{debug, warn};

/// Host-system write boundary. Each call returns whether the write took
/// effect.
pub trait SystemSettingsWriter {
    fn set_greyscale(&mut self, enabled: bool) -> bool;
    fn set_notification_filter(&mut self, enabled: bool) -> bool;
    fn set_wallpaper_black(&mut self) -> bool;
    fn restore_wallpaper(&mut self) -> bool;
}

/// A writer for hosts with no settings backend. Every write reports
/// failure, which exercises the same paths as a denied permission.
pub struct NullSettingsWriter;

impl SystemSettingsWriter for NullSettingsWriter {
    fn set_greyscale(&mut self, _enabled: bool) -> bool {
        false
    }
    fn set_notification_filter(&mut self, _enabled: bool) -> bool {
        false
    }
    fn set_wallpaper_black(&mut self) -> bool {
        false
    }
    fn restore_wallpaper(&mut self) -> bool {
        false
    }
}

/// Toggle greyscale. Returns the effective state: on a refused host write
/// the preference is left untouched and the prior state comes back, so the
/// control snaps back to reality.
pub fn set_greyscale<W: SystemSettingsWriter>(
    writer: &mut W,
    prefs: &mut PrefsStore,
    enabled: bool,
) -> Result<bool> {
    if !writer.set_greyscale(enabled) {
        warn!("Greyscale write refused, keeping previous state");
        return Ok(prefs.greyscale_mode());
    }
    prefs.set_greyscale_mode(enabled)?;
    Ok(enabled)
}

/// Toggle focus mode. Returns the effective state after the attempt.
pub fn set_focus_mode<W: SystemSettingsWriter>(
    writer: &mut W,
    prefs: &mut PrefsStore,
    enabled: bool,
) -> Result<bool> {
    if enabled {
        if !writer.set_notification_filter(true) {
            warn!("Notification filter refused, leaving focus mode off");
            return Ok(false);
        }
        prefs.set_focus_mode_enabled(true)?;
        Ok(true)
    } else {
        // Disabling must always stick, even if the filter write fails.
        if !writer.set_notification_filter(false) {
            warn!("Notification filter write failed while leaving focus mode");
        }
        prefs.set_focus_mode_enabled(false)?;
        Ok(false)
    }
}

/// Toggle the black-wallpaper override. Returns the effective state.
pub fn set_wallpaper_override<W: SystemSettingsWriter>(
    writer: &mut W,
    prefs: &mut PrefsStore,
    enabled: bool,
) -> Result<bool> {
    if enabled {
        if !writer.set_wallpaper_black() {
            warn!("Wallpaper write refused, override stays off");
            return Ok(false);
        }
        prefs.set_override_wallpaper(true)?;
        Ok(true)
    } else {
        if !writer.restore_wallpaper() {
            warn!("Wallpaper restore failed");
        }
        prefs.set_override_wallpaper(false)?;
        Ok(false)
    }
}

/// Re-assert focus mode and the wallpaper override against the host. The
/// launcher calls this on every resume; writes the host already honors are
/// harmless repeats. Greyscale is not re-asserted: its pref never commits
/// without a successful host write, so the two cannot drift apart.
pub fn apply_on_resume<W: SystemSettingsWriter>(writer: &mut W, prefs: &PrefsStore) {
    if prefs.focus_mode_enabled() && !writer.set_notification_filter(true) {
        warn!("Could not re-assert focus mode on resume");
    }
    if prefs.override_wallpaper() && !writer.set_wallpaper_black() {
        warn!("Could not re-assert wallpaper override on resume");
    }
    debug!("Re-applied system toggles from preferences");
}
