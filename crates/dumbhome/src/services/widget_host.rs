//! Widget hosting lifecycle.
//!
//! Embedding a third-party widget is a multi-step handshake with the host
//! platform: allocate a slot, bind a provider to it (possibly after an
//! explicit user-permission round-trip), run the provider's own
//! configuration flow, then persist the slot id. Every step can fail or be
//! cancelled, and a slot that is allocated but never persisted is a resource
//! leak in the host — so every path out of the handshake either ends with a
//! persisted id or deallocates the slot.
//!
//! The external round-trips (permission prompt, configuration activity) are
//! out-of-process: the controller returns an `Await*` step and the embedder
//! feeds the outcome back via `resume_bind` / `resume_configure`. The
//! in-flight slot id is persisted (`pending_widget_id`) before any round
//! trip starts, so a process death mid-handshake is resolved on the next
//! `restore()` by rolling the slot back rather than leaking it.

use dumbhome_core::prefs::{INVALID_WIDGET_ID, PrefsStore};
use tracing::{debug, info, warn};

/// Host-side slot identifier.
pub type SlotId = i64;

/// An external component able to render into a hosted widget slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRef {
    /// Component identifier.
    pub id: String,
    /// Human-readable provider name.
    pub label: String,
    /// Owning package identifier.
    pub package: String,
    /// Whether the provider declares its own configuration step.
    pub needs_configuration: bool,
}

/// The platform widget host boundary.
pub trait WidgetHost {
    /// Reserve a new slot. Allocation itself cannot fail; the slot is
    /// worthless until a provider is bound.
    fn allocate_slot(&mut self) -> SlotId;

    /// Try to bind `provider` to `slot` without user interaction. `false`
    /// means the platform requires an explicit permission grant.
    fn bind_direct(&mut self, slot: SlotId, provider: &ProviderRef) -> bool;

    /// Release a slot and whatever is bound to it.
    fn deallocate_slot(&mut self, slot: SlotId);

    /// Live provider info for a slot, or None if the provider is gone
    /// (uninstalled, permission revoked).
    fn resolve_provider(&self, slot: SlotId) -> Option<ProviderRef>;
}

/// Where the handshake stands after a controller call returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Waiting on the user/OS permission prompt for `bind`.
    AwaitBindPermission(SlotId),
    /// Waiting on the provider's configuration flow.
    AwaitConfiguration(SlotId),
    /// Handshake complete; the slot id is persisted.
    Active(SlotId),
    /// The handshake was denied or cancelled; the slot was released and the
    /// persisted widget id is unchanged.
    RolledBack,
}

/// Result of a foreground-resume restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// No widget configured.
    NoWidget,
    /// The persisted widget resolved against the live host.
    Active(ProviderRef),
    /// The provider disappeared; the handle was removed and the feature
    /// flag cleared. Show the empty state, not a stale view.
    Removed,
}

#[derive(Debug, thiserror::Error)]
pub enum WidgetHostError {
    #[error(transparent)]
    Prefs(#[from] dumbhome_core::Error),

    /// A resume event arrived with no matching pending step.
    #[error("no pending {0} step to resume")]
    UnexpectedResume(&'static str),

    /// A new selection was started while a handshake is still in flight.
    #[error("a widget handshake is already in progress")]
    HandshakeInProgress,
}

pub type Result<T> = std::result::Result<T, WidgetHostError>;

/// In-memory pending step. Mirrors `pending_widget_id` in the prefs record,
/// plus the data the resume handler needs.
#[derive(Debug)]
enum Pending {
    None,
    BindPermission { slot: SlotId, provider: ProviderRef },
    Configuration { slot: SlotId },
}

/// Drives the widget handshake over a [`WidgetHost`].
///
/// All calls happen on the main thread; the controller owns the sequencing
/// discipline (never two handshakes at once, never an allocated slot left
/// behind).
pub struct WidgetHostController<H: WidgetHost> {
    host: H,
    pending: Pending,
}

/// Provider names that suggest a weather widget. Best-effort heuristic.
const WEATHER_HINTS: &[&str] = &["weather", "forecast"];

/// Pre-filter `providers` to likely weather widgets by substring match on
/// label, package, and id. Falls back to the full list when the heuristic
/// matches nothing.
pub fn weather_candidates(providers: &[ProviderRef]) -> Vec<ProviderRef> {
    let matches: Vec<ProviderRef> = providers
        .iter()
        .filter(|p| {
            WEATHER_HINTS.iter().any(|hint| {
                p.label.to_lowercase().contains(hint)
                    || p.package.to_lowercase().contains(hint)
                    || p.id.to_lowercase().contains(hint)
            })
        })
        .cloned()
        .collect();

    if matches.is_empty() {
        providers.to_vec()
    } else {
        matches
    }
}

impl<H: WidgetHost> WidgetHostController<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            pending: Pending::None,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// True while a handshake awaits an external resume event.
    pub fn handshake_in_flight(&self) -> bool {
        !matches!(self.pending, Pending::None)
    }

    /// Start the handshake for `provider`.
    ///
    /// If a widget is already active its slot is released and its persisted
    /// id cleared *before* the new slot is allocated, so at most one live
    /// handle ever exists.
    pub fn select(&mut self, provider: ProviderRef, prefs: &mut PrefsStore) -> Result<Step> {
        if self.handshake_in_flight() {
            return Err(WidgetHostError::HandshakeInProgress);
        }

        // Release the previous widget first.
        self.remove(prefs)?;

        let slot = self.host.allocate_slot();
        debug!(slot, provider = %provider.id, "Allocated widget slot");

        // Persist the pending marker before any step that can dead-end in
        // another process; a crash from here on is recoverable by restore().
        if let Err(e) = prefs.set_pending_widget_id(slot) {
            self.host.deallocate_slot(slot);
            return Err(e.into());
        }

        if self.host.bind_direct(slot, &provider) {
            debug!(slot, "Direct bind succeeded");
            self.after_bound(slot, provider, prefs)
        } else {
            info!(slot, "Direct bind denied, escalating to permission request");
            self.pending = Pending::BindPermission { slot, provider };
            Ok(Step::AwaitBindPermission(slot))
        }
    }

    /// Feed back the outcome of the bind-permission prompt.
    ///
    /// Denial rolls the slot back and leaves the weather feature flag
    /// untouched (i.e. unset).
    pub fn resume_bind(&mut self, granted: bool, prefs: &mut PrefsStore) -> Result<Step> {
        match std::mem::replace(&mut self.pending, Pending::None) {
            Pending::BindPermission { slot, provider } => {
                if granted {
                    debug!(slot, "Bind permission granted");
                    self.after_bound(slot, provider, prefs)
                } else {
                    info!(slot, "Bind permission denied, releasing slot");
                    self.rollback(slot, prefs)?;
                    Ok(Step::RolledBack)
                }
            }
            other => {
                self.pending = other;
                Err(WidgetHostError::UnexpectedResume("bind"))
            }
        }
    }

    /// Feed back the outcome of the provider's configuration flow.
    pub fn resume_configure(&mut self, confirmed: bool, prefs: &mut PrefsStore) -> Result<Step> {
        match std::mem::replace(&mut self.pending, Pending::None) {
            Pending::Configuration { slot } => {
                if confirmed {
                    debug!(slot, "Provider configuration confirmed");
                    self.persist(slot, prefs)
                } else {
                    info!(slot, "Provider configuration cancelled, releasing slot");
                    self.rollback(slot, prefs)?;
                    Ok(Step::RolledBack)
                }
            }
            other => {
                self.pending = other;
                Err(WidgetHostError::UnexpectedResume("configure"))
            }
        }
    }

    /// Release the active widget, if any. No-op when none is persisted.
    pub fn remove(&mut self, prefs: &mut PrefsStore) -> Result<()> {
        let id = prefs.widget_id();
        if id == INVALID_WIDGET_ID {
            return Ok(());
        }
        info!(slot = id, "Removing hosted widget");
        self.host.deallocate_slot(id);
        prefs.set_widget_id(INVALID_WIDGET_ID)?;
        Ok(())
    }

    /// Re-resolve persisted state against the live host on foreground
    /// resume.
    ///
    /// First resolves any pending marker left by a process that died
    /// mid-handshake (rollback, never completion: the external outcome was
    /// lost with the process). Then checks the active handle still has a
    /// live provider; if not, removes it and clears the feature flag.
    pub fn restore(&mut self, prefs: &mut PrefsStore) -> Result<RestoreOutcome> {
        let stale = prefs.pending_widget_id();
        if stale != INVALID_WIDGET_ID && !self.handshake_in_flight() {
            warn!(slot = stale, "Rolling back handshake interrupted by restart");
            self.host.deallocate_slot(stale);
            prefs.set_pending_widget_id(INVALID_WIDGET_ID)?;
        }

        let id = prefs.widget_id();
        if id == INVALID_WIDGET_ID {
            return Ok(RestoreOutcome::NoWidget);
        }

        match self.host.resolve_provider(id) {
            Some(provider) => Ok(RestoreOutcome::Active(provider)),
            None => {
                warn!(slot = id, "Widget provider no longer exists, removing");
                self.remove(prefs)?;
                prefs.set_weather_enabled(false)?;
                Ok(RestoreOutcome::Removed)
            }
        }
    }

    /// A provider is bound to `slot`: either run its configuration flow or
    /// persist immediately.
    fn after_bound(
        &mut self,
        slot: SlotId,
        provider: ProviderRef,
        prefs: &mut PrefsStore,
    ) -> Result<Step> {
        if provider.needs_configuration {
            self.pending = Pending::Configuration { slot };
            Ok(Step::AwaitConfiguration(slot))
        } else {
            self.persist(slot, prefs)
        }
    }

    /// Final step: record the slot id, clear the pending marker, enable the
    /// feature the handshake was started for.
    fn persist(&mut self, slot: SlotId, prefs: &mut PrefsStore) -> Result<Step> {
        if let Err(e) = prefs.set_widget_id(slot) {
            // The write failed, so the handle was never adopted; release the
            // slot to keep the no-orphan invariant.
            self.rollback(slot, prefs)?;
            return Err(e.into());
        }
        prefs.set_pending_widget_id(INVALID_WIDGET_ID)?;
        prefs.set_weather_enabled(true)?;
        info!(slot, "Widget handshake complete");
        Ok(Step::Active(slot))
    }

    /// Release `slot` and clear the pending marker.
    fn rollback(&mut self, slot: SlotId, prefs: &mut PrefsStore) -> Result<()> {
        self.host.deallocate_slot(slot);
        prefs.set_pending_widget_id(INVALID_WIDGET_ID)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    /// Scripted host: counts allocations, records what is live, and lets a
    /// test control direct-bind results and provider resolution.
    struct FakeHost {
        next_slot: SlotId,
        allocated: BTreeMap<SlotId, Option<ProviderRef>>,
        direct_bind_ok: bool,
        total_allocations: usize,
    }

    impl FakeHost {
        fn new(direct_bind_ok: bool) -> Self {
            Self {
                next_slot: 100,
                allocated: BTreeMap::new(),
                direct_bind_ok,
                total_allocations: 0,
            }
        }

        fn live_slots(&self) -> Vec<SlotId> {
            self.allocated.keys().copied().collect()
        }

        fn drop_provider(&mut self, slot: SlotId) {
            if let Some(bound) = self.allocated.get_mut(&slot) {
                *bound = None;
            }
        }
    }

    impl WidgetHost for FakeHost {
        fn allocate_slot(&mut self) -> SlotId {
            let slot = self.next_slot;
            self.next_slot += 1;
            self.total_allocations += 1;
            self.allocated.insert(slot, None);
            slot
        }

        fn bind_direct(&mut self, slot: SlotId, provider: &ProviderRef) -> bool {
            if self.direct_bind_ok {
                self.allocated.insert(slot, Some(provider.clone()));
            }
            self.direct_bind_ok
        }

        fn deallocate_slot(&mut self, slot: SlotId) {
            self.allocated.remove(&slot);
        }

        fn resolve_provider(&self, slot: SlotId) -> Option<ProviderRef> {
            self.allocated.get(&slot).cloned().flatten()
        }
    }

    fn provider(id: &str, needs_configuration: bool) -> ProviderRef {
        ProviderRef {
            id: id.to_string(),
            label: id.to_string(),
            package: format!("com.example.{}", id),
            needs_configuration,
        }
    }

    fn temp_prefs() -> (tempfile::TempDir, PrefsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PrefsStore::load(dir.path().join("prefs.toml")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_direct_bind_no_config_ends_active() {
        let (_dir, mut prefs) = temp_prefs();
        let mut ctl = WidgetHostController::new(FakeHost::new(true));

        let step = ctl.select(provider("w", false), &mut prefs).unwrap();
        let Step::Active(slot) = step else {
            panic!("expected Active, got {:?}", step);
        };

        assert_eq!(prefs.widget_id(), slot);
        assert_eq!(prefs.pending_widget_id(), INVALID_WIDGET_ID);
        assert!(prefs.weather_enabled());
        assert_eq!(ctl.host().total_allocations, 1);
        assert_eq!(ctl.host().live_slots(), vec![slot]);
    }

    #[test]
    fn test_bind_denied_rolls_back() {
        let (_dir, mut prefs) = temp_prefs();
        let mut ctl = WidgetHostController::new(FakeHost::new(false));

        let step = ctl.select(provider("w", false), &mut prefs).unwrap();
        assert!(matches!(step, Step::AwaitBindPermission(_)));
        assert_ne!(prefs.pending_widget_id(), INVALID_WIDGET_ID);

        let step = ctl.resume_bind(false, &mut prefs).unwrap();
        assert_eq!(step, Step::RolledBack);
        assert_eq!(prefs.widget_id(), INVALID_WIDGET_ID);
        assert_eq!(prefs.pending_widget_id(), INVALID_WIDGET_ID);
        assert!(!prefs.weather_enabled());
        assert!(ctl.host().live_slots().is_empty());
    }

    #[test]
    fn test_bind_granted_then_configure_confirmed() {
        let (_dir, mut prefs) = temp_prefs();
        let mut ctl = WidgetHostController::new(FakeHost::new(false));

        ctl.select(provider("w", true), &mut prefs).unwrap();
        let step = ctl.resume_bind(true, &mut prefs).unwrap();
        let Step::AwaitConfiguration(slot) = step else {
            panic!("expected AwaitConfiguration, got {:?}", step);
        };

        let step = ctl.resume_configure(true, &mut prefs).unwrap();
        assert_eq!(step, Step::Active(slot));
        assert_eq!(prefs.widget_id(), slot);
        assert_eq!(ctl.host().total_allocations, 1);
    }

    #[test]
    fn test_configure_cancelled_rolls_back() {
        let (_dir, mut prefs) = temp_prefs();
        let mut ctl = WidgetHostController::new(FakeHost::new(true));

        let step = ctl.select(provider("w", true), &mut prefs).unwrap();
        assert!(matches!(step, Step::AwaitConfiguration(_)));

        let step = ctl.resume_configure(false, &mut prefs).unwrap();
        assert_eq!(step, Step::RolledBack);
        assert_eq!(prefs.widget_id(), INVALID_WIDGET_ID);
        assert_eq!(prefs.pending_widget_id(), INVALID_WIDGET_ID);
        assert!(ctl.host().live_slots().is_empty());
    }

    #[test]
    fn test_every_path_ends_active_or_clean_idle() {
        // {direct bind ok?, permission granted?, needs config?, confirmed?}
        for direct in [true, false] {
            for granted in [true, false] {
                for needs_config in [true, false] {
                    for confirmed in [true, false] {
                        let (_dir, mut prefs) = temp_prefs();
                        let mut ctl = WidgetHostController::new(FakeHost::new(direct));
                        let before = prefs.widget_id();

                        let mut step =
                            ctl.select(provider("w", needs_config), &mut prefs).unwrap();
                        if let Step::AwaitBindPermission(_) = step {
                            step = ctl.resume_bind(granted, &mut prefs).unwrap();
                        }
                        if let Step::AwaitConfiguration(_) = step {
                            step = ctl.resume_configure(confirmed, &mut prefs).unwrap();
                        }

                        match step {
                            Step::Active(slot) => {
                                assert_eq!(prefs.widget_id(), slot);
                                assert_eq!(ctl.host().live_slots(), vec![slot]);
                            }
                            Step::RolledBack => {
                                assert_eq!(prefs.widget_id(), before);
                                assert!(ctl.host().live_slots().is_empty());
                            }
                            other => panic!("handshake did not settle: {:?}", other),
                        }
                        // Either way, no pending marker survives.
                        assert_eq!(prefs.pending_widget_id(), INVALID_WIDGET_ID);
                        assert!(!ctl.handshake_in_flight());
                    }
                }
            }
        }
    }

    #[test]
    fn test_reselect_releases_old_handle_first() {
        let (_dir, mut prefs) = temp_prefs();
        let mut ctl = WidgetHostController::new(FakeHost::new(true));

        let Step::Active(first) = ctl.select(provider("a", false), &mut prefs).unwrap() else {
            panic!("first select did not complete");
        };
        let Step::Active(second) = ctl.select(provider("b", false), &mut prefs).unwrap() else {
            panic!("second select did not complete");
        };

        assert_ne!(first, second);
        assert_eq!(prefs.widget_id(), second);
        // Exactly the new slot is live; the old one was deallocated.
        assert_eq!(ctl.host().live_slots(), vec![second]);
    }

    #[test]
    fn test_select_while_pending_is_rejected() {
        let (_dir, mut prefs) = temp_prefs();
        let mut ctl = WidgetHostController::new(FakeHost::new(false));

        ctl.select(provider("a", false), &mut prefs).unwrap();
        let err = ctl.select(provider("b", false), &mut prefs).unwrap_err();
        assert!(matches!(err, WidgetHostError::HandshakeInProgress));

        // The original handshake is still resumable.
        let step = ctl.resume_bind(true, &mut prefs).unwrap();
        assert!(matches!(step, Step::Active(_)));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (_dir, mut prefs) = temp_prefs();
        let mut ctl = WidgetHostController::new(FakeHost::new(true));

        ctl.remove(&mut prefs).unwrap();
        assert_eq!(prefs.widget_id(), INVALID_WIDGET_ID);

        ctl.select(provider("w", false), &mut prefs).unwrap();
        ctl.remove(&mut prefs).unwrap();
        ctl.remove(&mut prefs).unwrap();
        assert_eq!(prefs.widget_id(), INVALID_WIDGET_ID);
        assert!(ctl.host().live_slots().is_empty());
    }

    #[test]
    fn test_restore_rolls_back_interrupted_handshake() {
        let (_dir, mut prefs) = temp_prefs();

        // A previous process died between allocation and completion.
        let mut host = FakeHost::new(true);
        let orphan = host.allocate_slot();
        prefs.set_pending_widget_id(orphan).unwrap();

        let mut ctl = WidgetHostController::new(host);
        let outcome = ctl.restore(&mut prefs).unwrap();

        assert_eq!(outcome, RestoreOutcome::NoWidget);
        assert_eq!(prefs.pending_widget_id(), INVALID_WIDGET_ID);
        assert!(ctl.host().live_slots().is_empty());
    }

    #[test]
    fn test_restore_with_live_provider() {
        let (_dir, mut prefs) = temp_prefs();
        let mut ctl = WidgetHostController::new(FakeHost::new(true));

        let Step::Active(slot) = ctl.select(provider("w", false), &mut prefs).unwrap() else {
            panic!("select did not complete");
        };

        let outcome = ctl.restore(&mut prefs).unwrap();
        assert_eq!(outcome, RestoreOutcome::Active(provider("w", false)));
        assert_eq!(prefs.widget_id(), slot);
    }

    #[test]
    fn test_restore_removes_uninstalled_provider() {
        let (_dir, mut prefs) = temp_prefs();
        let mut ctl = WidgetHostController::new(FakeHost::new(true));

        let Step::Active(slot) = ctl.select(provider("w", false), &mut prefs).unwrap() else {
            panic!("select did not complete");
        };
        assert!(prefs.weather_enabled());

        ctl.host.drop_provider(slot);
        let outcome = ctl.restore(&mut prefs).unwrap();

        assert_eq!(outcome, RestoreOutcome::Removed);
        assert_eq!(prefs.widget_id(), INVALID_WIDGET_ID);
        assert!(!prefs.weather_enabled());
        assert!(ctl.host().live_slots().is_empty());
    }

    #[test]
    fn test_unexpected_resume_is_an_error() {
        let (_dir, mut prefs) = temp_prefs();
        let mut ctl = WidgetHostController::new(FakeHost::new(true));

        assert!(matches!(
            ctl.resume_bind(true, &mut prefs),
            Err(WidgetHostError::UnexpectedResume("bind"))
        ));
        assert!(matches!(
            ctl.resume_configure(true, &mut prefs),
            Err(WidgetHostError::UnexpectedResume("configure"))
        ));

        // A configure resume during a bind wait must not consume the wait.
        let mut ctl = WidgetHostController::new(FakeHost::new(false));
        ctl.select(provider("w", false), &mut prefs).unwrap();
        assert!(ctl.resume_configure(true, &mut prefs).is_err());
        assert!(ctl.handshake_in_flight());
    }

    #[test]
    fn test_weather_candidates_heuristic() {
        let providers = vec![
            provider("clock", false),
            ProviderRef {
                id: "widget1".to_string(),
                label: "Daily Forecast".to_string(),
                package: "com.example.skies".to_string(),
                needs_configuration: false,
            },
            ProviderRef {
                id: "widget2".to_string(),
                label: "Tiles".to_string(),
                package: "org.openweather.tiles".to_string(),
                needs_configuration: false,
            },
        ];

        let filtered = weather_candidates(&providers);
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|p| p.id != "clock"));
    }

    #[test]
    fn test_weather_candidates_falls_back_to_full_list() {
        let providers = vec![provider("clock", false), provider("notes", false)];
        assert_eq!(weather_candidates(&providers), providers);
    }
}
