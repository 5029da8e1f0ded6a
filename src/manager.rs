//! Consent Manager - the main public API for Consentgate.
//!
//! The `ConsentManager` is what the UI layer talks to:
//! - Banner state and user decisions
//! - Cross-subdomain reconciliation on visibility regain or storage change
//! - Driving the analytics gate and reloading when a revocation needs it

use crate::cache::jar::BrowserContext;
use crate::cache::store::ConsentStore;
use crate::client::http::VpnChecker;
use crate::clock::{Clock, SystemClock};
use crate::config::ConsentConfig;
use crate::meter::events::AnalyticsEvent;
use crate::observe::ErrorReporter;
use crate::policy::access::{AccessDecision, VpnGuard};
use crate::policy::gate::{AnalyticsGate, GateOutcome};
use crate::protocol::models::{ConsentRecord, Selection, ServiceId};
use crate::state::{BannerView, ConsentChange, ConsentState, SubscriptionId, Visibility};
use crate::ConsentError;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Page-level side effects the core cannot perform itself.
pub trait PageControl: Send + Sync {
    /// Reload the current page.
    fn reload(&self);
}

/// Page control that does nothing (server-side rendering, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPage;

impl PageControl for NoopPage {
    fn reload(&self) {}
}

/// Page control that counts reload requests.
#[derive(Debug, Default)]
pub struct RecordingPage {
    reloads: AtomicUsize,
}

impl RecordingPage {
    /// Fresh counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// How many reloads were requested.
    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl PageControl for RecordingPage {
    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

/// Main consent manager for Consentgate.
///
/// Create one per page load and route every banner interaction and
/// page-visibility event through it.
pub struct ConsentManager {
    config: ConsentConfig,
    clock: Arc<dyn Clock>,
    state: ConsentState,
    gate: AnalyticsGate,
    page: Arc<dyn PageControl>,
    vpn_guard: Option<VpnGuard>,
    created_at: DateTime<Utc>,
}

impl ConsentManager {
    /// Create a consent manager for a page running in `context`.
    ///
    /// Reads (and if needed migrates) the stored decision and bootstraps
    /// `gate` from it.
    ///
    /// # Errors
    /// Returns an error if configuration validation fails.
    pub fn new(
        config: ConsentConfig,
        context: BrowserContext,
        gate: AnalyticsGate,
        page: Arc<dyn PageControl>,
    ) -> Result<Self, ConsentError> {
        config.validate()?;
        let store = ConsentStore::new(config.clone(), context);
        Ok(Self::assemble(config, store, gate, page, Arc::new(SystemClock)))
    }

    /// Create a consent manager with no document (server-side rendering).
    pub fn detached(
        config: ConsentConfig,
        gate: AnalyticsGate,
        page: Arc<dyn PageControl>,
    ) -> Result<Self, ConsentError> {
        config.validate()?;
        let store = ConsentStore::detached(config.clone());
        Ok(Self::assemble(config, store, gate, page, Arc::new(SystemClock)))
    }

    /// Create a consent manager with a custom clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn new_with_clock(
        config: ConsentConfig,
        context: BrowserContext,
        gate: AnalyticsGate,
        page: Arc<dyn PageControl>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConsentError> {
        config.validate()?;
        let store = ConsentStore::new(config.clone(), context);
        Ok(Self::assemble(config, store, gate, page, clock))
    }

    fn assemble(
        config: ConsentConfig,
        store: ConsentStore,
        mut gate: AnalyticsGate,
        page: Arc<dyn PageControl>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = ConsentState::new(store);
        gate.bootstrap(state.consent().as_ref());
        let created_at = clock.now_utc();
        Self {
            config,
            clock,
            state,
            gate,
            page,
            vpn_guard: None,
            created_at,
        }
    }

    /// The current decision; `None` while pending.
    pub fn get_consent(&self) -> Option<ConsentRecord> {
        self.state.consent()
    }

    /// Whether the banner is open.
    pub fn is_banner_visible(&self) -> bool {
        self.state.banner_visible()
    }

    /// The banner's current screen.
    pub fn banner_view(&self) -> BannerView {
        self.state.banner_view()
    }

    /// The manage view's unsaved toggles.
    pub fn toggles(&self) -> ConsentRecord {
        self.state.toggles()
    }

    /// Grant every service.
    pub fn accept_all(&mut self) {
        self.commit(ConsentRecord::all(true));
    }

    /// Deny every service.
    pub fn reject_all(&mut self) {
        self.commit(ConsentRecord::all(false));
    }

    /// Record a partial selection; services not mentioned are denied.
    pub fn save_selection(&mut self, selection: Selection) {
        self.commit(selection.into_record());
    }

    /// Flip one unsaved toggle in the manage view.
    pub fn toggle_service(&mut self, service: ServiceId) {
        self.state.toggle(service);
    }

    /// Record the manage view's toggles.
    pub fn save_toggles(&mut self) {
        self.commit(self.state.toggles());
    }

    /// Switch to the per-service view.
    pub fn open_manage_view(&mut self) {
        self.state.set_banner_view(BannerView::Manage);
    }

    /// Back to the default view.
    pub fn close_manage_view(&mut self) {
        self.state.set_banner_view(BannerView::Default);
    }

    /// Re-open the banner (footer "Cookie settings" link).
    pub fn show_banner(&mut self) {
        let change = self.state.show_banner();
        self.sync_gate(change);
    }

    /// Close the banner without deciding.
    pub fn hide_banner(&mut self) {
        self.state.hide_banner();
    }

    /// Page `visibilitychange`. Regaining visibility re-reads the cookie.
    pub fn on_visibility_change(&mut self, visibility: Visibility) -> Option<ConsentChange> {
        if visibility != Visibility::Visible {
            return None;
        }
        self.reconcile()
    }

    /// A storage-change notification for `key`; `None` means storage was
    /// cleared wholesale.
    pub fn on_storage_changed(&mut self, key: Option<&str>) -> Option<ConsentChange> {
        let relevant = match key {
            None => true,
            Some(key) => {
                key == self.config.cookie_name
                    || key == self.config.legacy_key
                    || key == self.config.legacy_key_v2
            }
        };
        if !relevant {
            return None;
        }
        self.reconcile()
    }

    /// Receive every future [`ConsentChange`].
    pub fn subscribe(&mut self, listener: impl FnMut(&ConsentChange) + 'static) -> SubscriptionId {
        self.state.subscribe(listener)
    }

    /// Stop notifications for `id`.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.state.unsubscribe(id)
    }

    /// Send an analytics event through `service`, if consent lets it run.
    pub fn capture(&mut self, service: ServiceId, event: &AnalyticsEvent) -> bool {
        self.gate.capture(service, event)
    }

    /// Install the VPN / region check, using the configured
    /// `vpn_failure_policy`. Replaces any earlier check.
    pub fn with_vpn_check(
        mut self,
        checker: Box<dyn VpnChecker>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        self.vpn_guard = Some(VpnGuard::new(
            checker,
            reporter,
            self.config.vpn_failure_policy,
        ));
        self
    }

    /// Run the VPN / region check once, tracking its outcome through the
    /// gate. `None` when no check is installed.
    pub fn check_access(&mut self) -> Option<AccessDecision> {
        let guard = self.vpn_guard.as_ref()?;
        Some(guard.check(&mut self.gate).clone())
    }

    /// Delete the stored decision. Running integrations are left as they
    /// are until the next page load.
    pub fn clear_consent(&mut self) -> Option<ConsentChange> {
        if let Err(e) = self.state.store().clear() {
            warn!(error = %e, "failed to clear consent");
        }
        self.state.forget()
    }

    /// Whether the banner should be drawn now.
    ///
    /// First-time visitors get `banner_delay` of browsing before it
    /// appears; a re-opened banner shows immediately.
    pub fn should_render_banner(&self) -> bool {
        if !self.state.banner_visible() {
            return false;
        }
        if self.state.consent().is_some() {
            return true;
        }
        let elapsed = self.clock.now_utc() - self.created_at;
        elapsed
            .to_std()
            .map(|elapsed| elapsed >= self.config.banner_delay)
            .unwrap_or(false)
    }

    /// The analytics gate.
    pub fn gate(&self) -> &AnalyticsGate {
        &self.gate
    }

    /// The underlying state.
    pub fn state(&self) -> &ConsentState {
        &self.state
    }

    /// Get the current configuration.
    pub fn config(&self) -> &ConsentConfig {
        &self.config
    }

    fn commit(&mut self, record: ConsentRecord) {
        let change = self.state.set_consent(record);
        self.sync_gate(change);
    }

    fn reconcile(&mut self) -> Option<ConsentChange> {
        let change = self.state.reconcile();
        self.sync_gate(change);
        change
    }

    /// Apply a change to the gate; reload when a revocation requires it.
    fn sync_gate(&mut self, change: Option<ConsentChange>) -> Option<GateOutcome> {
        let change = change?;
        let outcome = self.gate.apply(change.current.as_ref());
        if outcome.reload_required {
            info!(origin = ?change.origin, "reloading to stop revoked integrations");
            self.page.reload();
        }
        Some(outcome)
    }
}
