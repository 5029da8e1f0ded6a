//! Consent-driven lifecycle of third-party analytics integrations.
//!
//! Each integration moves through [`IntegrationState`]:
//! - pending consent starts it in cookieless mode when it has one, otherwise
//!   it stays uninitialized
//! - a grant moves it to fully identified, live, without a reload
//! - a revocation clears its local state and disables it; unless the
//!   integration can guarantee an in-memory teardown, the page must reload
//!   before it is certain no more data leaves the browser
//! - an integration whose service was denied from the start is never called
//!   at all

use crate::meter::events::AnalyticsEvent;
use crate::protocol::models::{ConsentRecord, ServiceId};
use crate::ConsentError;
use once_cell::unsync::OnceCell;
use std::fmt;
use tracing::{debug, info, warn};

/// Lifecycle state of one integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationState {
    /// Never started; no network activity.
    Uninitialized,
    /// Running without persistent identifiers (consent pending).
    CookielessAnonymous,
    /// Running with full identification (consent granted).
    FullyIdentified,
    /// Denied; stopped or never started.
    Disabled,
}

impl IntegrationState {
    /// Whether the integration may send data.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::CookielessAnonymous | Self::FullyIdentified)
    }
}

/// How a running integration identifies visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    /// Privacy-preserving anonymous mode, nothing stored on the device.
    Cookieless,
    /// Persistent identifiers allowed.
    Identified,
}

/// A consent-gated third-party integration.
pub trait Integration {
    /// The service this integration belongs to.
    fn service(&self) -> ServiceId;

    /// Whether the vendor offers an anonymous cookieless mode.
    fn supports_cookieless(&self) -> bool {
        false
    }

    /// Whether stopping in memory reliably ends all transmission.
    ///
    /// Integrations that load vendor scripts cannot promise this: the script
    /// keeps its timers and listeners after it has run.
    fn supports_live_teardown(&self) -> bool {
        false
    }

    /// Whether [`capture`](Self::capture) delivers events to the vendor.
    ///
    /// Script vendors collect on their own and ignore forwarded events.
    fn forwards_events(&self) -> bool {
        true
    }

    /// Start the integration in `mode`.
    fn initialize(&mut self, mode: TrackingMode) -> Result<(), ConsentError>;

    /// Switch a running integration to `mode`.
    fn switch_mode(&mut self, mode: TrackingMode) -> Result<(), ConsentError>;

    /// Stop sending and wipe identifiers stored on the device.
    fn clear_local_state(&mut self) -> Result<(), ConsentError>;

    /// Send one event.
    fn capture(&mut self, event: &AnalyticsEvent) -> Result<(), ConsentError>;
}

/// One state change made by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Affected service.
    pub service: ServiceId,
    /// State before.
    pub from: IntegrationState,
    /// State after.
    pub to: IntegrationState,
}

/// Result of applying a consent change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateOutcome {
    /// State changes, in registration order.
    pub transitions: Vec<Transition>,
    /// Whether a page reload is needed to guarantee revoked integrations stop.
    pub reload_required: bool,
}

/// Starting states chosen by [`AnalyticsGate::bootstrap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapSummary {
    /// `(service, state)` per registered integration.
    pub states: Vec<(ServiceId, IntegrationState)>,
}

struct Slot {
    integration: Box<dyn Integration>,
    state: IntegrationState,
}

/// Owns the registered integrations and their states.
///
/// Build one at application start and hand it to whatever needs it; the
/// one-time bootstrap is tracked per instance.
pub struct AnalyticsGate {
    slots: Vec<Slot>,
    bootstrapped: OnceCell<BootstrapSummary>,
}

impl AnalyticsGate {
    /// Gate with no integrations.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            bootstrapped: OnceCell::new(),
        }
    }

    /// Register an integration. Registering a service twice replaces the
    /// earlier integration.
    pub fn register(&mut self, integration: Box<dyn Integration>) {
        let service = integration.service();
        self.slots.retain(|s| s.integration.service() != service);
        self.slots.push(Slot {
            integration,
            state: IntegrationState::Uninitialized,
        });
    }

    /// Current state of `service`, if registered.
    pub fn state(&self, service: ServiceId) -> Option<IntegrationState> {
        self.slots
            .iter()
            .find(|s| s.integration.service() == service)
            .map(|s| s.state)
    }

    /// Whether [`bootstrap`](Self::bootstrap) has run.
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.get().is_some()
    }

    /// Start integrations according to the consent known at page load.
    ///
    /// Runs once; later calls return the first summary untouched.
    pub fn bootstrap(&mut self, consent: Option<&ConsentRecord>) -> &BootstrapSummary {
        let slots = &mut self.slots;
        self.bootstrapped.get_or_init(|| {
            let states = slots
                .iter_mut()
                .map(|slot| {
                    let service = slot.integration.service();
                    slot.state = start_state(slot, consent.map(|c| c.get(service)));
                    (service, slot.state)
                })
                .collect();
            info!(?consent, "analytics gate bootstrapped");
            BootstrapSummary { states }
        })
    }

    /// Bring integrations in line with a new decision.
    ///
    /// `next = None` (consent cleared elsewhere) leaves everything as is.
    pub fn apply(&mut self, next: Option<&ConsentRecord>) -> GateOutcome {
        let mut outcome = GateOutcome::default();
        let Some(next) = next else {
            return outcome;
        };

        for slot in self.slots.iter_mut() {
            let service = slot.integration.service();
            let from = slot.state;
            let (to, reload) = if next.get(service) {
                (grant(slot), false)
            } else {
                revoke(slot)
            };
            slot.state = to;
            outcome.reload_required |= reload;
            if from != to {
                debug!(service = %service, ?from, ?to, "integration transition");
                outcome.transitions.push(Transition { service, from, to });
            }
        }

        if outcome.reload_required {
            info!("consent revoked for a running integration; reload required");
        }
        outcome
    }

    /// Send `event` through `service` if it is running and forwards events.
    /// Returns whether it was sent.
    pub fn capture(&mut self, service: ServiceId, event: &AnalyticsEvent) -> bool {
        let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| s.integration.service() == service)
        else {
            return false;
        };
        if !slot.state.is_running() || !slot.integration.forwards_events() {
            return false;
        }
        match slot.integration.capture(event) {
            Ok(()) => true,
            Err(e) => {
                warn!(service = %service, event = %event.name, error = %e, "capture failed");
                false
            }
        }
    }
}

impl Default for AnalyticsGate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AnalyticsGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyticsGate")
            .field(
                "states",
                &self
                    .slots
                    .iter()
                    .map(|s| (s.integration.service(), s.state))
                    .collect::<Vec<_>>(),
            )
            .field("bootstrapped", &self.is_bootstrapped())
            .finish()
    }
}

fn start_state(slot: &mut Slot, granted: Option<bool>) -> IntegrationState {
    match granted {
        None if slot.integration.supports_cookieless() => {
            start(slot, TrackingMode::Cookieless, IntegrationState::CookielessAnonymous)
        }
        None => IntegrationState::Uninitialized,
        Some(true) => start(slot, TrackingMode::Identified, IntegrationState::FullyIdentified),
        Some(false) => IntegrationState::Disabled,
    }
}

fn start(slot: &mut Slot, mode: TrackingMode, target: IntegrationState) -> IntegrationState {
    match slot.integration.initialize(mode) {
        Ok(()) => target,
        Err(e) => {
            warn!(service = %slot.integration.service(), error = %e, "integration failed to start");
            IntegrationState::Uninitialized
        }
    }
}

fn grant(slot: &mut Slot) -> IntegrationState {
    match slot.state {
        IntegrationState::FullyIdentified => IntegrationState::FullyIdentified,
        IntegrationState::CookielessAnonymous => {
            match slot.integration.switch_mode(TrackingMode::Identified) {
                Ok(()) => IntegrationState::FullyIdentified,
                Err(e) => {
                    warn!(service = %slot.integration.service(), error = %e, "mode switch failed");
                    IntegrationState::CookielessAnonymous
                }
            }
        }
        IntegrationState::Uninitialized | IntegrationState::Disabled => {
            start(slot, TrackingMode::Identified, IntegrationState::FullyIdentified)
        }
    }
}

/// Returns the new state and whether a reload is needed.
fn revoke(slot: &mut Slot) -> (IntegrationState, bool) {
    if !slot.state.is_running() {
        return (IntegrationState::Disabled, false);
    }
    if let Err(e) = slot.integration.clear_local_state() {
        warn!(service = %slot.integration.service(), error = %e, "failed to clear integration state");
    }
    (
        IntegrationState::Disabled,
        !slot.integration.supports_live_teardown(),
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every call made on it.
    pub(crate) struct FakeIntegration {
        pub service: ServiceId,
        pub cookieless: bool,
        pub live_teardown: bool,
        pub forwards: bool,
        pub calls: Rc<RefCell<Vec<String>>>,
    }

    impl FakeIntegration {
        pub(crate) fn new(service: ServiceId, cookieless: bool) -> (Self, Rc<RefCell<Vec<String>>>) {
            let calls = Rc::new(RefCell::new(Vec::new()));
            (
                Self {
                    service,
                    cookieless,
                    live_teardown: false,
                    forwards: true,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    impl Integration for FakeIntegration {
        fn service(&self) -> ServiceId {
            self.service
        }
        fn supports_cookieless(&self) -> bool {
            self.cookieless
        }
        fn supports_live_teardown(&self) -> bool {
            self.live_teardown
        }
        fn forwards_events(&self) -> bool {
            self.forwards
        }
        fn initialize(&mut self, mode: TrackingMode) -> Result<(), ConsentError> {
            self.calls.borrow_mut().push(format!("init:{:?}", mode));
            Ok(())
        }
        fn switch_mode(&mut self, mode: TrackingMode) -> Result<(), ConsentError> {
            self.calls.borrow_mut().push(format!("switch:{:?}", mode));
            Ok(())
        }
        fn clear_local_state(&mut self) -> Result<(), ConsentError> {
            self.calls.borrow_mut().push("clear".to_string());
            Ok(())
        }
        fn capture(&mut self, event: &AnalyticsEvent) -> Result<(), ConsentError> {
            self.calls.borrow_mut().push(format!("capture:{}", event.name));
            Ok(())
        }
    }

    fn event() -> AnalyticsEvent {
        AnalyticsEvent::new("marketing_section_view")
    }

    #[test]
    fn pending_starts_cookieless_where_supported() {
        let (posthog, ph_calls) = FakeIntegration::new(ServiceId::PostHog, true);
        let (cookie3, c3_calls) = FakeIntegration::new(ServiceId::Cookie3, false);
        let mut gate = AnalyticsGate::new();
        gate.register(Box::new(posthog));
        gate.register(Box::new(cookie3));

        gate.bootstrap(None);

        assert_eq!(gate.state(ServiceId::PostHog), Some(IntegrationState::CookielessAnonymous));
        assert_eq!(gate.state(ServiceId::Cookie3), Some(IntegrationState::Uninitialized));
        assert_eq!(*ph_calls.borrow(), vec!["init:Cookieless"]);
        assert!(c3_calls.borrow().is_empty());
    }

    #[test]
    fn prior_denial_never_touches_integration() {
        let (posthog, calls) = FakeIntegration::new(ServiceId::PostHog, true);
        let mut gate = AnalyticsGate::new();
        gate.register(Box::new(posthog));

        gate.bootstrap(Some(&ConsentRecord::all(false)));
        assert_eq!(gate.state(ServiceId::PostHog), Some(IntegrationState::Disabled));
        assert!(!gate.capture(ServiceId::PostHog, &event()));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn prior_grant_starts_identified() {
        let (cookie3, calls) = FakeIntegration::new(ServiceId::Cookie3, false);
        let mut gate = AnalyticsGate::new();
        gate.register(Box::new(cookie3));

        gate.bootstrap(Some(&ConsentRecord::all(true)));
        assert_eq!(gate.state(ServiceId::Cookie3), Some(IntegrationState::FullyIdentified));
        assert_eq!(*calls.borrow(), vec!["init:Identified"]);
    }

    #[test]
    fn bootstrap_runs_once() {
        let (posthog, calls) = FakeIntegration::new(ServiceId::PostHog, true);
        let mut gate = AnalyticsGate::new();
        gate.register(Box::new(posthog));

        let first = gate.bootstrap(None).clone();
        let second = gate.bootstrap(Some(&ConsentRecord::all(true))).clone();

        assert_eq!(first, second);
        assert!(gate.is_bootstrapped());
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn grant_switches_cookieless_live() {
        let (posthog, calls) = FakeIntegration::new(ServiceId::PostHog, true);
        let mut gate = AnalyticsGate::new();
        gate.register(Box::new(posthog));
        gate.bootstrap(None);

        let outcome = gate.apply(Some(&ConsentRecord::all(true)));

        assert!(!outcome.reload_required);
        assert_eq!(
            outcome.transitions,
            vec![Transition {
                service: ServiceId::PostHog,
                from: IntegrationState::CookielessAnonymous,
                to: IntegrationState::FullyIdentified,
            }]
        );
        assert_eq!(*calls.borrow(), vec!["init:Cookieless", "switch:Identified"]);
    }

    #[test]
    fn revoking_running_integration_requires_reload() {
        let (cookie3, calls) = FakeIntegration::new(ServiceId::Cookie3, false);
        let mut gate = AnalyticsGate::new();
        gate.register(Box::new(cookie3));
        gate.bootstrap(Some(&ConsentRecord::all(true)));

        let outcome = gate.apply(Some(&ConsentRecord::all(false)));

        assert!(outcome.reload_required);
        assert_eq!(gate.state(ServiceId::Cookie3), Some(IntegrationState::Disabled));
        assert!(!gate.capture(ServiceId::Cookie3, &event()));
        assert_eq!(*calls.borrow(), vec!["init:Identified", "clear"]);
    }

    #[test]
    fn revoking_cookieless_integration_requires_reload() {
        let (posthog, _) = FakeIntegration::new(ServiceId::PostHog, true);
        let mut gate = AnalyticsGate::new();
        gate.register(Box::new(posthog));
        gate.bootstrap(None);

        let outcome = gate.apply(Some(&ConsentRecord::all(false)));
        assert!(outcome.reload_required);
        assert_eq!(gate.state(ServiceId::PostHog), Some(IntegrationState::Disabled));
    }

    #[test]
    fn live_teardown_avoids_reload() {
        let (mut posthog, _) = FakeIntegration::new(ServiceId::PostHog, true);
        posthog.live_teardown = true;
        let mut gate = AnalyticsGate::new();
        gate.register(Box::new(posthog));
        gate.bootstrap(Some(&ConsentRecord::all(true)));

        let outcome = gate.apply(Some(&ConsentRecord::all(false)));
        assert!(!outcome.reload_required);
        assert_eq!(gate.state(ServiceId::PostHog), Some(IntegrationState::Disabled));
    }

    #[test]
    fn revoking_idle_integration_is_free() {
        let (cookie3, calls) = FakeIntegration::new(ServiceId::Cookie3, false);
        let mut gate = AnalyticsGate::new();
        gate.register(Box::new(cookie3));
        gate.bootstrap(None);

        let outcome = gate.apply(Some(&ConsentRecord::all(false)));
        assert!(!outcome.reload_required);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn regrant_after_denial_starts_live() {
        let (cookie3, calls) = FakeIntegration::new(ServiceId::Cookie3, false);
        let mut gate = AnalyticsGate::new();
        gate.register(Box::new(cookie3));
        gate.bootstrap(Some(&ConsentRecord::all(false)));

        let outcome = gate.apply(Some(&ConsentRecord::all(true)));
        assert!(!outcome.reload_required);
        assert_eq!(gate.state(ServiceId::Cookie3), Some(IntegrationState::FullyIdentified));
        assert_eq!(*calls.borrow(), vec!["init:Identified"]);
    }

    #[test]
    fn cleared_consent_leaves_integrations_alone() {
        let (posthog, _) = FakeIntegration::new(ServiceId::PostHog, true);
        let mut gate = AnalyticsGate::new();
        gate.register(Box::new(posthog));
        gate.bootstrap(Some(&ConsentRecord::all(true)));

        assert_eq!(gate.apply(None), GateOutcome::default());
        assert_eq!(gate.state(ServiceId::PostHog), Some(IntegrationState::FullyIdentified));
    }

    #[test]
    fn capture_only_when_running() {
        let (posthog, calls) = FakeIntegration::new(ServiceId::PostHog, true);
        let mut gate = AnalyticsGate::new();
        gate.register(Box::new(posthog));

        assert!(!gate.capture(ServiceId::PostHog, &event()));
        gate.bootstrap(None);
        assert!(gate.capture(ServiceId::PostHog, &event()));
        assert!(!gate.capture(ServiceId::Cookie3, &event()));
        assert_eq!(calls.borrow().last().unwrap(), "capture:marketing_section_view");
    }

    #[test]
    fn capture_skips_integrations_that_do_not_forward() {
        let (mut cookie3, calls) = FakeIntegration::new(ServiceId::Cookie3, false);
        cookie3.forwards = false;
        let mut gate = AnalyticsGate::new();
        gate.register(Box::new(cookie3));
        gate.bootstrap(Some(&ConsentRecord::all(true)));

        assert_eq!(gate.state(ServiceId::Cookie3), Some(IntegrationState::FullyIdentified));
        assert!(!gate.capture(ServiceId::Cookie3, &event()));
        assert_eq!(*calls.borrow(), vec!["init:Identified"]);
    }
}
