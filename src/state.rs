//! In-memory consent state exposed to the UI.
//!
//! Holds the authoritative consent decision (a cached copy of the store),
//! banner visibility, the banner's current view, and the manage view's
//! unsaved toggles. Every change to the consent decision is announced to
//! subscribers.

use crate::cache::store::ConsentStore;
use crate::protocol::models::{ConsentRecord, ServiceId};
use std::fmt;
use tracing::{debug, warn};

/// Which banner screen is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BannerView {
    /// Explanation with "Manage" and "Accept All".
    #[default]
    Default,
    /// Per-service toggles.
    Manage,
}

/// Page visibility, as reported by `visibilitychange`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// The tab is in the foreground.
    Visible,
    /// The tab is in the background.
    Hidden,
}

/// Where a consent change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A user action on this page.
    Local,
    /// Another tab or subdomain changed the cookie.
    External,
}

/// Notification emitted whenever the consent decision changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsentChange {
    /// Decision before the change.
    pub previous: Option<ConsentRecord>,
    /// Decision after the change.
    pub current: Option<ConsentRecord>,
    /// Who made it.
    pub origin: ChangeOrigin,
}

/// Handle returned by [`ConsentState::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&ConsentChange)>;

/// Reactive consent state for one page.
pub struct ConsentState {
    store: ConsentStore,
    consent: Option<ConsentRecord>,
    banner_visible: bool,
    banner_view: BannerView,
    /// Unsaved manage-view toggles.
    toggles: ConsentRecord,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl ConsentState {
    /// Initialize from the store. The banner shows while consent is pending.
    pub fn new(store: ConsentStore) -> Self {
        let consent = store.read();
        Self {
            store,
            consent,
            banner_visible: consent.is_none(),
            banner_view: BannerView::Default,
            toggles: prefill(consent),
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    /// The authoritative consent decision; `None` while pending.
    pub fn consent(&self) -> Option<ConsentRecord> {
        self.consent
    }

    /// Whether the banner is open.
    pub fn banner_visible(&self) -> bool {
        self.banner_visible
    }

    /// The banner's current screen.
    pub fn banner_view(&self) -> BannerView {
        self.banner_view
    }

    /// The manage view's unsaved toggles.
    pub fn toggles(&self) -> ConsentRecord {
        self.toggles
    }

    /// The backing store.
    pub fn store(&self) -> &ConsentStore {
        &self.store
    }

    /// Record a decision: update memory, persist, close the banner.
    ///
    /// A failed write is logged; the in-memory decision still applies for
    /// this page.
    pub fn set_consent(&mut self, record: ConsentRecord) -> Option<ConsentChange> {
        if let Err(e) = self.store.write(&record) {
            warn!(error = %e, "failed to persist consent");
        }
        let change = self.replace(Some(record), ChangeOrigin::Local);
        self.set_visible(false);
        change
    }

    /// Open the banner on its default screen, re-reading the store first so
    /// decisions made on another subdomain show up.
    pub fn show_banner(&mut self) -> Option<ConsentChange> {
        let fresh = self.store.read();
        let change = self.replace(fresh, ChangeOrigin::External);
        self.banner_view = BannerView::Default;
        self.set_visible(true);
        change
    }

    /// Close the banner without recording anything.
    pub fn hide_banner(&mut self) {
        self.set_visible(false);
    }

    /// Switch banner screens.
    pub fn set_banner_view(&mut self, view: BannerView) {
        self.banner_view = view;
    }

    /// Flip one unsaved toggle.
    pub fn toggle(&mut self, service: ServiceId) {
        let granted = !self.toggles.get(service);
        self.toggles.set(service, granted);
    }

    /// Re-read the store after the page regains visibility or storage
    /// changed elsewhere. Returns the change if the stored value differs.
    pub fn reconcile(&mut self) -> Option<ConsentChange> {
        let fresh = self.store.read();
        if fresh == self.consent {
            return None;
        }
        debug!(?fresh, held = ?self.consent, "consent changed externally");
        self.replace(fresh, ChangeOrigin::External)
    }

    /// Receive every future [`ConsentChange`].
    pub fn subscribe(&mut self, listener: impl FnMut(&ConsentChange) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Stop notifications for `id`. Returns whether it was subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    /// Drop the in-memory decision after the store was cleared.
    pub(crate) fn forget(&mut self) -> Option<ConsentChange> {
        self.replace(None, ChangeOrigin::Local)
    }

    fn replace(&mut self, next: Option<ConsentRecord>, origin: ChangeOrigin) -> Option<ConsentChange> {
        if next == self.consent {
            return None;
        }
        let change = ConsentChange {
            previous: self.consent,
            current: next,
            origin,
        };
        self.consent = next;
        if self.banner_visible {
            self.toggles = prefill(self.consent);
        }
        for (_, listener) in self.listeners.iter_mut() {
            listener(&change);
        }
        Some(change)
    }

    fn set_visible(&mut self, visible: bool) {
        if visible && !self.banner_visible {
            self.toggles = prefill(self.consent);
        }
        self.banner_visible = visible;
    }
}

/// Manage-view starting point: the current decision, or everything on.
fn prefill(consent: Option<ConsentRecord>) -> ConsentRecord {
    consent.unwrap_or_else(|| ConsentRecord::all(true))
}

impl fmt::Debug for ConsentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsentState")
            .field("consent", &self.consent)
            .field("banner_visible", &self.banner_visible)
            .field("banner_view", &self.banner_view)
            .field("toggles", &self.toggles)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
