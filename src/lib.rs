//! # Consentgate
//!
//! **Cross-subdomain cookie consent with consent-gated analytics.**
//!
//! Consentgate keeps one consent decision per visitor across every subdomain
//! of a parent domain. The decision lives in a shared cookie scoped to the
//! registrable domain, so `sky.money` and `app.sky.money` read and write the
//! same record, and applications sharing the cookie keep each other's keys.
//!
//! ## Features
//!
//! - **Shared cookie store**: percent-encoded JSON under `sky_consent`, merged
//!   on every write so foreign keys survive
//! - **Legacy migration**: older local-storage decisions are read once,
//!   written to the cookie and deleted
//! - **Analytics gate**: integrations start cookieless while consent is
//!   pending, switch live on grant, and force a reload on revocation
//! - **Cross-tab sync**: decisions made in another tab or subdomain are
//!   picked up on visibility regain or storage change
//! - **VPN / region guard**: a remote check with a configurable failure policy
//!
//! ## Quickstart
//!
//! ```no_run
//! use consentgate::{AnalyticsGate, BrowserContext, ConsentConfig, ConsentManager};
//! use consentgate::{MemoryCookieJar, NoopPage};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), consentgate::ConsentError> {
//!     let jar = Arc::new(MemoryCookieJar::new());
//!     let context = BrowserContext::from_url("https://sky.money/faq", jar)?;
//!
//!     let mut manager = ConsentManager::new(
//!         ConsentConfig::default(),
//!         context,
//!         AnalyticsGate::new(),
//!         Arc::new(NoopPage),
//!     )?;
//!
//!     if manager.is_banner_visible() {
//!         manager.accept_all();
//!     }
//!     println!("consent: {:?}", manager.get_consent());
//!     Ok(())
//! }
//! ```
//!
//! ## Failure model
//!
//! Nothing in the consent core fails past its own boundary:
//! - corrupt or unreachable storage reads as pending
//! - without a document (server-side rendering) every operation is a no-op
//! - remote check failures go to an [`ErrorReporter`](observe::ErrorReporter)
//!   and fall back to the configured [`FailurePolicy`]
//!
//! Two tabs writing at the same instant race; the last write wins.
//!
//! See [`ConsentConfig`] for configuration.

#![deny(missing_docs)]
#![doc(html_root_url = "https://docs.rs/consentgate/0.1.0")]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Protocol layer
pub mod protocol;

// Client layer
pub mod client;

// Storage layer
pub mod cache;

// Events
pub mod meter;

// Policy layer
pub mod policy;

// UI-facing state
pub mod state;

// Error reporting
pub mod observe;

// Manager (main public API)
pub mod manager;

// Vendor integrations
pub mod integrations;

// Re-exports for public API
pub use cache::file::FileCookieJar;
pub use cache::jar::{BrowserContext, CookieJar, LegacyStorage, MemoryCookieJar, MemoryLocalStorage};
pub use cache::store::ConsentStore;
pub use client::http::{VpnCheckClient, VpnChecker};
pub use clock::{Clock, SystemClock};
pub use config::ConsentConfig;
pub use errors::ConsentError;
pub use manager::{ConsentManager, NoopPage, PageControl, RecordingPage};
pub use meter::events::AnalyticsEvent;
pub use policy::access::{AccessDecision, FailurePolicy, VpnGuard};
pub use policy::gate::{AnalyticsGate, Integration, IntegrationState, TrackingMode};
pub use protocol::models::{ConsentRecord, Selection, ServiceId};
pub use state::{BannerView, ConsentChange, ConsentState, Visibility};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
