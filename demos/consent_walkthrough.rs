//! Consent walkthrough across two subdomains.
//!
//! A visitor accepts on `sky.money`, then opens `app.sky.money`, which sees
//! the same decision. Revoking on the app page forces a reload.
//!
//! ```bash
//! cargo run --example consent_walkthrough
//! ```
//!
//! Set `AUTH_URL` to also run the VPN / region check against a live auth
//! service.

use consentgate::integrations::posthog::{PostHogIntegration, PostHogOptions, PostHogSdk};
use consentgate::{
    AnalyticsGate, BrowserContext, ConsentConfig, ConsentError, ConsentManager, MemoryCookieJar,
    RecordingPage, Visibility, VpnCheckClient,
};
use consentgate::observe::TracingReporter;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Prints what a browser SDK would be asked to do.
struct PrintingSdk(&'static str);

impl PostHogSdk for PrintingSdk {
    fn init(&mut self, api_key: &str, options: &PostHogOptions) -> Result<(), ConsentError> {
        println!("  [{}] posthog init {} (cookieless: {})", self.0, api_key, options.cookieless_mode);
        Ok(())
    }
    fn register(&mut self, properties: Map<String, Value>) {
        println!("  [{}] posthog register {:?}", self.0, properties);
    }
    fn opt_in_capturing(&mut self) {
        println!("  [{}] posthog opt in", self.0);
    }
    fn opt_out_capturing(&mut self) {
        println!("  [{}] posthog opt out", self.0);
    }
    fn reset(&mut self) {
        println!("  [{}] posthog reset", self.0);
    }
    fn capture(&mut self, name: &str, _: &Map<String, Value>) -> Result<(), ConsentError> {
        println!("  [{}] posthog capture {}", self.0, name);
        Ok(())
    }
}

fn gate(page: &'static str) -> AnalyticsGate {
    let options = PostHogOptions {
        api_key: "phc_demo".to_string(),
        ..PostHogOptions::default()
    };
    let mut gate = AnalyticsGate::new();
    gate.register(Box::new(PostHogIntegration::new(PrintingSdk(page), options, "marketing")));
    gate
}

fn main() -> Result<(), ConsentError> {
    let jar = Arc::new(MemoryCookieJar::new());
    let reloads = Arc::new(RecordingPage::new());
    let config = ConsentConfig::default();

    println!("Opening https://sky.money/");
    let mut marketing = ConsentManager::new(
        config.clone(),
        BrowserContext::from_url("https://sky.money/", jar.clone())?,
        gate("sky.money"),
        reloads.clone(),
    )?;
    println!("  banner visible: {}", marketing.is_banner_visible());

    if let Ok(auth_url) = std::env::var("AUTH_URL") {
        marketing = marketing.with_vpn_check(
            Box::new(VpnCheckClient::new(&auth_url, &config)?),
            Arc::new(TracingReporter),
        );
    }
    if let Some(decision) = marketing.check_access() {
        println!("  access allowed: {} ({})", decision.allowed, decision.result.as_str());
    }

    println!("Accept all");
    marketing.accept_all();
    println!("  consent: {:?}", marketing.get_consent());

    println!("Opening https://app.sky.money/");
    let mut app = ConsentManager::new(
        config,
        BrowserContext::from_url("https://app.sky.money/", jar)?,
        gate("app.sky.money"),
        reloads.clone(),
    )?;
    println!("  banner visible: {}", app.is_banner_visible());
    println!("  consent: {:?}", app.get_consent());

    println!("Reject all on app.sky.money");
    app.reject_all();
    println!("  reloads requested: {}", reloads.reload_count());

    println!("Back to the sky.money tab");
    if let Some(change) = marketing.on_visibility_change(Visibility::Visible) {
        println!("  picked up {:?} change: {:?}", change.origin, change.current);
    }
    println!("  reloads requested: {}", reloads.reload_count());

    Ok(())
}
