//! PostHog product analytics.
//!
//! The SDK itself sits behind [`PostHogSdk`]. While consent is pending it
//! runs cookieless; a grant opts in to persistent identification and a
//! revocation opts out and resets the SDK's stored identifiers.

use crate::meter::events::AnalyticsEvent;
use crate::policy::gate::{Integration, TrackingMode};
use crate::protocol::models::ServiceId;
use crate::ConsentError;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

/// SDK init options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostHogOptions {
    /// Kill switch; when false the SDK is never initialized.
    #[serde(skip)]
    pub enabled: bool,
    /// Project API key.
    #[serde(skip)]
    pub api_key: String,
    /// Ingestion host.
    pub api_host: String,
    /// Pageview capture strategy.
    pub capture_pageview: &'static str,
    /// Capture `$pageleave`.
    pub capture_pageleave: bool,
    /// Where the SDK persists its state.
    pub persistence: &'static str,
    /// When the SDK falls back to cookieless tracking.
    pub cookieless_mode: &'static str,
    /// DOM autocapture.
    pub autocapture: bool,
    /// Session recording kill switch.
    pub disable_session_recording: bool,
    /// Honour the Do Not Track header.
    pub respect_dnt: bool,
    /// Send the visitor IP.
    pub ip: bool,
    /// Properties stripped before sending.
    pub property_denylist: Vec<&'static str>,
    /// Share the SDK cookie across subdomains.
    pub cross_subdomain_cookie: bool,
}

impl Default for PostHogOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
            api_host: "https://us.i.posthog.com".to_string(),
            capture_pageview: "history_change",
            capture_pageleave: true,
            persistence: "localStorage",
            cookieless_mode: "on_reject",
            autocapture: false,
            disable_session_recording: true,
            respect_dnt: true,
            ip: false,
            property_denylist: vec!["$ip"],
            cross_subdomain_cookie: true,
        }
    }
}

/// The browser SDK surface we drive.
pub trait PostHogSdk {
    /// Initialize with a project key and options.
    fn init(&mut self, api_key: &str, options: &PostHogOptions) -> Result<(), ConsentError>;

    /// Register super properties sent with every event.
    fn register(&mut self, properties: Map<String, Value>);

    /// Allow persistent identification.
    fn opt_in_capturing(&mut self);

    /// Fall back to cookieless capture.
    fn opt_out_capturing(&mut self);

    /// Drop the distinct id and everything persisted.
    fn reset(&mut self);

    /// Send an event.
    fn capture(&mut self, name: &str, properties: &Map<String, Value>) -> Result<(), ConsentError>;
}

/// [`Integration`] for PostHog.
pub struct PostHogIntegration<S> {
    sdk: S,
    options: PostHogOptions,
    app_name: &'static str,
}

impl<S: PostHogSdk> PostHogIntegration<S> {
    /// Wrap `sdk`; `app_name` is registered as a super property.
    pub fn new(sdk: S, options: PostHogOptions, app_name: &'static str) -> Self {
        Self {
            sdk,
            options,
            app_name,
        }
    }

    /// The wrapped SDK.
    pub fn sdk(&self) -> &S {
        &self.sdk
    }

    fn unavailable(detail: &str) -> ConsentError {
        ConsentError::Integration {
            service: ServiceId::PostHog.as_str().to_string(),
            detail: detail.to_string(),
        }
    }
}

impl<S: PostHogSdk> Integration for PostHogIntegration<S> {
    fn service(&self) -> ServiceId {
        ServiceId::PostHog
    }

    fn supports_cookieless(&self) -> bool {
        true
    }

    fn initialize(&mut self, mode: TrackingMode) -> Result<(), ConsentError> {
        if !self.options.enabled {
            return Err(Self::unavailable("disabled by configuration"));
        }
        if self.options.api_key.is_empty() {
            return Err(Self::unavailable("api_key is not set"));
        }

        self.sdk.init(&self.options.api_key, &self.options)?;
        let mut props = Map::new();
        props.insert("app_name".to_string(), Value::from(self.app_name));
        self.sdk.register(props);

        if mode == TrackingMode::Identified {
            self.sdk.opt_in_capturing();
        }
        info!(?mode, host = %self.options.api_host, "posthog initialized");
        Ok(())
    }

    fn switch_mode(&mut self, mode: TrackingMode) -> Result<(), ConsentError> {
        match mode {
            TrackingMode::Identified => self.sdk.opt_in_capturing(),
            TrackingMode::Cookieless => self.sdk.opt_out_capturing(),
        }
        debug!(?mode, "posthog mode switched");
        Ok(())
    }

    fn clear_local_state(&mut self) -> Result<(), ConsentError> {
        self.sdk.opt_out_capturing();
        self.sdk.reset();
        Ok(())
    }

    fn capture(&mut self, event: &AnalyticsEvent) -> Result<(), ConsentError> {
        self.sdk.capture(&event.name, &event.properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSdk {
        calls: Vec<String>,
        options: Option<Value>,
        super_props: Map<String, Value>,
    }

    impl PostHogSdk for RecordingSdk {
        fn init(&mut self, api_key: &str, options: &PostHogOptions) -> Result<(), ConsentError> {
            self.calls.push(format!("init:{}", api_key));
            self.options = serde_json::to_value(options).ok();
            Ok(())
        }
        fn register(&mut self, properties: Map<String, Value>) {
            self.super_props.extend(properties);
        }
        fn opt_in_capturing(&mut self) {
            self.calls.push("opt_in".to_string());
        }
        fn opt_out_capturing(&mut self) {
            self.calls.push("opt_out".to_string());
        }
        fn reset(&mut self) {
            self.calls.push("reset".to_string());
        }
        fn capture(&mut self, name: &str, _: &Map<String, Value>) -> Result<(), ConsentError> {
            self.calls.push(format!("capture:{}", name));
            Ok(())
        }
    }

    fn options() -> PostHogOptions {
        PostHogOptions {
            api_key: "phc_test".to_string(),
            ..PostHogOptions::default()
        }
    }

    #[test]
    fn test_init_sends_privacy_options() {
        let mut posthog = PostHogIntegration::new(RecordingSdk::default(), options(), "marketing");
        posthog.initialize(TrackingMode::Cookieless).unwrap();

        let sdk = posthog.sdk();
        assert_eq!(sdk.calls, vec!["init:phc_test"]);
        assert_eq!(sdk.super_props.get("app_name"), Some(&json!("marketing")));

        let sent = sdk.options.as_ref().unwrap();
        assert_eq!(sent["cookieless_mode"], json!("on_reject"));
        assert_eq!(sent["persistence"], json!("localStorage"));
        assert_eq!(sent["autocapture"], json!(false));
        assert_eq!(sent["ip"], json!(false));
        assert_eq!(sent["property_denylist"], json!(["$ip"]));
        assert!(sent.get("api_key").is_none());
    }

    #[test]
    fn test_identified_start_opts_in() {
        let mut posthog = PostHogIntegration::new(RecordingSdk::default(), options(), "marketing");
        posthog.initialize(TrackingMode::Identified).unwrap();
        assert_eq!(posthog.sdk().calls, vec!["init:phc_test", "opt_in"]);
    }

    #[test]
    fn test_kill_switch_and_missing_key() {
        let mut disabled = PostHogIntegration::new(
            RecordingSdk::default(),
            PostHogOptions {
                enabled: false,
                ..options()
            },
            "marketing",
        );
        assert!(matches!(
            disabled.initialize(TrackingMode::Cookieless),
            Err(ConsentError::Integration { .. })
        ));
        assert!(disabled.sdk().calls.is_empty());

        let mut keyless =
            PostHogIntegration::new(RecordingSdk::default(), PostHogOptions::default(), "marketing");
        assert!(keyless.initialize(TrackingMode::Cookieless).is_err());
    }

    #[test]
    fn test_mode_switch_and_clear() {
        let mut posthog = PostHogIntegration::new(RecordingSdk::default(), options(), "marketing");
        posthog.initialize(TrackingMode::Cookieless).unwrap();
        posthog.switch_mode(TrackingMode::Identified).unwrap();
        posthog.capture(&AnalyticsEvent::new("marketing_faq_search")).unwrap();
        posthog.clear_local_state().unwrap();

        assert_eq!(
            posthog.sdk().calls,
            vec![
                "init:phc_test",
                "opt_in",
                "capture:marketing_faq_search",
                "opt_out",
                "reset"
            ]
        );
        assert!(posthog.supports_cookieless());
        assert!(!posthog.supports_live_teardown());
    }
}
