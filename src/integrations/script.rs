//! Script-tag vendors (Cookie3, Google Analytics).
//!
//! These have no anonymous mode: the script is only injected once the
//! visitor granted the service. Once a vendor script has run it cannot be
//! unloaded, so revoking needs a page reload.

use crate::meter::events::AnalyticsEvent;
use crate::policy::gate::{Integration, TrackingMode};
use crate::protocol::models::ServiceId;
use crate::ConsentError;
use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// A `<script>` to inject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptResource {
    /// Script URL.
    pub src: String,
    /// Subresource integrity value (`sha384-<base64>`).
    pub integrity: Option<String>,
    /// Extra attributes (`crossorigin`, `async`, vendor ids).
    pub attributes: BTreeMap<String, String>,
}

impl ScriptResource {
    /// Script with no integrity value or attributes.
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            integrity: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Pin the script contents.
    pub fn with_integrity(mut self, integrity: impl Into<String>) -> Self {
        self.integrity = Some(integrity.into());
        self
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Check fetched script bytes against the integrity value.
    ///
    /// Passes when no integrity value is set. Any one matching hash in a
    /// space-separated list is enough.
    pub fn verify_integrity(&self, body: &[u8]) -> Result<(), ConsentError> {
        let Some(integrity) = &self.integrity else {
            return Ok(());
        };

        let matched = integrity.split_whitespace().any(|token| {
            let Some((algorithm, expected)) = token.split_once('-') else {
                return false;
            };
            // Options such as `?ct=...` follow the hash.
            let expected = expected.split('?').next().unwrap_or_default();
            match algorithm {
                "sha256" => STANDARD.encode(Sha256::digest(body)) == expected,
                "sha384" => STANDARD.encode(Sha384::digest(body)) == expected,
                "sha512" => STANDARD.encode(Sha512::digest(body)) == expected,
                _ => false,
            }
        });

        if matched {
            Ok(())
        } else {
            Err(ConsentError::IntegrityMismatch {
                src: self.src.clone(),
            })
        }
    }
}

/// Where scripts get injected (the document).
pub trait ScriptHost {
    /// Append the script to the page.
    fn inject(&mut self, script: &ScriptResource) -> Result<(), ConsentError>;

    /// Delete first-party cookies and storage keys starting with any prefix.
    fn clear_storage(&mut self, prefixes: &[&str]) -> Result<(), ConsentError>;
}

/// [`Integration`] for a vendor loaded from a script tag.
pub struct ScriptIntegration<H> {
    service: ServiceId,
    script: ScriptResource,
    storage_prefixes: &'static [&'static str],
    host: H,
    injected: bool,
}

impl<H: ScriptHost> ScriptIntegration<H> {
    /// Integration injecting `script` for `service`.
    pub fn new(
        service: ServiceId,
        script: ScriptResource,
        storage_prefixes: &'static [&'static str],
        host: H,
    ) -> Self {
        Self {
            service,
            script,
            storage_prefixes,
            host,
            injected: false,
        }
    }

    /// Cookie3 analytics for `site_id`.
    pub fn cookie3(site_id: &str, host: H) -> Self {
        Self::new(
            ServiceId::Cookie3,
            ScriptResource::new("https://cdn.markfi.xyz/scripts/analytics/0.11.21/cookie3.analytics.min.js")
                .with_integrity(
                    "sha384-wtYmYhbRlAqGwxc5Vb9GZVyp/Op3blmJICmXjRiJu2/TlPze5dHsmg2gglbH8viT",
                )
                .with_attribute("crossorigin", "anonymous")
                .with_attribute("async", "")
                .with_attribute("site-id", site_id),
            &["cookie3", "_c3"],
            host,
        )
    }

    /// Google Analytics (gtag.js) for `measurement_id`.
    pub fn google_analytics(measurement_id: &str, host: H) -> Self {
        Self::new(
            ServiceId::GoogleAnalytics,
            ScriptResource::new(format!(
                "https://www.googletagmanager.com/gtag/js?id={}",
                measurement_id
            ))
            .with_attribute("async", ""),
            &["_ga", "_gid", "_gat"],
            host,
        )
    }

    /// The script this integration loads.
    pub fn script(&self) -> &ScriptResource {
        &self.script
    }

    /// Whether the script was injected.
    pub fn is_injected(&self) -> bool {
        self.injected
    }

    /// The document host.
    pub fn host(&self) -> &H {
        &self.host
    }
}

impl<H: ScriptHost> Integration for ScriptIntegration<H> {
    fn service(&self) -> ServiceId {
        self.service
    }

    fn initialize(&mut self, mode: TrackingMode) -> Result<(), ConsentError> {
        if mode == TrackingMode::Cookieless {
            return Err(ConsentError::Integration {
                service: self.service.as_str().to_string(),
                detail: "no cookieless mode".to_string(),
            });
        }
        if self.injected {
            return Ok(());
        }
        self.host.inject(&self.script)?;
        self.injected = true;
        info!(service = %self.service, src = %self.script.src, "script injected");
        Ok(())
    }

    fn switch_mode(&mut self, mode: TrackingMode) -> Result<(), ConsentError> {
        self.initialize(mode)
    }

    fn clear_local_state(&mut self) -> Result<(), ConsentError> {
        debug!(service = %self.service, "clearing vendor storage");
        self.host.clear_storage(self.storage_prefixes)
    }

    fn forwards_events(&self) -> bool {
        false
    }

    fn capture(&mut self, event: &AnalyticsEvent) -> Result<(), ConsentError> {
        debug!(service = %self.service, event = %event.name, "event not forwarded to script vendor");
        Err(ConsentError::Integration {
            service: self.service.as_str().to_string(),
            detail: "events are not forwarded".to_string(),
        })
    }
}
