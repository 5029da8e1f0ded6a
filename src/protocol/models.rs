//! Consent records, the shared storage envelope, and remote check payloads.

use crate::ConsentError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A third-party integration whose data collection is consent-gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ServiceId {
    /// Usage analytics (PostHog).
    #[serde(rename = "posthog")]
    PostHog,
    /// Web3 marketing analytics (Cookie3).
    #[serde(rename = "cookie3")]
    Cookie3,
    /// Website analytics (Google Analytics).
    #[serde(rename = "google_analytics")]
    GoogleAnalytics,
}

impl ServiceId {
    /// Every known service, in banner order.
    pub const ALL: [ServiceId; 3] = [
        ServiceId::PostHog,
        ServiceId::Cookie3,
        ServiceId::GoogleAnalytics,
    ];

    /// Key used in the persisted envelope.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceId::PostHog => "posthog",
            ServiceId::Cookie3 => "cookie3",
            ServiceId::GoogleAnalytics => "google_analytics",
        }
    }

    /// Human-readable vendor name for the manage view.
    pub fn label(&self) -> &'static str {
        match self {
            ServiceId::PostHog => "PostHog",
            ServiceId::Cookie3 => "Cookie3",
            ServiceId::GoogleAnalytics => "Google Analytics",
        }
    }

    /// What the service is used for.
    pub fn description(&self) -> &'static str {
        match self {
            ServiceId::PostHog => "Usage analytics",
            ServiceId::Cookie3 => "Web3 marketing analytics",
            ServiceId::GoogleAnalytics => "Website analytics",
        }
    }

    /// Look up a service by its envelope key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == key)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceId {
    type Err = ConsentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s)
            .ok_or_else(|| ConsentError::ProtocolError(format!("Unknown service id: {}", s)))
    }
}

/// A consent decision covering every known service.
///
/// `Option<ConsentRecord>::None` is the pending state; a record always has a
/// value for each [`ServiceId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConsentRecord {
    posthog: bool,
    cookie3: bool,
    google_analytics: bool,
}

impl ConsentRecord {
    /// A record with every service set to `granted`.
    pub fn all(granted: bool) -> Self {
        Self {
            posthog: granted,
            cookie3: granted,
            google_analytics: granted,
        }
    }

    /// Whether `service` is granted.
    pub fn get(&self, service: ServiceId) -> bool {
        match service {
            ServiceId::PostHog => self.posthog,
            ServiceId::Cookie3 => self.cookie3,
            ServiceId::GoogleAnalytics => self.google_analytics,
        }
    }

    /// Set the decision for one service.
    pub fn set(&mut self, service: ServiceId, granted: bool) {
        match service {
            ServiceId::PostHog => self.posthog = granted,
            ServiceId::Cookie3 => self.cookie3 = granted,
            ServiceId::GoogleAnalytics => self.google_analytics = granted,
        }
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, service: ServiceId, granted: bool) -> Self {
        self.set(service, granted);
        self
    }

    /// `(service, granted)` pairs in banner order.
    pub fn iter(&self) -> impl Iterator<Item = (ServiceId, bool)> + '_ {
        ServiceId::ALL.into_iter().map(move |s| (s, self.get(s)))
    }

    /// Decode a record from an envelope.
    ///
    /// Only the JSON literal `true` grants; missing or non-boolean values deny.
    pub fn from_envelope(envelope: &StorageEnvelope) -> Self {
        let mut record = Self::all(false);
        for service in ServiceId::ALL {
            let granted = envelope.get(service.as_str()) == Some(&Value::Bool(true));
            record.set(service, granted);
        }
        record
    }
}

/// A partial set of decisions submitted from the manage view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection(BTreeMap<ServiceId, bool>);

impl Selection {
    /// Empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a decision.
    pub fn with(mut self, service: ServiceId, granted: bool) -> Self {
        self.0.insert(service, granted);
        self
    }

    /// Expand into a full record. Services not selected are denied.
    pub fn into_record(self) -> ConsentRecord {
        let mut record = ConsentRecord::all(false);
        for (service, granted) in self.0 {
            record.set(service, granted);
        }
        record
    }
}

impl FromIterator<(ServiceId, bool)> for Selection {
    fn from_iter<I: IntoIterator<Item = (ServiceId, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The full JSON object stored in the consent cookie.
///
/// Cooperating applications on the same parent domain share the object, so
/// keys this crate does not know are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageEnvelope(Map<String, Value>);

impl StorageEnvelope {
    /// Parse an envelope from JSON. Anything but a JSON object is corrupt.
    pub fn from_json(json: &str) -> Result<Self, ConsentError> {
        match serde_json::from_str::<Value>(json) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(other) => Err(ConsentError::CorruptRecord(format!(
                "expected JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(ConsentError::CorruptRecord(format!("invalid JSON: {}", e))),
        }
    }

    /// Compact JSON form.
    pub fn to_json(&self) -> Result<String, ConsentError> {
        serde_json::to_string(&self.0)
            .map_err(|e| ConsentError::StorageIO(format!("Failed to serialize envelope: {}", e)))
    }

    /// Raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Store a raw value under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Overlay a record: its keys win, every other key is kept.
    pub fn merge_record(&mut self, record: &ConsentRecord) {
        for (service, granted) in record.iter() {
            self.0.insert(service.as_str().to_string(), Value::Bool(granted));
        }
    }

    /// Keys written by other applications.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &str> {
        self.0
            .keys()
            .map(String::as_str)
            .filter(|k| ServiceId::from_key(k).is_none())
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the envelope holds no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The oldest single-value consent representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyConsentValue {
    /// No decision was recorded.
    Pending,
    /// Everything accepted.
    Accepted,
    /// Everything rejected.
    Rejected,
}

impl LegacyConsentValue {
    /// Parse a stored legacy value, including the boolean-era `"true"`/`"false"`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "accepted" | "true" => Some(Self::Accepted),
            "rejected" | "false" => Some(Self::Rejected),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }

    /// Expand to a full record; pending has none.
    pub fn expand(self) -> Option<ConsentRecord> {
        match self {
            Self::Pending => None,
            Self::Accepted => Some(ConsentRecord::all(true)),
            Self::Rejected => Some(ConsentRecord::all(false)),
        }
    }
}

/// VPN / region status returned by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VpnStatus {
    /// Whether the visitor appears to be behind a VPN.
    #[serde(alias = "isConnectedToVpn")]
    pub is_connected_to_vpn: bool,

    /// Whether the visitor's region is restricted.
    #[serde(default, alias = "isRestrictedRegion")]
    pub is_restricted_region: bool,

    /// ISO country code, if the service resolved one.
    #[serde(default, alias = "countryCode")]
    pub country_code: Option<String>,
}

/// Parse a VPN check response body.
pub fn parse_vpn_status(body: &[u8]) -> Result<VpnStatus, ConsentError> {
    serde_json::from_slice(body)
        .map_err(|e| ConsentError::ProtocolError(format!("Failed to parse VPN status: {}", e)))
}
