//! Canonical consent persistence.
//!
//! The consent cookie is the single source of truth across every subdomain
//! of the parent domain. Reads never fail: corrupt or unreachable storage is
//! reported through `tracing` and treated as pending. Writes merge into the
//! existing envelope so that cooperating applications' keys survive.

use crate::cache::format::{cookie_domain, decode_envelope, encode_envelope, find_cookie, SetCookie};
use crate::cache::jar::{BrowserContext, LegacyStorage};
use crate::config::ConsentConfig;
use crate::protocol::models::{ConsentRecord, LegacyConsentValue, StorageEnvelope};
use crate::ConsentError;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reads and writes the consent record for one page.
#[derive(Debug, Clone)]
pub struct ConsentStore {
    config: ConsentConfig,
    /// `None` outside a document (server-side rendering).
    context: Option<BrowserContext>,
}

impl ConsentStore {
    /// Store for a page running in `context`.
    pub fn new(config: ConsentConfig, context: BrowserContext) -> Self {
        Self {
            config,
            context: Some(context),
        }
    }

    /// Store with no document. Every read is pending, every write a no-op.
    pub fn detached(config: ConsentConfig) -> Self {
        Self {
            config,
            context: None,
        }
    }

    /// Whether the store has a document to work with.
    pub fn is_attached(&self) -> bool {
        self.context.is_some()
    }

    /// Read the consent record.
    ///
    /// Falls back to a one-time legacy migration when the cookie is absent or
    /// corrupt. Corrupt cookie data is left in place.
    pub fn read(&self) -> Option<ConsentRecord> {
        let ctx = self.context.as_ref()?;

        match self.read_envelope(ctx) {
            Ok(Some(envelope)) => return Some(ConsentRecord::from_envelope(&envelope)),
            Ok(None) => {}
            Err(ConsentError::CorruptRecord(detail)) => {
                warn!(host = %ctx.host(), cookie = self.config.cookie_name, %detail, "ignoring corrupt consent cookie");
            }
            Err(e) => {
                warn!(host = %ctx.host(), error = %e, "consent cookie unreadable, treating as pending");
                return None;
            }
        }

        let migrated = self.migrate_legacy()?;
        if let Err(e) = self.write(&migrated) {
            warn!(host = %ctx.host(), error = %e, "failed to persist migrated consent");
        }
        Some(migrated)
    }

    /// Merge `record` into the stored envelope and drop legacy keys.
    pub fn write(&self, record: &ConsentRecord) -> Result<(), ConsentError> {
        let Some(ctx) = self.context.as_ref() else {
            return Ok(());
        };

        let mut envelope = match self.read_envelope(ctx) {
            Ok(envelope) => envelope.unwrap_or_default(),
            Err(ConsentError::CorruptRecord(detail)) => {
                warn!(host = %ctx.host(), %detail, "overwriting corrupt consent cookie");
                StorageEnvelope::default()
            }
            Err(e) => return Err(e),
        };
        envelope.merge_record(record);

        let cookie = SetCookie::new(self.config.cookie_name, encode_envelope(&envelope)?)
            .domain(self.domain_for(ctx.host()))
            .max_age(self.config.cookie_max_age);
        ctx.cookies().set_cookie(ctx.host(), &cookie)?;

        debug!(
            host = %ctx.host(),
            foreign_keys = envelope.foreign_keys().count(),
            "consent written"
        );

        self.remove_legacy_keys(ctx);
        Ok(())
    }

    /// Pull a decision out of legacy local storage, deleting what was read.
    ///
    /// Does not write the cookie; [`read`](Self::read) persists the result.
    pub fn migrate_legacy(&self) -> Option<ConsentRecord> {
        let ctx = self.context.as_ref()?;
        let storage = ctx.local_storage()?;

        match storage.get_item(self.config.legacy_key_v2) {
            Ok(Some(raw)) => match StorageEnvelope::from_json(&raw) {
                Ok(envelope) => {
                    self.remove_legacy_keys(ctx);
                    info!(host = %ctx.host(), key = self.config.legacy_key_v2, "migrated legacy consent");
                    return Some(ConsentRecord::from_envelope(&envelope));
                }
                Err(e) => {
                    warn!(key = self.config.legacy_key_v2, error = %e, "dropping corrupt legacy consent");
                    remove_logged(storage, self.config.legacy_key_v2);
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "legacy storage unreadable");
                return None;
            }
        }

        let raw = match storage.get_item(self.config.legacy_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "legacy storage unreadable");
                return None;
            }
        };
        remove_logged(storage, self.config.legacy_key);

        let record = LegacyConsentValue::parse(&raw).and_then(LegacyConsentValue::expand);
        match &record {
            Some(_) => info!(host = %ctx.host(), key = self.config.legacy_key, "migrated legacy consent"),
            None => debug!(key = self.config.legacy_key, value = %raw, "discarded undecided legacy consent"),
        }
        record
    }

    /// Delete the consent cookie and every legacy key.
    pub fn clear(&self) -> Result<(), ConsentError> {
        let Some(ctx) = self.context.as_ref() else {
            return Ok(());
        };

        let cookie = SetCookie::new(self.config.cookie_name, "")
            .domain(self.domain_for(ctx.host()))
            .max_age(Duration::ZERO);
        ctx.cookies().set_cookie(ctx.host(), &cookie)?;
        self.remove_legacy_keys(ctx);

        info!(host = %ctx.host(), "consent cleared");
        Ok(())
    }

    /// The raw envelope, including other applications' keys.
    pub fn envelope(&self) -> Result<Option<StorageEnvelope>, ConsentError> {
        match self.context.as_ref() {
            Some(ctx) => self.read_envelope(ctx),
            None => Err(ConsentError::StorageUnavailable(
                "no document context".to_string(),
            )),
        }
    }

    fn domain_for(&self, host: &str) -> Option<String> {
        match self.config.cookie_domain {
            Some(domain) => Some(domain.to_string()),
            None => cookie_domain(host),
        }
    }

    fn read_envelope(&self, ctx: &BrowserContext) -> Result<Option<StorageEnvelope>, ConsentError> {
        let header = ctx.cookies().cookie_header(ctx.host())?;
        match find_cookie(&header, self.config.cookie_name) {
            Some(raw) if !raw.is_empty() => decode_envelope(raw).map(Some),
            _ => Ok(None),
        }
    }

    fn remove_legacy_keys(&self, ctx: &BrowserContext) {
        if let Some(storage) = ctx.local_storage() {
            remove_logged(storage, self.config.legacy_key_v2);
            remove_logged(storage, self.config.legacy_key);
        }
    }
}

fn remove_logged(storage: &dyn LegacyStorage, key: &str) {
    if let Err(e) = storage.remove_item(key) {
        warn!(key, error = %e, "failed to remove legacy consent key");
    }
}
