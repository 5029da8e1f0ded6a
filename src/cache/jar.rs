//! Cookie jars and legacy local storage.
//!
//! A [`CookieJar`] behaves like the browser's cookie store: a cookie written
//! with a domain attribute is visible from every host under that domain, a
//! host-only cookie only from the host that wrote it. One jar shared by
//! several [`BrowserContext`]s models sibling subdomains of one site.

use crate::cache::format::SetCookie;
use crate::clock::{Clock, SystemClock};
use crate::ConsentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Domain-aware cookie storage.
pub trait CookieJar: Send + Sync {
    /// The `document.cookie` string visible to `host`.
    fn cookie_header(&self, host: &str) -> Result<String, ConsentError>;

    /// Apply a cookie write issued by a page on `host`.
    fn set_cookie(&self, host: &str, cookie: &SetCookie) -> Result<(), ConsentError>;
}

/// Per-origin key/value storage holding legacy consent values.
pub trait LegacyStorage: Send + Sync {
    /// Read an item.
    fn get_item(&self, key: &str) -> Result<Option<String>, ConsentError>;

    /// Write an item.
    fn set_item(&self, key: &str, value: &str) -> Result<(), ConsentError>;

    /// Delete an item. Deleting a missing key is not an error.
    fn remove_item(&self, key: &str) -> Result<(), ConsentError>;
}

/// One stored cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    /// Cookie name.
    pub name: String,
    /// Encoded value.
    pub value: String,
    /// Domain without a leading dot (the writing host for host-only cookies).
    pub domain: String,
    /// Whether only `domain` itself may read the cookie.
    pub host_only: bool,
    /// Path attribute.
    pub path: String,
    /// Expiry; `None` for session cookies.
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredCookie {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn visible_to(&self, host: &str) -> bool {
        if self.host_only {
            self.domain == host
        } else {
            domain_matches(host, &self.domain)
        }
    }

    fn same_slot(&self, other: &StoredCookie) -> bool {
        self.name == other.name
            && self.domain == other.domain
            && self.host_only == other.host_only
            && self.path == other.path
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Browser cookie-store semantics over a plain list, shared by the
/// in-memory and file-backed jars.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieSet {
    cookies: Vec<StoredCookie>,
}

impl CookieSet {
    /// Apply a write from `host` at time `now`.
    pub fn apply(
        &mut self,
        host: &str,
        cookie: &SetCookie,
        now: DateTime<Utc>,
    ) -> Result<(), ConsentError> {
        let host = normalize_host(host);
        let (domain, host_only) = match &cookie.domain {
            Some(attr) => {
                let domain = normalize_host(attr.trim_start_matches('.'));
                if !domain_matches(&host, &domain) {
                    return Err(ConsentError::CookieRejected {
                        host,
                        reason: format!("domain {} does not cover host", attr),
                    });
                }
                (domain, false)
            }
            None => (host, true),
        };

        // Out-of-range lifetimes are stored as session cookies.
        let expires_at = cookie.max_age.and_then(|age| {
            chrono::Duration::from_std(age)
                .ok()
                .and_then(|age| now.checked_add_signed(age))
        });

        let stored = StoredCookie {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain,
            host_only,
            path: cookie.path.clone(),
            expires_at,
        };

        self.cookies.retain(|c| !c.same_slot(&stored));
        if !stored.is_expired(now) {
            self.cookies.push(stored);
        }
        self.cookies.retain(|c| !c.is_expired(now));
        Ok(())
    }

    /// `name=value` pairs visible to `host`, joined like `document.cookie`.
    pub fn header_for(&self, host: &str, now: DateTime<Utc>) -> String {
        let host = normalize_host(host);
        self.cookies
            .iter()
            .filter(|c| !c.is_expired(now) && c.visible_to(&host))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Number of stored cookies, including ones another host cannot see.
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// In-memory cookie jar.
pub struct MemoryCookieJar {
    clock: Arc<dyn Clock>,
    cookies: Mutex<CookieSet>,
}

impl MemoryCookieJar {
    /// Empty jar using wall-clock time for expiry.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty jar with an injected clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            cookies: Mutex::new(CookieSet::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CookieSet>, ConsentError> {
        self.cookies
            .lock()
            .map_err(|_| ConsentError::StorageIO("cookie jar lock poisoned".to_string()))
    }
}

impl Default for MemoryCookieJar {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryCookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCookieJar")
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}

impl CookieJar for MemoryCookieJar {
    fn cookie_header(&self, host: &str) -> Result<String, ConsentError> {
        Ok(self.lock()?.header_for(host, self.clock.now_utc()))
    }

    fn set_cookie(&self, host: &str, cookie: &SetCookie) -> Result<(), ConsentError> {
        debug!(host = %host, cookie = %cookie, "set cookie");
        self.lock()?.apply(host, cookie, self.clock.now_utc())
    }
}

/// In-memory local storage for one origin.
#[derive(Debug, Default)]
pub struct MemoryLocalStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryLocalStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, ConsentError> {
        self.items
            .lock()
            .map_err(|_| ConsentError::StorageIO("local storage lock poisoned".to_string()))
    }
}

impl LegacyStorage for MemoryLocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, ConsentError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), ConsentError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), ConsentError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// The document a page runs in: its host, the cookie jar, and (optionally)
/// the origin's local storage.
#[derive(Clone)]
pub struct BrowserContext {
    host: String,
    cookies: Arc<dyn CookieJar>,
    local_storage: Option<Arc<dyn LegacyStorage>>,
}

impl BrowserContext {
    /// Context for a page on `host`.
    pub fn new(host: impl Into<String>, cookies: Arc<dyn CookieJar>) -> Self {
        Self {
            host: normalize_host(&host.into()),
            cookies,
            local_storage: None,
        }
    }

    /// Context for the page at `page_url` (e.g. `https://app.sky.money/faq`).
    pub fn from_url(page_url: &str, cookies: Arc<dyn CookieJar>) -> Result<Self, ConsentError> {
        let url = url::Url::parse(page_url)
            .map_err(|e| ConsentError::ConfigError(format!("Invalid page URL: {}", e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| ConsentError::ConfigError(format!("Page URL has no host: {}", page_url)))?;
        Ok(Self::new(host.trim_start_matches('[').trim_end_matches(']'), cookies))
    }

    /// Attach the origin's local storage.
    pub fn with_local_storage(mut self, storage: Arc<dyn LegacyStorage>) -> Self {
        self.local_storage = Some(storage);
        self
    }

    /// The page host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The cookie jar.
    pub fn cookies(&self) -> &dyn CookieJar {
        self.cookies.as_ref()
    }

    /// The origin's local storage, when the environment has one.
    pub fn local_storage(&self) -> Option<&dyn LegacyStorage> {
        self.local_storage.as_deref()
    }
}

impl fmt::Debug for BrowserContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserContext")
            .field("host", &self.host)
            .field("local_storage", &self.local_storage.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use std::time::Duration;

    fn domain_cookie(value: &str) -> SetCookie {
        SetCookie::new("sky_consent", value)
            .domain(Some(".sky.money".to_string()))
            .max_age(Duration::from_secs(3600))
    }

    #[test]
    fn domain_cookie_is_shared_with_siblings() {
        let jar = MemoryCookieJar::new();
        jar.set_cookie("sky.money", &domain_cookie("a")).unwrap();

        assert_eq!(jar.cookie_header("app.sky.money").unwrap(), "sky_consent=a");
        assert_eq!(jar.cookie_header("docs.sky.money").unwrap(), "sky_consent=a");
        assert_eq!(jar.cookie_header("evil-sky.money").unwrap(), "");
    }

    #[test]
    fn host_only_cookie_stays_on_host() {
        let jar = MemoryCookieJar::new();
        jar.set_cookie("localhost", &SetCookie::new("sky_consent", "a"))
            .unwrap();

        assert_eq!(jar.cookie_header("localhost").unwrap(), "sky_consent=a");
        assert_eq!(jar.cookie_header("app.localhost").unwrap(), "");
    }

    #[test]
    fn foreign_domain_is_rejected() {
        let jar = MemoryCookieJar::new();
        let cookie = SetCookie::new("sky_consent", "a").domain(Some(".other.org".to_string()));
        assert!(matches!(
            jar.set_cookie("app.sky.money", &cookie),
            Err(ConsentError::CookieRejected { .. })
        ));
    }

    #[test]
    fn same_slot_is_replaced() {
        let jar = MemoryCookieJar::new();
        jar.set_cookie("app.sky.money", &domain_cookie("a")).unwrap();
        jar.set_cookie("docs.sky.money", &domain_cookie("b")).unwrap();

        assert_eq!(jar.cookie_header("sky.money").unwrap(), "sky_consent=b");
    }

    #[test]
    fn cookies_expire_by_clock() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let jar = MemoryCookieJar::with_clock(clock.clone());
        jar.set_cookie("sky.money", &domain_cookie("a")).unwrap();

        clock.advance(chrono::Duration::minutes(59));
        assert_eq!(jar.cookie_header("sky.money").unwrap(), "sky_consent=a");

        clock.advance(chrono::Duration::minutes(1));
        assert_eq!(jar.cookie_header("sky.money").unwrap(), "");
    }

    #[test]
    fn zero_max_age_deletes() {
        let jar = MemoryCookieJar::new();
        jar.set_cookie("sky.money", &domain_cookie("a")).unwrap();
        let removal = SetCookie::new("sky_consent", "")
            .domain(Some(".sky.money".to_string()))
            .max_age(Duration::ZERO);
        jar.set_cookie("app.sky.money", &removal).unwrap();

        assert_eq!(jar.cookie_header("sky.money").unwrap(), "");
    }

    #[test]
    fn local_storage_round_trip() {
        let storage = MemoryLocalStorage::new();
        storage.set_item("cookie_consent", "accepted").unwrap();
        assert_eq!(
            storage.get_item("cookie_consent").unwrap().as_deref(),
            Some("accepted")
        );
        storage.remove_item("cookie_consent").unwrap();
        storage.remove_item("cookie_consent").unwrap();
        assert_eq!(storage.get_item("cookie_consent").unwrap(), None);
    }

    #[test]
    fn context_from_url_extracts_host() {
        let jar: Arc<dyn CookieJar> = Arc::new(MemoryCookieJar::new());
        let ctx = BrowserContext::from_url("https://App.Sky.Money/faq?x=1", jar.clone()).unwrap();
        assert_eq!(ctx.host(), "app.sky.money");
        assert!(ctx.local_storage().is_none());

        assert!(BrowserContext::from_url("not a url", jar).is_err());
    }
}
