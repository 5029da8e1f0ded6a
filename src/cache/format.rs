//! Consent cookie wire format.
//!
//! The cookie value is `encodeURIComponent(JSON.stringify(envelope))` so that
//! JavaScript applications sharing the cookie can read what we write and vice
//! versa. The domain attribute is the registrable parent domain (last two
//! labels), which makes the cookie visible on every sibling subdomain.

use crate::protocol::models::StorageEnvelope;
use crate::ConsentError;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt;
use std::time::Duration;
use url::Host;

/// Characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode a string the way `encodeURIComponent` does.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Reverse of [`encode_component`].
pub fn decode_component(raw: &str) -> Result<String, ConsentError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| ConsentError::CorruptRecord(format!("invalid percent-encoding: {}", e)))
}

/// Encode an envelope as a cookie value.
pub fn encode_envelope(envelope: &StorageEnvelope) -> Result<String, ConsentError> {
    Ok(encode_component(&envelope.to_json()?))
}

/// Decode a cookie value into an envelope.
pub fn decode_envelope(raw: &str) -> Result<StorageEnvelope, ConsentError> {
    StorageEnvelope::from_json(&decode_component(raw)?)
}

/// Find a cookie's raw value in a `document.cookie`-style string.
pub fn find_cookie<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header.split(';').find_map(|pair| {
        pair.trim()
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('='))
    })
}

/// Domain attribute for cross-subdomain cookies on `host`.
///
/// Returns `.sky.money` for `app.sky.money`, and `None` (host-only) for
/// `localhost`, IP literals and single-label hosts.
///
/// Only the last two labels are kept; the public suffix list is not
/// consulted. Under a multi-label suffix such as `shop.example.co.uk` the
/// result is `.co.uk`, which browsers reject; such deployments set
/// [`ConsentConfig::cookie_domain`](crate::ConsentConfig::cookie_domain).
pub fn cookie_domain(host: &str) -> Option<String> {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    match Host::parse(&host) {
        Ok(Host::Domain(domain)) => {
            if domain == "localhost" {
                return None;
            }
            let labels: Vec<&str> = domain.split('.').collect();
            if labels.len() < 2 {
                return None;
            }
            Some(format!(".{}", labels[labels.len() - 2..].join(".")))
        }
        _ => None,
    }
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    /// Sent on top-level cross-site navigations.
    #[default]
    Lax,
    /// Same-site requests only.
    Strict,
    /// Always sent (requires `Secure`).
    None,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::Strict => "Strict",
            SameSite::None => "None",
        }
    }
}

/// A cookie write, equivalent to one `document.cookie = "..."` assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    /// Cookie name.
    pub name: String,
    /// Already-encoded value.
    pub value: String,
    /// Domain attribute; `None` makes a host-only cookie.
    pub domain: Option<String>,
    /// Path attribute.
    pub path: String,
    /// `max-age`; zero deletes the cookie, `None` makes a session cookie.
    pub max_age: Option<Duration>,
    /// `SameSite` attribute.
    pub same_site: SameSite,
    /// `Secure` attribute.
    pub secure: bool,
}

impl SetCookie {
    /// A script-readable cookie on path `/` with `SameSite=Lax`.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: "/".to_string(),
            max_age: None,
            same_site: SameSite::Lax,
            secure: false,
        }
    }

    /// Set the domain attribute.
    pub fn domain(mut self, domain: Option<String>) -> Self {
        self.domain = domain;
        self
    }

    /// Set `max-age`.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Whether this write deletes the cookie.
    pub fn is_removal(&self) -> bool {
        self.max_age.is_some_and(|age| age.is_zero())
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(domain) = &self.domain {
            write!(f, "; domain={}", domain)?;
        }
        write!(f, "; path={}", self.path)?;
        if let Some(max_age) = self.max_age {
            write!(f, "; max-age={}", max_age.as_secs())?;
        }
        write!(f, "; SameSite={}", self.same_site.as_str())?;
        if self.secure {
            f.write_str("; Secure")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_encoding_matches_javascript() {
        assert_eq!(
            encode_component(r#"{"posthog":true}"#),
            "%7B%22posthog%22%3Atrue%7D"
        );
        assert_eq!(encode_component("a-b_c.d!e~f*g'h(i)"), "a-b_c.d!e~f*g'h(i)");
        assert_eq!(encode_component("a b;c"), "a%20b%3Bc");
    }

    #[test]
    fn decodes_javascript_encoded_value() {
        let envelope = decode_envelope("%7B%22posthog%22%3Atrue%2C%22tarmac%22%3Afalse%7D").unwrap();
        assert_eq!(envelope.len(), 2);
    }

    #[test]
    fn undecodable_value_is_corrupt() {
        assert!(matches!(
            decode_envelope("%FF%FE"),
            Err(ConsentError::CorruptRecord(_))
        ));
        assert!(matches!(
            decode_envelope("not-json"),
            Err(ConsentError::CorruptRecord(_))
        ));
    }

    #[test]
    fn finds_cookie_among_others() {
        let header = "theme=dark; sky_consent=%7B%7D; sky_consent_old=x";
        assert_eq!(find_cookie(header, "sky_consent"), Some("%7B%7D"));
        assert_eq!(find_cookie(header, "theme"), Some("dark"));
        assert_eq!(find_cookie(header, "sky"), None);
        assert_eq!(find_cookie("", "sky_consent"), None);
    }

    #[test]
    fn cookie_domain_uses_parent_domain() {
        assert_eq!(cookie_domain("app.sky.money").as_deref(), Some(".sky.money"));
        assert_eq!(cookie_domain("sky.money").as_deref(), Some(".sky.money"));
        assert_eq!(cookie_domain("a.b.docs.sky.money").as_deref(), Some(".sky.money"));
        assert_eq!(cookie_domain("APP.Sky.Money.").as_deref(), Some(".sky.money"));
    }

    #[test]
    fn cookie_domain_is_host_only_for_local_hosts() {
        assert_eq!(cookie_domain("localhost"), None);
        assert_eq!(cookie_domain("127.0.0.1"), None);
        assert_eq!(cookie_domain("[::1]"), None);
        assert_eq!(cookie_domain("intranet"), None);
    }

    #[test]
    fn cookie_domain_does_not_know_public_suffixes() {
        // Browsers refuse this domain; multi-label suffixes need an explicit one.
        assert_eq!(cookie_domain("shop.example.co.uk").as_deref(), Some(".co.uk"));
    }

    #[test]
    fn set_cookie_renders_like_document_cookie() {
        let cookie = SetCookie::new("sky_consent", "%7B%7D")
            .domain(Some(".sky.money".to_string()))
            .max_age(Duration::from_secs(31_536_000));
        assert_eq!(
            cookie.to_string(),
            "sky_consent=%7B%7D; domain=.sky.money; path=/; max-age=31536000; SameSite=Lax"
        );
        assert!(!cookie.is_removal());
    }

    #[test]
    fn zero_max_age_is_removal() {
        let cookie = SetCookie::new("sky_consent", "").max_age(Duration::ZERO);
        assert!(cookie.is_removal());
        assert_eq!(cookie.to_string(), "sky_consent=; path=/; max-age=0; SameSite=Lax");
    }
}
