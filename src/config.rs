//! Consentgate configuration.

use crate::policy::access::FailurePolicy;
use crate::ConsentError;
use std::time::Duration;

/// Configuration for the consent core.
///
/// Every cooperating application on the parent domain must agree on
/// `cookie_name`; the legacy keys only matter to the application that wrote
/// them.
#[derive(Debug, Clone)]
pub struct ConsentConfig {
    /// Application name (e.g., "marketing", "app").
    /// Registered as the `app_name` analytics super property.
    pub app_name: &'static str,

    /// Name of the shared consent cookie.
    pub cookie_name: &'static str,

    /// Oldest legacy local-storage key (bare `accepted` / `rejected`).
    pub legacy_key: &'static str,

    /// Versioned legacy local-storage key (JSON record).
    pub legacy_key_v2: &'static str,

    /// Explicit `Domain` attribute for the consent cookie (e.g.
    /// `.example.co.uk`). `None` derives it from the page host.
    pub cookie_domain: Option<&'static str>,

    /// Lifetime of the consent cookie.
    pub cookie_max_age: Duration,

    /// How long a first-time visitor browses before the banner renders.
    pub banner_delay: Duration,

    /// What the VPN/region guard does when its remote check fails.
    pub vpn_failure_policy: FailurePolicy,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            app_name: "marketing",
            cookie_name: "sky_consent",
            legacy_key: "cookie_consent",
            legacy_key_v2: "cookie_consent_v2",
            cookie_domain: None,
            cookie_max_age: Duration::from_secs(365 * 24 * 60 * 60),
            banner_delay: Duration::from_millis(3_500),
            vpn_failure_policy: FailurePolicy::FailOpen,
        }
    }
}

impl ConsentConfig {
    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), ConsentError> {
        if self.app_name.is_empty() {
            return Err(ConsentError::ConfigError(
                "app_name cannot be empty".to_string(),
            ));
        }
        if self.cookie_name.is_empty() {
            return Err(ConsentError::ConfigError(
                "cookie_name cannot be empty".to_string(),
            ));
        }
        if let Some(bad) = self
            .cookie_name
            .chars()
            .find(|c| c.is_whitespace() || c.is_control() || matches!(c, ';' | '=' | ','))
        {
            return Err(ConsentError::ConfigError(format!(
                "cookie_name contains invalid character {:?}",
                bad
            )));
        }
        if self.legacy_key.is_empty() || self.legacy_key_v2.is_empty() {
            return Err(ConsentError::ConfigError(
                "legacy storage keys cannot be empty".to_string(),
            ));
        }
        if self.legacy_key == self.legacy_key_v2 {
            return Err(ConsentError::ConfigError(
                "legacy_key and legacy_key_v2 must differ".to_string(),
            ));
        }
        if self.cookie_domain.is_some_and(|d| d.trim_start_matches('.').is_empty()) {
            return Err(ConsentError::ConfigError(
                "cookie_domain cannot be empty".to_string(),
            ));
        }
        if self.cookie_max_age.is_zero() {
            return Err(ConsentError::ConfigError(
                "cookie_max_age must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ConsentConfig::default().validate().is_ok());
    }

    #[test]
    fn default_cookie_lives_one_year() {
        assert_eq!(
            ConsentConfig::default().cookie_max_age.as_secs(),
            31_536_000
        );
    }

    #[test]
    fn rejects_cookie_name_with_separator() {
        let config = ConsentConfig {
            cookie_name: "sky;consent",
            ..ConsentConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConsentError::ConfigError(msg)) if msg.contains("';'")
        ));
    }

    #[test]
    fn rejects_identical_legacy_keys() {
        let config = ConsentConfig {
            legacy_key: "cookie_consent",
            legacy_key_v2: "cookie_consent",
            ..ConsentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_cookie_domain() {
        let config = ConsentConfig {
            cookie_domain: Some("."),
            ..ConsentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_max_age() {
        let config = ConsentConfig {
            cookie_max_age: Duration::ZERO,
            ..ConsentConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
