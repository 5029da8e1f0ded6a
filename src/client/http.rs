//! Reqwest-based client for the VPN / region check.
//!
//! The auth service answers `GET {auth_url}/ip/status` with the visitor's
//! VPN and region status for the requesting IP.

use crate::config::ConsentConfig;
use crate::protocol::models::{parse_vpn_status, VpnStatus};
use crate::ConsentError;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Anything that can answer the VPN / region question.
pub trait VpnChecker {
    /// Ask the remote service about the current visitor.
    fn check(&self) -> Result<VpnStatus, ConsentError>;
}

/// VPN check HTTP client.
pub struct VpnCheckClient {
    client: Client,
    user_agent: String,
    status_url: Url,
    timeout: Duration,
}

impl VpnCheckClient {
    /// Create a client for the auth service at `auth_url`.
    pub fn new(auth_url: &str, config: &ConsentConfig) -> Result<Self, ConsentError> {
        let status_url = status_url(auth_url)?;
        let timeout = Duration::from_secs(10);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConsentError::Transport(format!("Failed to create client: {}", e)))?;

        Ok(Self {
            client,
            user_agent: build_user_agent(config),
            status_url,
            timeout,
        })
    }

    /// Set request timeout.
    pub fn try_with_timeout(mut self, timeout: Duration) -> Result<Self, ConsentError> {
        self.timeout = timeout;
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConsentError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(self)
    }

    /// The status endpoint.
    pub fn status_url(&self) -> &Url {
        &self.status_url
    }

    /// The request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl VpnChecker for VpnCheckClient {
    fn check(&self) -> Result<VpnStatus, ConsentError> {
        let response = self
            .client
            .get(self.status_url.clone())
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|e| ConsentError::Transport(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConsentError::Transport(format!(
                "VPN check returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response
            .bytes()
            .map_err(|e| ConsentError::Transport(format!("Failed to read body: {}", e)))?;

        let vpn_status = parse_vpn_status(&body)?;
        debug!(url = %self.status_url, ?vpn_status, "vpn check completed");
        Ok(vpn_status)
    }
}

/// Resolve the status endpoint under `auth_url`.
pub fn status_url(auth_url: &str) -> Result<Url, ConsentError> {
    if auth_url.trim().is_empty() {
        return Err(ConsentError::ConfigError(
            "auth_url cannot be empty".to_string(),
        ));
    }
    let mut base = Url::parse(auth_url)
        .map_err(|e| ConsentError::ConfigError(format!("Invalid auth_url: {}", e)))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("ip/status")
        .map_err(|e| ConsentError::ConfigError(format!("Invalid auth_url: {}", e)))
}

/// Build a User-Agent string from config.
///
/// Format: `consentgate/<version> <app>`
pub fn build_user_agent(config: &ConsentConfig) -> String {
    format!("consentgate/{} {}", env!("CARGO_PKG_VERSION"), config.app_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_url_appends_path() {
        assert_eq!(
            status_url("https://auth.sky.money").unwrap().as_str(),
            "https://auth.sky.money/ip/status"
        );
        assert_eq!(
            status_url("https://sky.money/auth").unwrap().as_str(),
            "https://sky.money/auth/ip/status"
        );
        assert_eq!(
            status_url("https://sky.money/auth/").unwrap().as_str(),
            "https://sky.money/auth/ip/status"
        );
    }

    #[test]
    fn test_status_url_rejects_bad_input() {
        assert!(matches!(status_url(""), Err(ConsentError::ConfigError(_))));
        assert!(matches!(status_url("not a url"), Err(ConsentError::ConfigError(_))));
    }

    #[test]
    fn test_build_user_agent() {
        let ua = build_user_agent(&ConsentConfig::default());
        assert_eq!(ua, format!("consentgate/{} marketing", env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_client_creation() {
        let client = VpnCheckClient::new("https://auth.sky.money", &ConsentConfig::default()).unwrap();
        assert_eq!(client.status_url().as_str(), "https://auth.sky.money/ip/status");
        assert_eq!(client.timeout(), Duration::from_secs(10));

        let client = client.try_with_timeout(Duration::from_secs(3)).unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(3));
    }
}
