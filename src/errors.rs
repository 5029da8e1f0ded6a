//! Consentgate error types.

use thiserror::Error;

/// Errors raised inside the consent core.
///
/// These never cross the [`ConsentManager`](crate::ConsentManager) boundary:
/// the store, state and gate log them and degrade to pending or denied.
#[derive(Debug, Clone, Error)]
pub enum ConsentError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No document/storage context (e.g. server-side rendering).
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Cookie jar or local storage I/O failed.
    #[error("Storage I/O error: {0}")]
    StorageIO(String),

    /// The cookie jar refused a cookie (domain attribute does not cover the host).
    #[error("Cookie rejected for host {host}: {reason}")]
    CookieRejected {
        /// Host the cookie was written from.
        host: String,
        /// Why the jar refused it.
        reason: String,
    },

    /// Persisted consent data could not be decoded.
    #[error("Corrupt consent record: {0}")]
    CorruptRecord(String),

    /// HTTP transport error talking to a remote check.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A remote check answered with something we cannot interpret.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// A third-party integration failed.
    #[error("Integration {service} failed: {detail}")]
    Integration {
        /// Wire key of the integration's service.
        service: String,
        /// Failure detail.
        detail: String,
    },

    /// A fetched script does not match its subresource integrity value.
    #[error("Subresource integrity mismatch for {src}")]
    IntegrityMismatch {
        /// Script URL.
        src: String,
    },
}
