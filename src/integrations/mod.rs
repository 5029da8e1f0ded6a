//! Concrete consent-gated integrations.

pub mod posthog;
pub mod script;
