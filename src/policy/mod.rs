//! Consent and access policy.

pub mod access;
pub mod gate;
