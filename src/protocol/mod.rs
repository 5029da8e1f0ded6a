//! Persisted consent formats and remote check payloads.

pub mod models;
