//! Consent persistence: cookie format, jars, and the consent store.

pub mod file;
pub mod format;
pub mod jar;
pub mod store;
