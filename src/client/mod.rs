//! HTTP clients for remote checks.

pub mod http;
