//! Basic smoke test to verify the public surface.

#[test]
fn crate_compiles() {
    // If this test runs, the crate skeleton is valid.
    let _ = std::any::type_name::<consentgate::ConsentConfig>();
    let _ = std::any::type_name::<consentgate::ConsentError>();
    let _ = std::any::type_name::<consentgate::ConsentManager>();
}

#[test]
fn default_config_is_valid() {
    let config = consentgate::ConsentConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.cookie_name, "sky_consent");
}
