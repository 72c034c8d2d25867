use super::*;

#[test]
fn env_parse_missing_returns_default() {
    let val: u64 = env_parse("__SV_TEST_NONEXISTENT_KEY__", 42);
    assert_eq!(val, 42);
}

#[test]
fn env_parse_present_valid() {
    unsafe { std::env::set_var("__SV_TEST_EP_VALID__", "true") };
    let val: bool = env_parse("__SV_TEST_EP_VALID__", false);
    assert!(val);
    unsafe { std::env::remove_var("__SV_TEST_EP_VALID__") };
}

#[test]
fn env_parse_present_invalid_returns_default() {
    unsafe { std::env::set_var("__SV_TEST_EP_INVALID__", "soon") };
    let val: u64 = env_parse("__SV_TEST_EP_INVALID__", 7);
    assert_eq!(val, 7);
    unsafe { std::env::remove_var("__SV_TEST_EP_INVALID__") };
}

#[test]
fn new_uses_four_second_ping_debounce() {
    let config = ClientConfig::new("ws://example.test");
    assert_eq!(config.server_url, "ws://example.test");
    assert_eq!(config.ping_debounce, Duration::from_secs(4));
    assert!(!config.log_messages);
    assert!(config.session_file.is_none());
}
