//! Tests for sender identity normalization

use super::*;
use crate::tests::test_util;

#[test]
fn test_email_is_trimmed_and_lowercased() {
    test_util::setup();
    let identity = normalize_sender(Some("  Bob@GMAIL.com "), None, None);
    assert_eq!(identity.email.as_deref(), Some("bob@gmail.com"));
}

#[test]
fn test_blank_email_is_none() {
    test_util::setup();
    let identity = normalize_sender(Some("   "), Some("Bob"), None);
    assert_eq!(identity.email, None);
}

#[test]
fn test_channel_key_prefers_platform_id() {
    test_util::setup();
    let identity = normalize_sender(Some("bob@gmail.com"), Some("Bob Marley"), Some("wa-5511999"));
    assert_eq!(identity.channel_key, "wa-5511999");
}

#[test]
fn test_channel_key_falls_back_to_email() {
    test_util::setup();
    let identity = normalize_sender(Some("Bob@Gmail.com"), Some("Bob Marley"), None);
    assert_eq!(identity.channel_key, "bob@gmail.com");
}

#[test]
fn test_channel_key_falls_back_to_name() {
    test_util::setup();
    let identity = normalize_sender(None, Some(" Bob Marley "), Some("  "));
    assert_eq!(identity.channel_key, "Bob Marley");
}

#[test]
fn test_channel_key_sentinel_when_nothing_usable() {
    test_util::setup();
    let identity = normalize_sender(None, None, None);
    assert_eq!(identity.channel_key, UNKNOWN_CHANNEL_KEY);

    let identity = normalize_sender(Some(" "), Some(""), Some("   "));
    assert_eq!(identity.channel_key, UNKNOWN_CHANNEL_KEY);
}

#[test]
fn test_display_name_prefers_sender_name() {
    test_util::setup();
    let identity = normalize_sender(Some("bob@gmail.com"), Some("Bob Marley"), Some("ig-123"));
    assert_eq!(identity.display_name, "Bob Marley");
}

#[test]
fn test_display_name_falls_back_to_email_then_key() {
    test_util::setup();
    let identity = normalize_sender(Some("Bob@gmail.com"), None, Some("ig-123"));
    assert_eq!(identity.display_name, "bob@gmail.com");

    let identity = normalize_sender(None, None, Some("ig-123"));
    assert_eq!(identity.display_name, "ig-123");

    let identity = normalize_sender(None, None, None);
    assert_eq!(identity.display_name, UNKNOWN_CHANNEL_KEY);
}

#[test]
fn test_name_split_on_first_whitespace() {
    test_util::setup();
    let identity = normalize_sender(None, Some("Bob Marley Jr"), None);
    assert_eq!(identity.first_name.as_deref(), Some("Bob"));
    assert_eq!(identity.last_name.as_deref(), Some("Marley Jr"));
}

#[test]
fn test_single_token_name_has_no_last_name() {
    test_util::setup();
    let identity = normalize_sender(None, Some("Madonna"), None);
    assert_eq!(identity.first_name.as_deref(), Some("Madonna"));
    assert_eq!(identity.last_name, None);
}

#[test]
fn test_name_split_absorbs_extra_whitespace() {
    test_util::setup();
    let identity = normalize_sender(None, Some("Ana  Maria"), None);
    assert_eq!(identity.first_name.as_deref(), Some("Ana"));
    assert_eq!(identity.last_name.as_deref(), Some("Maria"));
}

#[test]
fn test_absent_name_leaves_both_parts_none() {
    test_util::setup();
    let identity = normalize_sender(Some("bob@gmail.com"), None, None);
    assert_eq!(identity.first_name, None);
    assert_eq!(identity.last_name, None);
}
