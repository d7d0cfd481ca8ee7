//! Property-based tests for validation and generation logic.
//!
//! Uses `proptest` to verify invariants across many random inputs.

#![allow(clippy::expect_used)]

use proptest::prelude::*;

use wimforge_cli::domain::config::{RetryPolicy, validate_config_key, validate_config_value};
use wimforge_cli::domain::workspace::{
    generate_instance_id, hex_encode, is_locale_dir, is_prunable_boot_dir, validate_instance_id,
};

// ============================================================================
// generate_instance_id() property tests
// ============================================================================

proptest! {
    /// Generated IDs are always hyphenated lowercase UUIDs that pass our own
    /// validator.
    #[test]
    fn prop_instance_id_round_trips_through_validation(_seed in 0u32..64) {
        let id = generate_instance_id();
        prop_assert_eq!(id.len(), 36, "wrong length: {}", &id);
        prop_assert!(
            id.chars().all(|c| c == '-' || c.is_ascii_hexdigit() && !c.is_ascii_uppercase()),
            "unexpected characters: {}",
            &id
        );
        prop_assert!(validate_instance_id(&id).is_ok(), "rejected own ID: {}", &id);
    }
}

#[test]
fn test_instance_id_uniqueness_batch() {
    let ids: std::collections::HashSet<_> = (0..10_000).map(|_| generate_instance_id()).collect();
    assert_eq!(ids.len(), 10_000, "duplicate IDs generated");
}

// ============================================================================
// hex_encode() property tests
// ============================================================================

proptest! {
    /// Output is always twice the input length and lowercase hex only.
    #[test]
    fn prop_hex_encode_shape(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let encoded = hex_encode(&bytes);
        prop_assert_eq!(encoded.len(), bytes.len() * 2);
        prop_assert!(encoded.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    /// Encoding is injective: each byte maps to its own two output chars.
    #[test]
    fn prop_hex_encode_decodes_back(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let encoded = hex_encode(&bytes);
        let decoded: Vec<u8> = encoded
            .as_bytes()
            .chunks(2)
            .map(|pair| {
                let s = std::str::from_utf8(pair).expect("ascii");
                u8::from_str_radix(s, 16).expect("hex pair")
            })
            .collect();
        prop_assert_eq!(decoded, bytes);
    }
}

// ============================================================================
// Locale-directory classification property tests
// ============================================================================

proptest! {
    /// Well-formed `ll-cc` locale names are always recognized.
    #[test]
    fn prop_two_part_locales_recognized(
        lang in "[a-z]{2,3}",
        region in "[a-z0-9]{2,4}",
    ) {
        let name = format!("{lang}-{region}");
        prop_assert!(is_locale_dir(&name));
    }

    /// Names without a hyphen are never locale directories.
    #[test]
    fn prop_hyphenless_names_rejected(name in "[a-z0-9]{1,16}") {
        prop_assert!(!is_locale_dir(&name));
    }

    /// Prunable implies locale; the preserved set is never prunable.
    #[test]
    fn prop_prunable_is_subset_of_locales(name in "[a-z0-9-]{1,12}") {
        if is_prunable_boot_dir(&name) {
            prop_assert!(is_locale_dir(&name));
            prop_assert!(!name.eq_ignore_ascii_case("en-us"));
            prop_assert!(!name.eq_ignore_ascii_case("fonts"));
            prop_assert!(!name.eq_ignore_ascii_case("resources"));
        }
    }
}

// ============================================================================
// RetryPolicy::delay_for_attempt() property tests
// ============================================================================

proptest! {
    /// Backoff never decreases from one attempt to the next, even at attempt
    /// counts large enough to saturate the multiplier.
    #[test]
    fn prop_retry_delay_is_monotonic(
        base in 0u64..60_000,
        attempt in 1u32..200,
    ) {
        let policy = RetryPolicy { max_retries: 5, base_delay_ms: base };
        prop_assert!(
            policy.delay_for_attempt(attempt + 1) >= policy.delay_for_attempt(attempt)
        );
    }

    /// The first retry waits exactly the base delay.
    #[test]
    fn prop_first_retry_uses_base_delay(base in 0u64..60_000) {
        let policy = RetryPolicy { max_retries: 5, base_delay_ms: base };
        prop_assert_eq!(
            policy.delay_for_attempt(1),
            std::time::Duration::from_millis(base)
        );
    }
}

#[test]
fn test_retry_delay_saturates_instead_of_overflowing() {
    let policy = RetryPolicy {
        max_retries: 5,
        base_delay_ms: u64::MAX,
    };
    // Must not panic; the exact value only matters in that it is huge.
    let _ = policy.delay_for_attempt(u32::MAX);
}

// ============================================================================
// Config key/value validation property tests
// ============================================================================

proptest! {
    /// Arbitrary dotted keys outside the whitelist are rejected.
    #[test]
    fn prop_arbitrary_keys_rejected(key in "[a-z]{1,20}\\.[a-z]{1,20}") {
        if validate_config_key(&key).is_ok() {
            // Only the whitelisted keys may pass.
            prop_assert!(
                key == "powershell.default_version" || key == "iso.label",
                "accepted unknown key: {key}"
            );
        }
    }

    /// Version values with letters are never accepted.
    #[test]
    fn prop_non_numeric_versions_rejected(value in "[a-z]{1,12}") {
        prop_assert!(
            validate_config_value("powershell.default_version", &value).is_err(),
            "accepted invalid version: {value}"
        );
    }
}
