use printstream_license::{KeyCodec, decode_days, encode_days, hash32};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const HEX: &[u8] = b"0123456789abcdef";

// ── Hash and day encoding ───────────────────────────────────────

#[test]
fn hash32_empty_and_single_char() {
    assert_eq!(hash32(""), "00000000");
    assert_eq!(hash32("a"), "00000061");
    assert_eq!(hash32("ab"), format!("{:08x}", 97 * 31 + 98));
}

#[test]
fn hash32_wraps_and_stays_eight_chars() {
    let long = "customer-with-a-rather-long-identifier-".repeat(20);
    let hash = hash32(&long);
    assert_eq!(hash.len(), 8);
    assert!(hash.bytes().all(|b| b.is_ascii_hexdigit()));
    assert_eq!(hash, hash32(&long));
}

#[test]
fn hash32_uses_utf16_code_units() {
    // U+1F600 is a surrogate pair: 0xD83D, 0xDE00.
    let expected = (0xD83Di32).wrapping_mul(31).wrapping_add(0xDE00);
    assert_eq!(hash32("\u{1F600}"), format!("{:08x}", expected.unsigned_abs()));
}

#[test]
fn encode_days_scales_and_pads() {
    assert_eq!(encode_days(1), "1eef");
    assert_eq!(encode_days(0), "0000");
    assert_eq!(encode_days(365), "2c1ac3");
}

#[test]
fn decode_days_inverts_encode() {
    for days in [1, 7, 30, 365, 3650] {
        assert_eq!(decode_days(&encode_days(days)), Some(u64::from(days)));
    }
}

#[test]
fn decode_days_floors_foreign_values() {
    assert_eq!(decode_days("1ef0"), Some(1));
    assert_eq!(decode_days("0001"), Some(0));
    assert_eq!(decode_days("zz"), None);
}

// ── Generate / validate ─────────────────────────────────────────

#[test]
fn generated_keys_validate_with_their_days() {
    let codec = KeyCodec::default();
    for days in [1, 7, 30, 365] {
        for customer in ["acme", "customer-42", "Søren ApS"] {
            let key = codec.generate_key(days, customer);
            let result = codec.validate_key(&key);
            assert!(result.valid, "{key} should be valid");
            assert_eq!(result.days, Some(days));
        }
    }
}

#[test]
fn generated_key_has_four_segments() {
    let key = KeyCodec::default().generate_key(30, "acme");
    let parts: Vec<&str> = key.split('-').collect();
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[0], &hash32("acme")[..4]);
    assert_eq!(parts[1], encode_days(30));
    assert_eq!(parts[2].len(), 4);
    assert_eq!(parts[3].len(), 4);
}

#[test]
fn long_day_segment_is_accepted() {
    let codec = KeyCodec::default();
    let key = codec.generate_key(3650, "acme");
    assert!(key.split('-').nth(1).unwrap().len() > 4);
    assert_eq!(codec.validate_key(&key).days, Some(3650));
}

#[test]
fn validation_ignores_case_and_whitespace() {
    let codec = KeyCodec::default();
    let key = codec.generate_key(30, "acme");
    let result = codec.validate_key(&format!("  {}\n", key.to_uppercase()));
    assert!(result.valid);
    assert_eq!(result.days, Some(30));
}

#[test]
fn zero_day_key_is_invalid() {
    let codec = KeyCodec::default();
    let key = codec.generate_key(0, "acme");
    let result = codec.validate_key(&key);
    assert!(!result.valid);
    assert_eq!(result.days, None);
}

#[test]
fn wrong_segment_count_is_invalid() {
    let codec = KeyCodec::default();
    let key = codec.generate_key(30, "acme");
    let parts: Vec<&str> = key.split('-').collect();

    let three = parts[..3].join("-");
    let five = format!("{key}-abcd");
    for bad in ["", "abcd", "abcd-1eef", three.as_str(), five.as_str(), "a-b-c-d-e-f"] {
        assert!(!codec.validate_key(bad).valid, "{bad:?} should be invalid");
    }
}

#[test]
fn non_hex_segments_are_invalid() {
    let codec = KeyCodec::default();
    assert!(!codec.validate_key("zzzz-1eef-0000-0000").valid);
    assert!(!codec.validate_key("abcd--0000-0000").valid);
    assert!(!codec.validate_key("abcd-1eef-00000-000").valid);
}

#[test]
fn checksum_depends_on_secret() {
    let vendor = KeyCodec::new("vendor-secret");
    let other = KeyCodec::new("another-secret");
    let key = vendor.generate_key(30, "acme");
    assert!(vendor.validate_key(&key).valid);
    assert!(!other.validate_key(&key).valid);
}

#[test]
fn single_character_flips_are_rejected() {
    let codec = KeyCodec::default();
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for days in [1, 7, 30, 365] {
        let key = codec.generate_key(days, "flip-customer");
        let positions: Vec<usize> = key
            .char_indices()
            .filter(|(_, c)| *c != '-')
            .map(|(i, _)| i)
            .collect();

        let trials = 60;
        let mut rejected = 0;
        for _ in 0..trials {
            let pos = positions[rng.gen_range(0..positions.len())];
            let original = key.as_bytes()[pos];
            let replacement = loop {
                let candidate = HEX[rng.gen_range(0..HEX.len())];
                if candidate != original {
                    break candidate;
                }
            };
            let mut mutated = key.clone().into_bytes();
            mutated[pos] = replacement;
            let mutated = String::from_utf8(mutated).unwrap();
            if !codec.validate_key(&mutated).valid {
                rejected += 1;
            }
        }
        assert!(
            rejected * 100 >= trials * 95,
            "only {rejected}/{trials} flips rejected for {key}"
        );
    }
}
