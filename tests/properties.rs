//! Property-based tests for the normalizer and the envelope codec
//!
//! 1. **Round-trip**: open(seal(p, w), w) == p for all non-empty p
//! 2. **Tamper detection**: any flipped envelope byte fails authentication
//! 3. **Freshness**: sealing twice never yields the same envelope
//! 4. **Idempotence**: canonical secrets are only cleaned
//! 5. **Determinism**: normalize(s) is stable for all s

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use proptest::prelude::*;
use qrseal::envelope::MIN_ENVELOPE_LEN;
use qrseal::{CodecError, EnvelopeCodec, SecretFormat, clean, detect_format, normalize};
use secrecy::SecretString;

fn secret(value: &str) -> SecretString {
    SecretString::from(value)
}

fn plaintext() -> impl Strategy<Value = String> {
    "\\PC{1,64}".prop_filter("needs a visible character", |s| !s.trim().is_empty())
}

fn password() -> impl Strategy<Value = String> {
    "\\PC{8,24}"
}

// Every key derivation costs 100k rounds, keep case counts low.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_seal_open_roundtrip(p in plaintext(), w in password()) {
        let mut codec = EnvelopeCodec::new();
        let sealed = codec.seal(&p, &secret(&w)).unwrap();
        prop_assert_eq!(codec.open(&sealed, &secret(&w)).unwrap(), p);
    }

    #[test]
    fn prop_envelopes_are_fresh(p in plaintext(), w in password()) {
        let mut codec = EnvelopeCodec::new();
        let first = codec.seal(&p, &secret(&w)).unwrap();
        let second = codec.seal(&p, &secret(&w)).unwrap();
        prop_assert_ne!(&first, &second);

        let a = STANDARD.decode(&first).unwrap();
        let b = STANDARD.decode(&second).unwrap();
        prop_assert_ne!(&a[..16], &b[..16], "salt reused");
        prop_assert_ne!(&a[16..28], &b[16..28], "nonce reused");
        prop_assert_eq!(codec.open(&second, &secret(&w)).unwrap(), p);
    }

    #[test]
    fn prop_flipped_byte_fails_authentication(
        p in plaintext(),
        index in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let w = "correct horse battery staple";
        let mut codec = EnvelopeCodec::new();
        let mut bytes = STANDARD.decode(codec.seal(&p, &secret(w)).unwrap()).unwrap();
        let at = index.index(bytes.len());
        bytes[at] ^= mask;
        prop_assert_eq!(
            codec.open(&STANDARD.encode(&bytes), &secret(w)),
            Err(CodecError::AuthenticationFailed)
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_short_envelopes_are_truncated(
        bytes in prop::collection::vec(any::<u8>(), 0..MIN_ENVELOPE_LEN),
    ) {
        let codec = EnvelopeCodec::new();
        let len = bytes.len();
        prop_assert_eq!(
            codec.open(&STANDARD.encode(&bytes), &secret("correct horse battery staple")),
            Err(CodecError::TruncatedEnvelope { len, min_len: MIN_ENVELOPE_LEN })
        );
    }

    #[test]
    fn prop_canonical_input_is_only_cleaned(s in "[A-Za-z2-7][A-Za-z2-7 _-]{0,40}(=){0,6}") {
        prop_assert_eq!(detect_format(&s), SecretFormat::Canonical);
        let normalized = normalize(&s).unwrap();
        prop_assert_eq!(normalized.as_str(), clean(&s));
    }

    #[test]
    fn prop_normalize_is_deterministic(s in "\\PC{0,48}") {
        prop_assert_eq!(normalize(&s), normalize(&s));
    }

    #[test]
    fn prop_normalized_output_is_canonical(s in "\\PC{1,48}") {
        if let Ok(secret) = normalize(&s) {
            let body = secret.as_str().trim_end_matches('=');
            prop_assert!(!body.is_empty());
            let canonical = |b: u8| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b);
            prop_assert!(body.bytes().all(canonical));
        }
    }
}
