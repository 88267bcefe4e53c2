//! Wire encoding for binary ceremony fields
//!
//! Browsers hand us a mix of encodings: `btoa` produces standard padded base64,
//! while the challenge embedded in client data is always unpadded base64url.
//! Everything we emit is unpadded base64url; everything we accept may use either
//! alphabet, with or without padding.

use base64::alphabet;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use super::errors::CeremonyError;

const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes for the wire
#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode a wire field, accepting standard or URL-safe base64
///
/// `field` names the value in the error so logs say which part was malformed.
///
/// # Errors
/// Returns `MalformedInput` if the value is not base64 in either alphabet.
pub fn decode(value: &str, field: &str) -> Result<Vec<u8>, CeremonyError> {
    let normalized: String = value
        .trim()
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    LENIENT_URL_SAFE
        .decode(normalized.as_bytes())
        .map_err(|e| CeremonyError::MalformedInput(format!("Invalid {field} encoding: {e}")))
}

/// Serde adapter storing `Vec<u8>` as a wire string
pub mod serde_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    /// # Errors
    /// Never fails for a string serializer.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(bytes))
    }

    /// # Errors
    /// Fails if the string is not base64.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = String::deserialize(deserializer)?;
        super::decode(&value, "stored field").map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    fn pseudo_random_bytes(len: usize) -> Vec<u8> {
        // Simple LCG so the test stays dependency-free and deterministic
        let mut state: u32 = 0x1234_5678;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                state.to_be_bytes()[1]
            })
            .collect()
    }

    #[test]
    fn test_round_trip_lengths() {
        for len in [0usize, 1, 16, 128, 4096] {
            let bytes = pseudo_random_bytes(len);
            let wire = encode(&bytes);
            assert_eq!(decode(&wire, "test").unwrap(), bytes, "length {len}");
        }
    }

    #[test]
    fn test_decodes_standard_padded_alphabet() {
        let bytes = vec![0xfb, 0xff, 0xbf, 0x00];
        let standard = STANDARD.encode(&bytes);
        assert!(standard.contains('+') || standard.contains('/'));
        assert!(standard.ends_with('='));
        assert_eq!(decode(&standard, "rawId").unwrap(), bytes);
    }

    #[test]
    fn test_encode_is_unpadded_url_safe() {
        let wire = encode(&[0xfb, 0xff, 0xbf, 0x00]);
        assert!(!wire.contains('='));
        assert!(!wire.contains('+'));
        assert!(!wire.contains('/'));
    }

    #[test]
    fn test_invalid_input_is_malformed() {
        let err = decode("not*base64!", "signature").unwrap_err();
        match err {
            CeremonyError::MalformedInput(msg) => assert!(msg.contains("signature")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
