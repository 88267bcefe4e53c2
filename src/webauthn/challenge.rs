//! Challenge and user handle generation
//!
//! Both values come straight from the operating system's CSPRNG. A failing
//! entropy source is reported as [`CeremonyError::InternalEntropyFailure`]
//! rather than panicking, so the caller can abort the ceremony cleanly.

use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use super::codec;
use super::errors::CeremonyError;

/// Shortest challenge we are willing to issue
pub const MIN_CHALLENGE_SIZE: usize = 16;

/// Default challenge size, matching what deployed authenticators are tested with
pub const DEFAULT_CHALLENGE_SIZE: usize = 128;

/// A single-use random challenge
///
/// Deliberately not `Clone`: a challenge travels from the option builder into
/// the session and is consumed by exactly one verification.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge(#[serde(with = "codec::serde_bytes")] Vec<u8>);

impl Challenge {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Wire representation sent to the client
    #[must_use]
    pub fn encoded(&self) -> String {
        codec::encode(&self.0)
    }

    /// Rebuild a challenge from its wire form (e.g. when read back from a session)
    ///
    /// # Errors
    /// Returns `MalformedInput` if the value is not valid base64.
    pub fn from_encoded(value: &str) -> Result<Self, CeremonyError> {
        codec::decode(value, "challenge").map(Self)
    }

    /// Byte-for-byte comparison against a challenge echoed back by the client
    #[must_use]
    pub fn matches(&self, received: &[u8]) -> bool {
        self.0.as_slice() == received
    }
}

/// Generate a fresh challenge of `length` bytes
///
/// # Errors
/// Returns `InvalidInput` for lengths below [`MIN_CHALLENGE_SIZE`] and
/// `InternalEntropyFailure` if the system random source fails.
pub fn new_challenge(length: usize) -> Result<Challenge, CeremonyError> {
    if length < MIN_CHALLENGE_SIZE {
        return Err(CeremonyError::InvalidInput(format!(
            "Challenge must be at least {MIN_CHALLENGE_SIZE} bytes"
        )));
    }
    random_bytes(length).map(Challenge)
}

/// Generate an opaque user handle of `length` bytes
///
/// # Errors
/// Returns `InternalEntropyFailure` if the system random source fails.
pub fn generate_user_handle(length: usize) -> Result<Vec<u8>, CeremonyError> {
    random_bytes(length)
}

fn random_bytes(length: usize) -> Result<Vec<u8>, CeremonyError> {
    let mut bytes = vec![0u8; length];
    SystemRandom::new().fill(&mut bytes).map_err(|_| {
        log::error!("System random source failed while generating {length} bytes");
        CeremonyError::InternalEntropyFailure
    })?;
    Ok(bytes)
}
