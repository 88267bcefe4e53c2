//! Collected client data
//!
//! The browser serialises `{type, challenge, origin, ...}` as JSON and the
//! authenticator signs its SHA-256 hash. We keep the raw bytes around for
//! that hash and parse just the fields we check.

use ring::digest;
use serde::Deserialize;

use super::codec;
use super::errors::CeremonyError;

pub const TYPE_CREATE: &str = "webauthn.create";
pub const TYPE_GET: &str = "webauthn.get";

#[derive(Deserialize)]
struct RawClientData {
    #[serde(rename = "type")]
    ceremony_type: String,
    challenge: String,
    origin: String,
}

/// Decoded client data plus its hash
#[derive(Debug)]
pub struct ClientData {
    pub ceremony_type: String,
    /// Challenge bytes as echoed by the client
    pub challenge: Vec<u8>,
    pub origin: String,
    pub hash: [u8; 32],
}

impl ClientData {
    /// Decode the wire field and parse the JSON inside it
    ///
    /// # Errors
    /// Returns `MalformedInput` if the encoding, JSON or embedded challenge is invalid.
    pub fn parse(client_data_json_b64: &str) -> Result<Self, CeremonyError> {
        let bytes = codec::decode(client_data_json_b64, "client data")?;
        Self::from_bytes(&bytes)
    }

    /// Parse already-decoded client data bytes
    ///
    /// # Errors
    /// Returns `MalformedInput` if the JSON or embedded challenge is invalid.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CeremonyError> {
        let raw: RawClientData = serde_json::from_slice(bytes)
            .map_err(|e| CeremonyError::MalformedInput(format!("Invalid client data JSON: {e}")))?;

        let challenge = codec::decode(&raw.challenge, "client data challenge")?;

        let mut hash = [0u8; 32];
        hash.copy_from_slice(digest::digest(&digest::SHA256, bytes).as_ref());

        Ok(Self {
            ceremony_type: raw.ceremony_type,
            challenge,
            origin: raw.origin,
            hash,
        })
    }
}
