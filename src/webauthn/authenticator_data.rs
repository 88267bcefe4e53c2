//! Authenticator data parsing
//!
//! Layout:
//! - 32 bytes: RP ID hash
//! - 1 byte: flags
//! - 4 bytes: signature counter (big endian)
//! - variable: attested credential data (if flag AT is set)
//!   - 16 bytes: AAGUID
//!   - 2 bytes: credential ID length (L)
//!   - L bytes: credential ID
//!   - variable: COSE public key
//! - variable: extensions (if flag ED is set)

use std::io::Cursor;

use ciborium::value::Value;

use super::errors::CeremonyError;

pub const FLAG_USER_PRESENT: u8 = 0x01;
pub const FLAG_USER_VERIFIED: u8 = 0x04;
pub const FLAG_ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
pub const FLAG_EXTENSION_DATA: u8 = 0x80;

const HEADER_LEN: usize = 37;
const AAGUID_LEN: usize = 16;

/// Credential material present in registration authenticator data
#[derive(Debug, Clone)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// Raw COSE key bytes
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub counter: u32,
    pub attested_credential: Option<AttestedCredentialData>,
}

impl AuthenticatorData {
    /// Parse raw authenticator data bytes
    ///
    /// # Errors
    /// Returns `MalformedInput` if the data is truncated or the embedded COSE key
    /// is not valid CBOR.
    pub fn parse(bytes: &[u8]) -> Result<Self, CeremonyError> {
        if bytes.len() < HEADER_LEN {
            return Err(CeremonyError::MalformedInput(
                "Authenticator data too short".to_string(),
            ));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[..32]);
        let flags = bytes[32];
        let counter = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let attested_credential = if flags & FLAG_ATTESTED_CREDENTIAL_DATA == 0 {
            None
        } else {
            Some(Self::parse_attested_credential(&bytes[HEADER_LEN..])?)
        };

        Ok(Self {
            rp_id_hash,
            flags,
            counter,
            attested_credential,
        })
    }

    fn parse_attested_credential(data: &[u8]) -> Result<AttestedCredentialData, CeremonyError> {
        if data.len() < AAGUID_LEN + 2 {
            return Err(CeremonyError::MalformedInput(
                "Authenticator data too short for credential ID length".to_string(),
            ));
        }

        let mut aaguid = [0u8; 16];
        aaguid.copy_from_slice(&data[..AAGUID_LEN]);
        let id_len = usize::from(u16::from_be_bytes([data[AAGUID_LEN], data[AAGUID_LEN + 1]]));
        let id_start = AAGUID_LEN + 2;
        let key_start = id_start + id_len;

        if data.len() <= key_start {
            return Err(CeremonyError::MalformedInput(
                "Authenticator data too short for public key".to_string(),
            ));
        }

        // The COSE key is followed by optional extension data, so let the
        // decoder tell us where it ends.
        let mut cursor = Cursor::new(&data[key_start..]);
        let _: Value = ciborium::de::from_reader(&mut cursor).map_err(|_| {
            CeremonyError::MalformedInput("Invalid COSE key in authenticator data".to_string())
        })?;
        let key_len = usize::try_from(cursor.position())
            .map_err(|_| CeremonyError::MalformedInput("COSE key too large".to_string()))?;

        Ok(AttestedCredentialData {
            aaguid,
            credential_id: data[id_start..key_start].to_vec(),
            public_key: data[key_start..key_start + key_len].to_vec(),
        })
    }

    #[must_use]
    pub fn user_present(&self) -> bool {
        self.flags & FLAG_USER_PRESENT != 0
    }

    #[must_use]
    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_USER_VERIFIED != 0
    }
}
