//! Persisted credential record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::webauthn::codec::serde_bytes;

/// One enrolled credential, owned by exactly one username
///
/// `credential_id` and `user_handle` never change after creation; `counter`
/// only moves forward.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CredentialRecord {
    pub username: String,
    #[serde(rename = "id", with = "serde_bytes")]
    pub credential_id: Vec<u8>,
    /// `rawId` exactly as the client sent it at registration
    #[serde(rename = "rawId")]
    pub raw_id: String,
    #[serde(rename = "userHandle", with = "serde_bytes")]
    pub user_handle: Vec<u8>,
    /// SPKI PEM
    #[serde(rename = "publicKey")]
    pub public_key: String,
    pub algorithm: i64,
    pub counter: u32,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}
