//! Record store capability
//!
//! Any durable key/value mechanism can back the record manager as long as it
//! offers these three operations and reports success only once the write is
//! durable.

use async_trait::async_trait;
use thiserror::Error;

use super::record::CredentialRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt store document: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Credential id already enrolled")]
    CredentialIdTaken,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look a record up by username
    async fn get(&self, username: &str) -> Result<Option<CredentialRecord>, StoreError>;

    /// Look a record up by credential id
    async fn get_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> Result<Option<CredentialRecord>, StoreError>;

    /// Insert or replace the record for `record.username`
    async fn put(&self, record: CredentialRecord) -> Result<(), StoreError>;
}
