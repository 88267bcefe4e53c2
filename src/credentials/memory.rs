//! In-memory record store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::record::CredentialRecord;
use super::store::{CredentialStore, StoreError};

/// Records keyed by username, lost on restart
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, CredentialRecord>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, username: &str) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self.records.read().await.get(username).cloned())
    }

    async fn get_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.credential_id == credential_id)
            .cloned())
    }

    async fn put(&self, record: CredentialRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let taken = records
            .values()
            .any(|r| r.credential_id == record.credential_id && r.username != record.username);
        if taken {
            return Err(StoreError::CredentialIdTaken);
        }
        records.insert(record.username.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(username: &str, credential_id: &[u8]) -> CredentialRecord {
        CredentialRecord {
            username: username.to_string(),
            credential_id: credential_id.to_vec(),
            raw_id: crate::webauthn::codec::encode(credential_id),
            user_handle: vec![7; 32],
            public_key: String::new(),
            algorithm: -7,
            counter: 0,
            created_at: Utc::now(),
            last_used: None,
        }
    }

    #[tokio::test]
    async fn test_put_and_lookups() {
        let store = MemoryStore::new();
        assert!(store.get("alice").await.unwrap().is_none());

        store.put(record("alice", &[1, 2, 3])).await.unwrap();
        assert_eq!(store.get("alice").await.unwrap().unwrap().username, "alice");
        assert_eq!(
            store
                .get_by_credential_id(&[1, 2, 3])
                .await
                .unwrap()
                .unwrap()
                .username,
            "alice"
        );
        assert!(store.get_by_credential_id(&[9]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_credential_id_is_globally_unique() {
        let store = MemoryStore::new();
        store.put(record("alice", &[1])).await.unwrap();
        assert!(matches!(
            store.put(record("bob", &[1])).await,
            Err(StoreError::CredentialIdTaken)
        ));
    }
}
