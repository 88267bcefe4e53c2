//! Fake credential stores for failure-path tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::credentials::{CredentialRecord, CredentialStore, MemoryStore, StoreError};

/// Store that forwards to an in-memory store until switched off, then
/// either fails or stalls every call
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
    stall: Option<Duration>,
}

impl FlakyStore {
    /// Failing calls return an I/O error immediately
    #[must_use]
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            failing: AtomicBool::new(false),
            stall: None,
        })
    }

    /// Failing calls hang for `delay` before answering
    #[must_use]
    pub fn stalling(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            failing: AtomicBool::new(false),
            stall: Some(delay),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    async fn check(&self) -> Result<(), StoreError> {
        if !self.failing.load(Ordering::SeqCst) {
            return Ok(());
        }
        match self.stall {
            Some(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            None => Err(StoreError::Io(std::io::Error::other("store offline"))),
        }
    }
}

#[async_trait]
impl CredentialStore for FlakyStore {
    async fn get(&self, username: &str) -> Result<Option<CredentialRecord>, StoreError> {
        self.check().await?;
        self.inner.get(username).await
    }

    async fn get_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> Result<Option<CredentialRecord>, StoreError> {
        self.check().await?;
        self.inner.get_by_credential_id(credential_id).await
    }

    async fn put(&self, record: CredentialRecord) -> Result<(), StoreError> {
        self.check().await?;
        self.inner.put(record).await
    }
}
