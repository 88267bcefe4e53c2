//! Credential record manager
//!
//! Wraps a [`CredentialStore`] with the rules the ceremonies rely on: one
//! credential per username, immutable ids, and a counter that is updated by
//! compare-and-swap under a per-username lock so concurrent logins can never
//! both pass the counter check against the same stale value.
//!
//! Writes run as their own task holding that lock. A store timeout gives up
//! waiting for the write, but the user stays locked until the write has
//! actually finished.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::OwnedMutexGuard;

use super::record::CredentialRecord;
use super::store::{CredentialStore, StoreError};
use crate::webauthn::{check_counter, CeremonyError};

/// Values needed to enrol a credential after a verified registration
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub username: String,
    pub credential_id: Vec<u8>,
    pub raw_id: String,
    pub public_key: String,
    pub algorithm: i64,
    pub user_handle: Vec<u8>,
    pub counter: u32,
}

pub struct CredentialRecordManager {
    store: Arc<dyn CredentialStore>,
    timeout: Duration,
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CredentialRecordManager {
    /// `timeout` bounds every individual store call
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// # Errors
    /// `UnknownUser` if nothing is enrolled for `username`, `StoreUnavailable`
    /// on store failure or timeout.
    pub async fn find_by_username(&self, username: &str) -> Result<CredentialRecord, CeremonyError> {
        self.bounded(self.store.get(username))
            .await?
            .ok_or_else(|| CeremonyError::UnknownUser(username.to_string()))
    }

    /// # Errors
    /// `UnknownCredential` if no record holds `credential_id`, `StoreUnavailable`
    /// on store failure or timeout.
    pub async fn find_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> Result<CredentialRecord, CeremonyError> {
        self.bounded(self.store.get_by_credential_id(credential_id))
            .await?
            .ok_or(CeremonyError::UnknownCredential)
    }

    /// Enrol a credential; only call after a verified registration
    ///
    /// # Errors
    /// `DuplicateUser` if the username already holds a record (the existing
    /// record is left untouched), `StoreUnavailable` on store failure.
    pub async fn create_record(
        &self,
        credential: NewCredential,
    ) -> Result<CredentialRecord, CeremonyError> {
        let guard = self.user_lock(&credential.username).lock_owned().await;

        if self.bounded(self.store.get(&credential.username)).await?.is_some() {
            return Err(CeremonyError::DuplicateUser(credential.username));
        }

        let record = CredentialRecord {
            username: credential.username,
            credential_id: credential.credential_id,
            raw_id: credential.raw_id,
            user_handle: credential.user_handle,
            public_key: credential.public_key,
            algorithm: credential.algorithm,
            counter: credential.counter,
            created_at: Utc::now(),
            last_used: None,
        };

        self.persist(record.clone(), guard).await?;
        log::info!("Enrolled credential for user {}", record.username);
        Ok(record)
    }

    /// Persist the counter from a verified login
    ///
    /// `record` is the snapshot the login was verified against. The update only
    /// lands if the stored counter still equals the snapshot's; otherwise
    /// another login got there first and this one is treated as a replay.
    ///
    /// # Errors
    /// `CounterReplaySuspected` for a stale snapshot or non-advancing counter,
    /// `UnknownUser` if the record vanished, `StoreUnavailable` on store failure.
    pub async fn update_counter(
        &self,
        record: &CredentialRecord,
        new_counter: u32,
    ) -> Result<CredentialRecord, CeremonyError> {
        let guard = self.user_lock(&record.username).lock_owned().await;

        let mut current = self
            .bounded(self.store.get(&record.username))
            .await?
            .ok_or_else(|| CeremonyError::UnknownUser(record.username.clone()))?;

        if current.credential_id != record.credential_id {
            return Err(CeremonyError::CredentialMismatch(
                "Stored credential changed during ceremony".to_string(),
            ));
        }
        if current.counter != record.counter {
            log::warn!(
                "Counter for user {} moved from {} to {} during ceremony",
                record.username,
                record.counter,
                current.counter
            );
            return Err(CeremonyError::CounterReplaySuspected {
                stored: current.counter,
                received: new_counter,
            });
        }
        check_counter(current.counter, new_counter)?;

        current.counter = new_counter;
        current.last_used = Some(Utc::now());
        self.persist(current.clone(), guard).await?;
        Ok(current)
    }

    /// Lock for `username`; locks nobody holds or waits on are dropped here
    fn user_lock(&self, username: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .user_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(username.to_string()).or_default())
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.user_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Write `record` on a separate task that keeps `guard` until the store
    /// call returns, whether or not we are still waiting for it
    async fn persist(
        &self,
        record: CredentialRecord,
        guard: OwnedMutexGuard<()>,
    ) -> Result<(), CeremonyError> {
        let store = Arc::clone(&self.store);
        let write = tokio::spawn(async move {
            let _guard = guard;
            store.put(record).await
        });
        self.bounded(async move {
            write
                .await
                .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
        })
        .await
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, CeremonyError> {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(StoreError::CredentialIdTaken)) => Err(CeremonyError::CredentialMismatch(
                "Credential id is already enrolled".to_string(),
            )),
            Ok(Err(e)) => {
                log::error!("Credential store failure: {e}");
                Err(CeremonyError::StoreUnavailable(e.to_string()))
            }
            Err(_) => {
                log::error!("Credential store call timed out after {:?}", self.timeout);
                Err(CeremonyError::StoreUnavailable("timeout".to_string()))
            }
        }
    }
}
