//! JSON file record store
//!
//! Keeps every record in one JSON document keyed by username, the same shape
//! as a `users.json` file. Writes go to a uniquely named sibling temp file
//! that is synced and renamed over the original, so a crash never leaves a
//! half-written document.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::record::CredentialRecord;
use super::store::{CredentialStore, StoreError};

type Document = HashMap<String, CredentialRecord>;

pub struct FileStore {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process. The guard is
    // moved into the blocking write, so it outlives a cancelled `put`.
    lock: Arc<Mutex<()>>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Document, StoreError> {
        let path = self.path.clone();
        run_blocking(move || read_document(&path)).await
    }
}

fn read_document(path: &Path) -> Result<Document, StoreError> {
    match fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Document::new()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_document(path: &Path, document: &Document) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(document)?;
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(&json)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

async fn run_blocking<T, F>(task: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn get(&self, username: &str) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self.load().await?.remove(username))
    }

    async fn get_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self
            .load()
            .await?
            .into_values()
            .find(|r| r.credential_id == credential_id))
    }

    async fn put(&self, record: CredentialRecord) -> Result<(), StoreError> {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        let path = self.path.clone();
        run_blocking(move || {
            let _guard = guard;
            let mut document = read_document(&path)?;
            let taken = document.values().any(|r| {
                r.credential_id == record.credential_id && r.username != record.username
            });
            if taken {
                return Err(StoreError::CredentialIdTaken);
            }
            document.insert(record.username.clone(), record);
            write_document(&path, &document)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(username: &str, credential_id: &[u8], counter: u32) -> CredentialRecord {
        CredentialRecord {
            username: username.to_string(),
            credential_id: credential_id.to_vec(),
            raw_id: crate::webauthn::codec::encode(credential_id),
            user_handle: vec![3; 32],
            public_key: "pem".to_string(),
            algorithm: -7,
            counter,
            created_at: Utc::now(),
            last_used: None,
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("users.json"));
        assert!(store.get("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let store = FileStore::new(&path);
        store.put(record("alice", &[1, 2], 0)).await.unwrap();
        store.put(record("bob", &[3, 4], 0)).await.unwrap();
        store.put(record("alice", &[1, 2], 9)).await.unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("alice").await.unwrap().unwrap().counter, 9);
        assert_eq!(
            reopened
                .get_by_credential_id(&[3, 4])
                .await
                .unwrap()
                .unwrap()
                .username,
            "bob"
        );
        // Only the document itself is left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, b"{ not json").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(
            store.get("alice").await,
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_credential_id_taken() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("users.json"));
        store.put(record("alice", &[1], 0)).await.unwrap();
        assert!(matches!(
            store.put(record("mallory", &[1], 0)).await,
            Err(StoreError::CredentialIdTaken)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_put_never_clobbers_later_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("users.json"));
        for i in 0u8..50 {
            store
                .put(record(&format!("user{i}"), &[0xAA, i], 0))
                .await
                .unwrap();
        }

        for trial in 0u8..20 {
            // Abandon a write almost immediately; it may still run to completion
            let _ = tokio::time::timeout(
                std::time::Duration::from_micros(50),
                store.put(record("bob", &[0xB0, trial], u32::from(trial))),
            )
            .await;

            store
                .put(record("carol", &[0xC0, trial], u32::from(trial)))
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;

            let carol = store.get("carol").await.unwrap().expect("acknowledged write");
            assert_eq!(carol.counter, u32::from(trial));
            assert!(store.get("user49").await.unwrap().is_some());
        }
    }
}
