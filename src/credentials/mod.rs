//! Credential records and the stores that hold them

mod file;
mod manager;
mod memory;
mod record;
mod store;

pub use file::FileStore;
pub use manager::{CredentialRecordManager, NewCredential};
pub use memory::MemoryStore;
pub use record::CredentialRecord;
pub use store::{CredentialStore, StoreError};
