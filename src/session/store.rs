use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::ceremony::{PendingLogin, PendingRegistration};

/// A ceremony waiting for the client's response
#[derive(Debug)]
pub enum PendingCeremony {
    Registration(PendingRegistration),
    Login(PendingLogin),
}

impl PendingCeremony {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Registration(_) => "registration",
            Self::Login(_) => "login",
        }
    }
}

struct Entry {
    ceremony: PendingCeremony,
    expires_at: DateTime<Utc>,
}

/// Pending ceremonies keyed by session id
pub struct CeremonySessionStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl CeremonySessionStore {
    /// Entries become unreadable `ttl` after they are inserted
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Fresh opaque session id
    #[must_use]
    pub fn new_session_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Store `ceremony` for `session_id`, replacing whatever was pending
    pub fn insert(&self, session_id: &str, ceremony: PendingCeremony) {
        let now = Utc::now();
        let mut entries = self.lock();
        entries.retain(|_, entry| entry.expires_at > now);
        if let Some(previous) = entries.insert(
            session_id.to_string(),
            Entry {
                ceremony,
                expires_at: now
                    .checked_add_signed(self.ttl)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        ) {
            log::debug!(
                "Pending {} ceremony replaced by a new begin",
                previous.ceremony.kind()
            );
        }
    }

    /// Remove and return the pending ceremony for `session_id`
    ///
    /// Returns `None` when nothing is pending or the entry expired.
    pub fn take(&self, session_id: &str) -> Option<PendingCeremony> {
        let entry = self.lock().remove(session_id)?;
        if entry.expires_at <= Utc::now() {
            log::debug!("Pending {} ceremony expired", entry.ceremony.kind());
            return None;
        }
        Some(entry.ceremony)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
