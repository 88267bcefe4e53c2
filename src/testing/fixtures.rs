//! Test fixtures providing pre-built test objects
//!
//! Everything here is wired for the relying party in
//! [`constants`](super::constants): `example.test` served from
//! `https://example.test`.

use std::sync::Arc;
use std::time::Duration;

use crate::ceremony::CeremonyService;
use crate::credentials::{CredentialRecordManager, CredentialStore, MemoryStore};
use crate::handlers::AppState;
use crate::settings::PassgateSettings;
use crate::webauthn::{CeremonyPolicy, RelyingPartyIdentity};

use super::authenticator::SoftAuthenticator;
use super::constants::{TEST_ORIGIN, TEST_RP_ID, TEST_RP_NAME};

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    #[must_use]
    pub fn relying_party() -> RelyingPartyIdentity {
        RelyingPartyIdentity {
            id: TEST_RP_ID.to_string(),
            name: TEST_RP_NAME.to_string(),
            icon: None,
            origin: TEST_ORIGIN.to_string(),
        }
    }

    /// Default policy with a shorter challenge to keep responses small
    #[must_use]
    pub fn policy() -> CeremonyPolicy {
        CeremonyPolicy {
            challenge_size: 32,
            ..CeremonyPolicy::default()
        }
    }

    /// Settings pointing at the test relying party and an in-memory store
    #[must_use]
    pub fn settings() -> PassgateSettings {
        let mut settings = PassgateSettings::default();
        settings.relying_party.id = TEST_RP_ID.to_string();
        settings.relying_party.name = TEST_RP_NAME.to_string();
        settings.relying_party.origin = TEST_ORIGIN.to_string();
        settings.ceremony.challenge_size = 32;
        settings.store.backend = "memory".to_string();
        settings.store.timeout_ms = 200;
        settings
    }

    #[must_use]
    pub fn record_manager(store: Arc<dyn CredentialStore>) -> Arc<CredentialRecordManager> {
        Arc::new(CredentialRecordManager::new(
            store,
            Duration::from_millis(200),
        ))
    }

    /// Ceremony service over a fresh in-memory store
    #[must_use]
    pub fn ceremony_service() -> CeremonyService {
        Self::ceremony_service_with(Arc::new(MemoryStore::new()), Self::policy())
    }

    #[must_use]
    pub fn ceremony_service_with(
        store: Arc<dyn CredentialStore>,
        policy: CeremonyPolicy,
    ) -> CeremonyService {
        CeremonyService::new(Self::relying_party(), policy, Self::record_manager(store))
    }

    /// HTTP state over a fresh in-memory store
    ///
    /// # Panics
    /// Panics if the fixture settings are invalid.
    #[must_use]
    pub fn app_state() -> AppState {
        AppState::from_settings(&Self::settings()).expect("fixture settings are valid")
    }

    /// Authenticator bound to the test relying party
    #[must_use]
    pub fn authenticator() -> SoftAuthenticator {
        SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN)
    }

    /// Run a full registration for `username` and return the authenticator
    /// holding the enrolled credential
    ///
    /// # Panics
    /// Panics if the registration does not succeed.
    pub async fn enrolled(service: &CeremonyService, username: &str) -> SoftAuthenticator {
        let mut authenticator = Self::authenticator();
        let start = service
            .begin_registration(username, username)
            .expect("begin registration");
        let response = authenticator.register(&start.options);
        service
            .complete_registration(&response, start.pending)
            .await
            .expect("complete registration");
        authenticator
    }
}
