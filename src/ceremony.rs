//! Registration and login ceremonies
//!
//! [`CeremonyService`] ties the option builders, the verifier and the
//! credential record manager together into the four operations a transport
//! exposes: begin/complete registration and begin/complete login.
//!
//! A `begin_*` call returns the options for the client together with a
//! pending ceremony that the caller keeps server-side. The matching
//! `complete_*` call takes that pending ceremony by value, so its challenge is
//! used for exactly one verification whatever the outcome.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::credentials::{CredentialRecord, CredentialRecordManager, NewCredential};
use crate::webauthn::{
    build_login_options, build_registration_options, generate_user_handle, verify_login,
    verify_registration, CeremonyError, CeremonyPolicy, Challenge, LoginExpectations,
    LoginOptions, LoginResponse, RegistrationExpectations, RegistrationOptions,
    RegistrationResponse, RelyingPartyIdentity, UserIdentity, VerifiedLogin,
};

/// Progress of a single ceremony
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyState {
    Initiated,
    ResponseReceived,
    Verified,
    Rejected,
}

impl CeremonyState {
    /// Move to `next`, refusing transitions that skip or revisit a step
    ///
    /// # Errors
    /// Returns `InvalidInput` for any transition other than
    /// `Initiated -> ResponseReceived -> Verified | Rejected`.
    pub fn advance(self, next: Self) -> Result<Self, CeremonyError> {
        match (self, next) {
            (Self::Initiated, Self::ResponseReceived)
            | (Self::ResponseReceived, Self::Verified | Self::Rejected) => Ok(next),
            _ => Err(CeremonyError::InvalidInput(format!(
                "Ceremony cannot move from {self:?} to {next:?}"
            ))),
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::Rejected)
    }
}

/// Server-side state of a registration between begin and complete
#[derive(Debug)]
pub struct PendingRegistration {
    challenge: Challenge,
    username: String,
    display_name: String,
    user_handle: Vec<u8>,
    started_at: DateTime<Utc>,
    state: CeremonyState,
}

impl PendingRegistration {
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn user_handle(&self) -> &[u8] {
        &self.user_handle
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Server-side state of a login between begin and complete
#[derive(Debug)]
pub struct PendingLogin {
    challenge: Challenge,
    username: String,
    started_at: DateTime<Utc>,
    state: CeremonyState,
}

impl PendingLogin {
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

#[derive(Debug)]
pub struct RegistrationStart {
    pub options: RegistrationOptions,
    pub pending: PendingRegistration,
}

#[derive(Debug)]
pub struct LoginStart {
    pub options: LoginOptions,
    pub pending: PendingLogin,
}

/// A login whose response verified against `snapshot` but whose counter has
/// not been persisted yet
#[derive(Debug)]
pub struct VerifiedLoginAttempt {
    snapshot: CredentialRecord,
    verified: VerifiedLogin,
}

impl VerifiedLoginAttempt {
    #[must_use]
    pub fn snapshot(&self) -> &CredentialRecord {
        &self.snapshot
    }

    #[must_use]
    pub fn counter(&self) -> u32 {
        self.verified.counter
    }
}

pub struct CeremonyService {
    rp: RelyingPartyIdentity,
    policy: CeremonyPolicy,
    records: Arc<CredentialRecordManager>,
}

impl CeremonyService {
    #[must_use]
    pub fn new(
        rp: RelyingPartyIdentity,
        policy: CeremonyPolicy,
        records: Arc<CredentialRecordManager>,
    ) -> Self {
        Self {
            rp,
            policy,
            records,
        }
    }

    #[must_use]
    pub fn relying_party(&self) -> &RelyingPartyIdentity {
        &self.rp
    }

    #[must_use]
    pub fn policy(&self) -> &CeremonyPolicy {
        &self.policy
    }

    #[must_use]
    pub fn records(&self) -> &CredentialRecordManager {
        &self.records
    }

    /// Start enrolling a new credential for `username`
    ///
    /// Nothing is written to the credential store here; a username that is
    /// already enrolled is only refused when the ceremony completes.
    ///
    /// # Errors
    /// `InvalidInput` if the username or display name is empty,
    /// `InternalEntropyFailure` if randomness is unavailable.
    pub fn begin_registration(
        &self,
        username: &str,
        display_name: &str,
    ) -> Result<RegistrationStart, CeremonyError> {
        let username = username.trim();
        let display_name = display_name.trim();
        if username.is_empty() {
            return Err(CeremonyError::InvalidInput(
                "Username cannot be empty".to_string(),
            ));
        }
        if display_name.is_empty() {
            return Err(CeremonyError::InvalidInput(
                "Display name cannot be empty".to_string(),
            ));
        }

        let user = UserIdentity {
            handle: generate_user_handle(self.policy.user_id_size)?,
            name: username.to_string(),
            display_name: display_name.to_string(),
        };
        let (options, challenge) = build_registration_options(&self.rp, &user, &self.policy)?;
        log::debug!("Registration ceremony initiated for user {username}");

        Ok(RegistrationStart {
            options,
            pending: PendingRegistration {
                challenge,
                username: user.name,
                display_name: user.display_name,
                user_handle: user.handle,
                started_at: Utc::now(),
                state: CeremonyState::Initiated,
            },
        })
    }

    /// Verify an attestation response and enrol the credential it carries
    ///
    /// # Errors
    /// The first failing verification step's error, `DuplicateUser` if the
    /// username was enrolled in the meantime, or `StoreUnavailable`.
    pub async fn complete_registration(
        &self,
        response: &RegistrationResponse,
        pending: PendingRegistration,
    ) -> Result<CredentialRecord, CeremonyError> {
        let PendingRegistration {
            challenge,
            username,
            user_handle,
            state,
            ..
        } = pending;
        let state = state.advance(CeremonyState::ResponseReceived)?;

        let expectations = RegistrationExpectations {
            challenge: &challenge,
            origin: &self.rp.origin,
            rp_id: &self.rp.id,
            factor: self.policy.attestation_factor,
            attestation_policy: self.policy.attestation_policy,
            algorithms: &self.policy.algorithms,
        };
        let verified = conclude(
            state,
            "Registration",
            &username,
            verify_registration(response, &expectations),
        )?;

        let record = self
            .records
            .create_record(NewCredential {
                username,
                credential_id: verified.credential_id,
                raw_id: response.raw_id.clone(),
                public_key: verified.public_key_pem,
                algorithm: verified.algorithm,
                user_handle,
                counter: verified.counter,
            })
            .await
            .inspect_err(|e| log::warn!("Enrolment failed: {}", e.kind()))?;

        log::info!(
            "Registered {} credential for user {} (attestation {})",
            algorithm_name(record.algorithm),
            record.username,
            verified.attestation_format
        );
        Ok(record)
    }

    /// Start a login for an enrolled user
    ///
    /// # Errors
    /// `UnknownUser` if nothing is enrolled for `username`,
    /// `StoreUnavailable`, or `InternalEntropyFailure`.
    pub async fn begin_login(&self, username: &str) -> Result<LoginStart, CeremonyError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(CeremonyError::InvalidInput(
                "Username cannot be empty".to_string(),
            ));
        }

        let record = self.records.find_by_username(username).await?;
        let (options, challenge) =
            build_login_options(&self.rp, &record.credential_id, &self.policy)?;
        log::debug!("Login ceremony initiated for user {username}");

        Ok(LoginStart {
            options,
            pending: PendingLogin {
                challenge,
                username: record.username,
                started_at: Utc::now(),
                state: CeremonyState::Initiated,
            },
        })
    }

    /// Verify an assertion response and persist the new signature counter
    ///
    /// # Errors
    /// The first failing verification step's error, `CounterReplaySuspected`
    /// if a concurrent login advanced the counter first, or `StoreUnavailable`.
    pub async fn complete_login(
        &self,
        response: &LoginResponse,
        pending: PendingLogin,
    ) -> Result<CredentialRecord, CeremonyError> {
        let attempt = self.verify_login_response(response, pending).await?;
        self.commit_login(attempt).await
    }

    /// Verification half of [`complete_login`](Self::complete_login)
    ///
    /// The record the response is checked against is returned as the
    /// snapshot that [`commit_login`](Self::commit_login) compares with.
    ///
    /// # Errors
    /// `UnknownCredential` if the asserted credential is not enrolled,
    /// `CredentialMismatch` if it belongs to another user, otherwise the
    /// first failing verification step's error.
    pub async fn verify_login_response(
        &self,
        response: &LoginResponse,
        pending: PendingLogin,
    ) -> Result<VerifiedLoginAttempt, CeremonyError> {
        let PendingLogin {
            challenge,
            username,
            state,
            ..
        } = pending;
        let state = state.advance(CeremonyState::ResponseReceived)?;

        let lookup = match crate::webauthn::codec::decode(&response.raw_id, "raw id") {
            Ok(credential_id) => self.records.find_by_credential_id(&credential_id).await,
            Err(e) => Err(e),
        };
        let snapshot = conclude_lookup(state, &username, lookup)?;

        let expectations = LoginExpectations {
            challenge: &challenge,
            origin: &self.rp.origin,
            rp_id: &self.rp.id,
            factor: self.policy.assertion_factor,
            credential_id: &snapshot.credential_id,
            public_key_pem: &snapshot.public_key,
            prev_counter: snapshot.counter,
            user_handle: &snapshot.user_handle,
        };
        let verified = conclude(
            state,
            "Login",
            &username,
            verify_login(response, &expectations),
        )?;

        Ok(VerifiedLoginAttempt { snapshot, verified })
    }

    /// Persist the counter of a verified login
    ///
    /// # Errors
    /// `CounterReplaySuspected` if the stored counter moved since the
    /// attempt's snapshot was taken, or `StoreUnavailable`.
    pub async fn commit_login(
        &self,
        attempt: VerifiedLoginAttempt,
    ) -> Result<CredentialRecord, CeremonyError> {
        let record = self
            .records
            .update_counter(&attempt.snapshot, attempt.verified.counter)
            .await
            .inspect_err(|e| {
                log::warn!(
                    "Login for user {} not committed: {}",
                    attempt.snapshot.username,
                    e.kind()
                );
            })?;

        log::info!(
            "User {} logged in (counter {}, user verified: {})",
            record.username,
            record.counter,
            attempt.verified.user_verified
        );
        Ok(record)
    }
}

/// Record the outcome of a verification on the ceremony state
fn conclude<T>(
    state: CeremonyState,
    ceremony: &str,
    username: &str,
    outcome: Result<T, CeremonyError>,
) -> Result<T, CeremonyError> {
    match outcome {
        Ok(value) => {
            let state = state.advance(CeremonyState::Verified)?;
            log::debug!("{ceremony} ceremony for user {username} is {state:?}");
            Ok(value)
        }
        Err(e) => {
            let state = state.advance(CeremonyState::Rejected)?;
            log::warn!(
                "{ceremony} ceremony for user {username} {state:?}: {}",
                e.kind()
            );
            Err(e)
        }
    }
}

/// The asserted credential must exist and belong to the user who began the login
fn conclude_lookup(
    state: CeremonyState,
    username: &str,
    lookup: Result<CredentialRecord, CeremonyError>,
) -> Result<CredentialRecord, CeremonyError> {
    let outcome = lookup.and_then(|record| {
        if record.username == username {
            Ok(record)
        } else {
            Err(CeremonyError::CredentialMismatch(
                "Credential belongs to a different user".to_string(),
            ))
        }
    });
    outcome.or_else(|e| conclude(state, "Login", username, Err(e)))
}

fn algorithm_name(algorithm: i64) -> &'static str {
    match algorithm {
        crate::webauthn::COSE_ALG_ES256 => "ES256",
        crate::webauthn::COSE_ALG_RS256 => "RS256",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryStore;
    use crate::testing::SoftAuthenticator;
    use std::time::Duration;

    fn service() -> CeremonyService {
        let rp = RelyingPartyIdentity {
            id: "example.test".to_string(),
            name: "Example".to_string(),
            icon: None,
            origin: "https://example.test".to_string(),
        };
        let records = CredentialRecordManager::new(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(1),
        );
        CeremonyService::new(rp, CeremonyPolicy::default(), Arc::new(records))
    }

    #[test]
    fn test_state_transitions() {
        let state = CeremonyState::Initiated;
        assert!(state.advance(CeremonyState::Verified).is_err());
        let received = state.advance(CeremonyState::ResponseReceived).unwrap();
        assert!(received.advance(CeremonyState::ResponseReceived).is_err());
        let done = received.advance(CeremonyState::Rejected).unwrap();
        assert!(done.is_terminal());
        assert!(done.advance(CeremonyState::Verified).is_err());
    }

    #[test]
    fn test_begin_registration_requires_names() {
        let service = service();
        assert!(matches!(
            service.begin_registration("", "Alice"),
            Err(CeremonyError::InvalidInput(_))
        ));
        assert!(matches!(
            service.begin_registration("alice", "  "),
            Err(CeremonyError::InvalidInput(_))
        ));

        let start = service.begin_registration("alice", "Alice").unwrap();
        assert_eq!(start.pending.username(), "alice");
        assert_eq!(start.pending.user_handle().len(), 32);
        assert_eq!(start.options.challenge, start.pending.challenge.encoded());
    }

    #[tokio::test]
    async fn test_begin_login_unknown_user() {
        assert!(matches!(
            service().begin_login("nobody").await,
            Err(CeremonyError::UnknownUser(_))
        ));
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let service = service();
        let mut authenticator = SoftAuthenticator::new("example.test", "https://example.test");

        let start = service.begin_registration("alice", "Alice").unwrap();
        let response = authenticator.register(&start.options);
        let record = service
            .complete_registration(&response, start.pending)
            .await
            .unwrap();
        assert_eq!(record.username, "alice");
        assert_eq!(record.credential_id, authenticator.credential_id());

        let start = service.begin_login("alice").await.unwrap();
        let response = authenticator.login(&start.options);
        let updated = service.complete_login(&response, start.pending).await.unwrap();
        assert_eq!(updated.counter, record.counter + 1);
        assert!(updated.last_used.is_some());
    }

    #[tokio::test]
    async fn test_credential_of_other_user_rejected() {
        let service = service();
        let mut alice = SoftAuthenticator::new("example.test", "https://example.test");
        let mut bob = SoftAuthenticator::new("example.test", "https://example.test");
        for (name, authenticator) in [("alice", &mut alice), ("bob", &mut bob)] {
            let start = service.begin_registration(name, name).unwrap();
            let response = authenticator.register(&start.options);
            service
                .complete_registration(&response, start.pending)
                .await
                .unwrap();
        }

        // Bob answers a challenge issued for Alice with his own credential
        let start = service.begin_login("alice").await.unwrap();
        let response = bob.login(&start.options);
        assert!(matches!(
            service.complete_login(&response, start.pending).await,
            Err(CeremonyError::CredentialMismatch(_))
        ));
    }
}
