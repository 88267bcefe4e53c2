//! `WebAuthn` ceremony error types
//!
//! Every verification step fails with its own kind so that logs can record
//! exactly which check rejected a response, while callers facing the end user
//! only ever show [`CeremonyError::public_message`].

use thiserror::Error;

/// Errors produced while building options, verifying responses or touching
/// credential records
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CeremonyError {
    /// Wire encoding, JSON or CBOR could not be decoded
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Caller supplied an unusable value (e.g. empty username)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Client data carried the wrong ceremony type tag
    #[error("Client data type mismatch, expected {expected}")]
    CeremonyTypeMismatch { expected: &'static str },

    #[error("Challenge mismatch")]
    ChallengeMismatch,

    #[error("Origin mismatch: {received}")]
    OriginMismatch { received: String },

    #[error("Relying party id hash mismatch")]
    RelyingPartyMismatch,

    #[error("User verification policy violation: {0}")]
    UserVerificationPolicyViolation(String),

    #[error("Signature invalid")]
    SignatureInvalid,

    /// Embedded counter did not advance past the stored one
    #[error("Signature counter replay suspected (stored {stored}, received {received})")]
    CounterReplaySuspected { stored: u32, received: u32 },

    #[error("User handle mismatch")]
    UserHandleMismatch,

    /// Credential ids in the response disagree with each other or with the record
    #[error("Credential mismatch: {0}")]
    CredentialMismatch(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(i64),

    #[error("Unsupported attestation: {0}")]
    UnsupportedAttestation(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Unknown credential")]
    UnknownCredential,

    #[error("Duplicate user: {0}")]
    DuplicateUser(String),

    /// Transient store failure or timeout; the whole ceremony may be retried
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The system random source failed
    #[error("Internal entropy failure")]
    InternalEntropyFailure,
}

impl CeremonyError {
    /// Only store outages are worth retrying, and only from `begin`
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Stable machine-readable name of the error kind, used in logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "malformed_input",
            Self::InvalidInput(_) => "invalid_input",
            Self::CeremonyTypeMismatch { .. } => "ceremony_type_mismatch",
            Self::ChallengeMismatch => "challenge_mismatch",
            Self::OriginMismatch { .. } => "origin_mismatch",
            Self::RelyingPartyMismatch => "relying_party_mismatch",
            Self::UserVerificationPolicyViolation(_) => "user_verification_policy_violation",
            Self::SignatureInvalid => "signature_invalid",
            Self::CounterReplaySuspected { .. } => "counter_replay_suspected",
            Self::UserHandleMismatch => "user_handle_mismatch",
            Self::CredentialMismatch(_) => "credential_mismatch",
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            Self::UnsupportedAttestation(_) => "unsupported_attestation",
            Self::UnknownUser(_) => "unknown_user",
            Self::UnknownCredential => "unknown_credential",
            Self::DuplicateUser(_) => "duplicate_user",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::InternalEntropyFailure => "internal_entropy_failure",
        }
    }

    /// Message safe to show to the end user
    ///
    /// Validation and cryptographic failures all collapse into one string so
    /// that a client cannot learn which check it tripped.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "Required user details are missing",
            Self::UnknownUser(_) => "No registered user with that username",
            Self::DuplicateUser(_) => "Username is already registered",
            Self::StoreUnavailable(_) => "Service temporarily unavailable, please try again",
            Self::InternalEntropyFailure => "An internal error occurred",
            _ => "Authentication ceremony failed",
        }
    }
}
