//! `WebAuthn` implementation
//!
//! This module provides the ceremony engine independent of any transport or
//! storage: option builders, challenge generation, and verification of
//! attestation and assertion responses against explicit expectations.

mod attestation;
mod authenticator_data;
mod challenge;
mod client_data;
pub mod codec;
mod cose;
mod errors;
mod options;
mod types;
mod verifier;

// Re-exports for public use
pub use attestation::AttestationObject;
pub use authenticator_data::{
    AttestedCredentialData, AuthenticatorData, FLAG_ATTESTED_CREDENTIAL_DATA,
    FLAG_EXTENSION_DATA, FLAG_USER_PRESENT, FLAG_USER_VERIFIED,
};
pub use challenge::{
    generate_user_handle, new_challenge, Challenge, DEFAULT_CHALLENGE_SIZE, MIN_CHALLENGE_SIZE,
};
pub use client_data::{ClientData, TYPE_CREATE, TYPE_GET};
pub use cose::CoseKey;
pub use errors::CeremonyError;
pub use options::{build_login_options, build_registration_options};
pub use types::*;
pub use verifier::{check_counter, verify, verify_login, verify_registration};
