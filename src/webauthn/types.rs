//! `WebAuthn` core types
//!
//! Option bundles sent to the client, responses returned by it, and the
//! policy values that drive verification.

use serde::{Deserialize, Serialize};

use super::challenge::Challenge;

/// COSE algorithm identifier for ECDSA P-256 with SHA-256
pub const COSE_ALG_ES256: i64 = -7;
/// COSE algorithm identifier for RSASSA-PKCS1-v1_5 with SHA-256
pub const COSE_ALG_RS256: i64 = -257;

/// Relying party identity, fixed for the life of the process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingPartyIdentity {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    /// Exact origin (scheme, host, port) clients must report
    pub origin: String,
}

/// Which authenticator-data flags a ceremony must carry
///
/// `First` demands user verification (PIN, biometric), `Second` demands at
/// least user presence (a touch), `Either` accepts verification or presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationFactor {
    First,
    Second,
    Either,
}

/// How much of an attestation statement we insist on validating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationPolicy {
    /// Check structure only, accept self and unverifiable statements
    None,
    /// Require a statement whose signature we could verify
    Direct,
}

/// Attestation conveyance preference advertised to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyance {
    None,
    Indirect,
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorAttachment {
    Platform,
    CrossPlatform,
}

/// Typed ceremony policy, built from settings at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeremonyPolicy {
    pub timeout_ms: u32,
    pub challenge_size: usize,
    pub user_id_size: usize,
    pub attestation: AttestationConveyance,
    pub algorithms: Vec<i64>,
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    pub require_resident_key: bool,
    pub user_verification: UserVerificationRequirement,
    pub attestation_factor: UserVerificationFactor,
    pub assertion_factor: UserVerificationFactor,
    pub attestation_policy: AttestationPolicy,
}

impl Default for CeremonyPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            challenge_size: super::challenge::DEFAULT_CHALLENGE_SIZE,
            user_id_size: 32,
            attestation: AttestationConveyance::None,
            algorithms: vec![COSE_ALG_ES256, COSE_ALG_RS256],
            authenticator_attachment: Some(AuthenticatorAttachment::CrossPlatform),
            require_resident_key: false,
            user_verification: UserVerificationRequirement::Preferred,
            attestation_factor: UserVerificationFactor::Either,
            assertion_factor: UserVerificationFactor::Either,
            attestation_policy: AttestationPolicy::None,
        }
    }
}

/// Identity of the user being registered
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub handle: Vec<u8>,
    pub name: String,
    pub display_name: String,
}

/// Relying party as presented inside registration options
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RelyingPartyEntity {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// `WebAuthn` user entity
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserEntity {
    pub id: String, // Wire-encoded user handle
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// Public key credential parameters
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type")]
    pub r#type: String, // Always "public-key"
    pub alg: i64,
}

/// Authenticator selection criteria
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatorSelectionCriteria {
    #[serde(
        rename = "authenticatorAttachment",
        skip_serializing_if = "Option::is_none"
    )]
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    #[serde(rename = "requireResidentKey")]
    pub require_resident_key: bool,
    #[serde(rename = "userVerification")]
    pub user_verification: UserVerificationRequirement,
}

/// Public key credential descriptor
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialDescriptor {
    #[serde(rename = "type")]
    pub r#type: String, // Always "public-key"
    pub id: String,     // Wire-encoded credential id
}

/// Registration ("attestation") options sent to the client
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RegistrationOptions {
    pub rp: RelyingPartyEntity,
    pub user: UserEntity,
    pub challenge: String,
    #[serde(rename = "pubKeyCredParams")]
    pub pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    pub timeout: u32,
    pub attestation: AttestationConveyance,
    #[serde(rename = "authenticatorSelection")]
    pub authenticator_selection: AuthenticatorSelectionCriteria,
    pub origin: String,
}

/// Login ("assertion") options sent to the client
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LoginOptions {
    pub challenge: String,
    pub timeout: u32,
    #[serde(rename = "rpId")]
    pub rp_id: String,
    #[serde(rename = "allowCredentials")]
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,
    #[serde(rename = "userVerification")]
    pub user_verification: UserVerificationRequirement,
    pub origin: String,
}

/// Authenticator attestation response during registration
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AttestationPayload {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "attestationObject")]
    pub attestation_object: String,
}

/// Authenticator assertion response during login
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AssertionPayload {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: String,
    pub signature: String,
    #[serde(rename = "userHandle", default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

/// Registration response from the client
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RegistrationResponse {
    pub id: String,
    #[serde(rename = "rawId")]
    pub raw_id: String,
    pub response: AttestationPayload,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
}

/// Login response from the client
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LoginResponse {
    pub id: String,
    #[serde(rename = "rawId")]
    pub raw_id: String,
    pub response: AssertionPayload,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
}

/// Either shape of untrusted authenticator output
#[derive(Clone, Debug)]
pub enum AuthenticatorResponse {
    Registration(RegistrationResponse),
    Login(LoginResponse),
}

/// Facts a registration response is checked against
#[derive(Debug)]
pub struct RegistrationExpectations<'a> {
    pub challenge: &'a Challenge,
    pub origin: &'a str,
    pub rp_id: &'a str,
    pub factor: UserVerificationFactor,
    pub attestation_policy: AttestationPolicy,
    pub algorithms: &'a [i64],
}

/// Facts a login response is checked against, including the stored credential
#[derive(Debug)]
pub struct LoginExpectations<'a> {
    pub challenge: &'a Challenge,
    pub origin: &'a str,
    pub rp_id: &'a str,
    pub factor: UserVerificationFactor,
    pub credential_id: &'a [u8],
    pub public_key_pem: &'a str,
    pub prev_counter: u32,
    pub user_handle: &'a [u8],
}

/// Expectations matching the response variant handed to [`super::verify`]
#[derive(Debug)]
pub enum Expectations<'a> {
    Registration(RegistrationExpectations<'a>),
    Login(LoginExpectations<'a>),
}

/// Output of a verified registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRegistration {
    pub credential_id: Vec<u8>,
    pub public_key_pem: String,
    pub algorithm: i64,
    pub counter: u32,
    pub attestation_format: String,
    pub user_verified: bool,
}

/// Output of a verified login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedLogin {
    pub credential_id: Vec<u8>,
    /// Counter value the caller must persist
    pub counter: u32,
    pub user_verified: bool,
}

/// Either verified outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifiedCeremony {
    Registration(VerifiedRegistration),
    Login(VerifiedLogin),
}
