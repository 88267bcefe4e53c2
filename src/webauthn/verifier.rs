//! Ceremony verification
//!
//! Registration and login run as two sibling procedures that share the
//! client-data and authenticator-data checks. Steps run in a fixed order and
//! the first failing step decides the error:
//!
//! 1. decode wire fields
//! 2. parse client data and check the ceremony type
//! 3. challenge
//! 4. origin
//! 5. relying party id hash
//! 6. user verification / presence policy
//! 7. signature
//! 8. signature counter (login only)
//!
//! Nothing here touches shared state; persisting the outcome is the caller's job.

use ring::digest;

use super::attestation::AttestationObject;
use super::authenticator_data::AuthenticatorData;
use super::client_data::{ClientData, TYPE_CREATE, TYPE_GET};
use super::codec;
use super::cose::CoseKey;
use super::errors::CeremonyError;
use super::types::{
    AuthenticatorResponse, Expectations, LoginExpectations, LoginResponse,
    RegistrationExpectations, RegistrationResponse, UserVerificationFactor, VerifiedCeremony,
    VerifiedLogin, VerifiedRegistration,
};

/// Verify either response shape against matching expectations
///
/// # Errors
/// Returns the error of the first failing verification step, or
/// `InvalidInput` if the response and expectations are of different ceremonies.
pub fn verify(
    response: &AuthenticatorResponse,
    expectations: &Expectations<'_>,
) -> Result<VerifiedCeremony, CeremonyError> {
    match (response, expectations) {
        (AuthenticatorResponse::Registration(r), Expectations::Registration(e)) => {
            verify_registration(r, e).map(VerifiedCeremony::Registration)
        }
        (AuthenticatorResponse::Login(r), Expectations::Login(e)) => {
            verify_login(r, e).map(VerifiedCeremony::Login)
        }
        _ => Err(CeremonyError::InvalidInput(
            "Response does not match the ceremony being verified".to_string(),
        )),
    }
}

/// Verify a registration (attestation) response
///
/// # Errors
/// Returns the error of the first failing verification step.
pub fn verify_registration(
    response: &RegistrationResponse,
    expected: &RegistrationExpectations<'_>,
) -> Result<VerifiedRegistration, CeremonyError> {
    // 1. Decode
    let credential_id = decode_credential_ids(&response.id, &response.raw_id)?;
    let client_data_bytes = codec::decode(&response.response.client_data_json, "client data")?;
    let attestation_bytes =
        codec::decode(&response.response.attestation_object, "attestation object")?;

    // 2-4. Client data
    let client_data = ClientData::from_bytes(&client_data_bytes)?;
    check_client_data(&client_data, TYPE_CREATE, expected.challenge.as_bytes(), expected.origin)?;

    let attestation = AttestationObject::parse(&attestation_bytes)?;
    let auth_data = &attestation.auth_data;

    // 5-6. Authenticator data
    check_authenticator_data(auth_data, expected.rp_id, expected.factor)?;

    let attested = auth_data.attested_credential.as_ref().ok_or_else(|| {
        CeremonyError::MalformedInput("No attested credential data".to_string())
    })?;
    if attested.credential_id != credential_id {
        return Err(CeremonyError::CredentialMismatch(
            "Response id differs from attested credential id".to_string(),
        ));
    }

    let credential_key = CoseKey::from_cbor(&attested.public_key)?;
    if !expected.algorithms.contains(&credential_key.algorithm()) {
        return Err(CeremonyError::UnsupportedAlgorithm(credential_key.algorithm()));
    }

    // 7. Attestation statement
    attestation.verify_statement(
        &credential_key,
        &client_data.hash,
        expected.attestation_policy,
    )?;

    // 9. Extract
    Ok(VerifiedRegistration {
        credential_id,
        public_key_pem: credential_key.to_pem()?,
        algorithm: credential_key.algorithm(),
        counter: auth_data.counter,
        attestation_format: attestation.format.clone(),
        user_verified: auth_data.user_verified(),
    })
}

/// Verify a login (assertion) response against the stored credential
///
/// # Errors
/// Returns the error of the first failing verification step.
pub fn verify_login(
    response: &LoginResponse,
    expected: &LoginExpectations<'_>,
) -> Result<VerifiedLogin, CeremonyError> {
    // 1. Decode
    let credential_id = decode_credential_ids(&response.id, &response.raw_id)?;
    let client_data_bytes = codec::decode(&response.response.client_data_json, "client data")?;
    let auth_data_bytes =
        codec::decode(&response.response.authenticator_data, "authenticator data")?;
    let signature = codec::decode(&response.response.signature, "signature")?;
    let user_handle = response
        .response
        .user_handle
        .as_deref()
        .map(|h| codec::decode(h, "user handle"))
        .transpose()?;

    if credential_id != expected.credential_id {
        return Err(CeremonyError::CredentialMismatch(
            "Response id differs from the allowed credential".to_string(),
        ));
    }
    if let Some(handle) = user_handle.filter(|h| !h.is_empty()) {
        if handle != expected.user_handle {
            return Err(CeremonyError::UserHandleMismatch);
        }
    }

    // 2-4. Client data
    let client_data = ClientData::from_bytes(&client_data_bytes)?;
    check_client_data(&client_data, TYPE_GET, expected.challenge.as_bytes(), expected.origin)?;

    // 5-6. Authenticator data
    let auth_data = AuthenticatorData::parse(&auth_data_bytes)?;
    check_authenticator_data(&auth_data, expected.rp_id, expected.factor)?;

    // 7. Signature with the stored key
    let stored_key = CoseKey::from_pem(expected.public_key_pem)?;
    let mut message = Vec::with_capacity(auth_data_bytes.len() + client_data.hash.len());
    message.extend_from_slice(&auth_data_bytes);
    message.extend_from_slice(&client_data.hash);
    stored_key.verify(&message, &signature)?;

    // 8. Counter
    check_counter(expected.prev_counter, auth_data.counter)?;

    // 9. Extract
    Ok(VerifiedLogin {
        credential_id,
        counter: auth_data.counter,
        user_verified: auth_data.user_verified(),
    })
}

/// Signature counters must strictly increase, except that an authenticator
/// without counter support reports zero forever.
///
/// # Errors
/// Returns `CounterReplaySuspected` when the counter did not advance.
pub fn check_counter(stored: u32, received: u32) -> Result<(), CeremonyError> {
    if received > stored || (stored == 0 && received == 0) {
        Ok(())
    } else {
        Err(CeremonyError::CounterReplaySuspected { stored, received })
    }
}

/// `id` (base64url) and `rawId` (often standard base64) must name the same credential
fn decode_credential_ids(id: &str, raw_id: &str) -> Result<Vec<u8>, CeremonyError> {
    let id = codec::decode(id, "credential id")?;
    let raw_id = codec::decode(raw_id, "raw id")?;
    if id.is_empty() {
        return Err(CeremonyError::MalformedInput(
            "Credential id is empty".to_string(),
        ));
    }
    if id != raw_id {
        return Err(CeremonyError::CredentialMismatch(
            "id and rawId differ".to_string(),
        ));
    }
    Ok(raw_id)
}

fn check_client_data(
    client_data: &ClientData,
    expected_type: &'static str,
    expected_challenge: &[u8],
    expected_origin: &str,
) -> Result<(), CeremonyError> {
    if client_data.ceremony_type != expected_type {
        return Err(CeremonyError::CeremonyTypeMismatch {
            expected: expected_type,
        });
    }
    if client_data.challenge != expected_challenge {
        return Err(CeremonyError::ChallengeMismatch);
    }
    if client_data.origin != expected_origin {
        return Err(CeremonyError::OriginMismatch {
            received: client_data.origin.clone(),
        });
    }
    Ok(())
}

fn check_authenticator_data(
    auth_data: &AuthenticatorData,
    rp_id: &str,
    factor: UserVerificationFactor,
) -> Result<(), CeremonyError> {
    let expected_hash = digest::digest(&digest::SHA256, rp_id.as_bytes());
    if auth_data.rp_id_hash.as_slice() != expected_hash.as_ref() {
        return Err(CeremonyError::RelyingPartyMismatch);
    }

    match factor {
        UserVerificationFactor::First if !auth_data.user_verified() => Err(
            CeremonyError::UserVerificationPolicyViolation("User verification required".into()),
        ),
        UserVerificationFactor::Second if !auth_data.user_present() => Err(
            CeremonyError::UserVerificationPolicyViolation("User presence required".into()),
        ),
        UserVerificationFactor::Either
            if !auth_data.user_present() && !auth_data.user_verified() =>
        {
            Err(CeremonyError::UserVerificationPolicyViolation(
                "User presence or verification required".into(),
            ))
        }
        _ => Ok(()),
    }
}
