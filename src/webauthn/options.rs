//! Registration and login option builders
//!
//! Builders only generate a challenge and, for login, look the user up; they
//! never write to the credential store.

use super::challenge::{new_challenge, Challenge};
use super::codec;
use super::errors::CeremonyError;
use super::types::{
    AuthenticatorSelectionCriteria, CeremonyPolicy, LoginOptions, PublicKeyCredentialDescriptor,
    PublicKeyCredentialParameters, RegistrationOptions, RelyingPartyEntity, RelyingPartyIdentity,
    UserEntity, UserIdentity,
};

const PUBLIC_KEY_TYPE: &str = "public-key";

/// Build options for creating a new credential
///
/// Returns the options for the client and the challenge to keep in the session.
///
/// # Errors
/// Returns `InternalEntropyFailure` if no challenge could be generated.
pub fn build_registration_options(
    rp: &RelyingPartyIdentity,
    user: &UserIdentity,
    policy: &CeremonyPolicy,
) -> Result<(RegistrationOptions, Challenge), CeremonyError> {
    let challenge = new_challenge(policy.challenge_size)?;

    let options = RegistrationOptions {
        rp: RelyingPartyEntity {
            id: rp.id.clone(),
            name: rp.name.clone(),
            icon: rp.icon.clone(),
        },
        user: UserEntity {
            id: codec::encode(&user.handle),
            name: user.name.clone(),
            display_name: user.display_name.clone(),
        },
        challenge: challenge.encoded(),
        pub_key_cred_params: policy
            .algorithms
            .iter()
            .map(|alg| PublicKeyCredentialParameters {
                r#type: PUBLIC_KEY_TYPE.to_string(),
                alg: *alg,
            })
            .collect(),
        timeout: policy.timeout_ms,
        attestation: policy.attestation,
        authenticator_selection: AuthenticatorSelectionCriteria {
            authenticator_attachment: policy.authenticator_attachment,
            require_resident_key: policy.require_resident_key,
            user_verification: policy.user_verification,
        },
        origin: rp.origin.clone(),
    };

    Ok((options, challenge))
}

/// Build options for asserting an existing credential
///
/// `allowed_credential` is the enrolled credential id found by the caller's
/// lookup; it becomes the only entry of `allowCredentials`.
///
/// # Errors
/// Returns `InternalEntropyFailure` if no challenge could be generated.
pub fn build_login_options(
    rp: &RelyingPartyIdentity,
    allowed_credential: &[u8],
    policy: &CeremonyPolicy,
) -> Result<(LoginOptions, Challenge), CeremonyError> {
    let challenge = new_challenge(policy.challenge_size)?;

    let options = LoginOptions {
        challenge: challenge.encoded(),
        timeout: policy.timeout_ms,
        rp_id: rp.id.clone(),
        allow_credentials: vec![PublicKeyCredentialDescriptor {
            r#type: PUBLIC_KEY_TYPE.to_string(),
            id: codec::encode(allowed_credential),
        }],
        user_verification: policy.user_verification,
        origin: rp.origin.clone(),
    };

    Ok((options, challenge))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::types::{COSE_ALG_ES256, COSE_ALG_RS256};

    fn rp() -> RelyingPartyIdentity {
        RelyingPartyIdentity {
            id: "example.test".to_string(),
            name: "Example".to_string(),
            icon: None,
            origin: "https://example.test".to_string(),
        }
    }

    #[test]
    fn test_registration_options_shape() {
        let user = UserIdentity {
            handle: vec![9; 32],
            name: "alice".to_string(),
            display_name: "Alice".to_string(),
        };
        let policy = CeremonyPolicy::default();
        let (options, challenge) = build_registration_options(&rp(), &user, &policy).unwrap();

        assert_eq!(options.challenge, challenge.encoded());
        assert_eq!(challenge.as_bytes().len(), policy.challenge_size);
        assert_eq!(options.user.id, codec::encode(&[9; 32]));
        let algs: Vec<i64> = options.pub_key_cred_params.iter().map(|p| p.alg).collect();
        assert_eq!(algs, vec![COSE_ALG_ES256, COSE_ALG_RS256]);

        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["rp"]["id"], "example.test");
        assert!(json["rp"].get("icon").is_none());
        assert_eq!(json["user"]["displayName"], "Alice");
        assert_eq!(json["pubKeyCredParams"][0]["type"], "public-key");
        assert_eq!(json["attestation"], "none");
        assert_eq!(
            json["authenticatorSelection"]["authenticatorAttachment"],
            "cross-platform"
        );
        assert_eq!(json["authenticatorSelection"]["userVerification"], "preferred");
        assert_eq!(json["origin"], "https://example.test");
    }

    #[test]
    fn test_login_options_allow_only_enrolled_credential() {
        let (options, challenge) =
            build_login_options(&rp(), &[1, 2, 3], &CeremonyPolicy::default()).unwrap();
        assert_eq!(options.allow_credentials.len(), 1);
        assert_eq!(options.allow_credentials[0].id, codec::encode(&[1, 2, 3]));
        assert_eq!(options.rp_id, "example.test");
        assert_eq!(options.challenge, challenge.encoded());
    }

    #[test]
    fn test_each_build_uses_fresh_challenge() {
        let policy = CeremonyPolicy::default();
        let (_, first) = build_login_options(&rp(), &[1], &policy).unwrap();
        let (_, second) = build_login_options(&rp(), &[1], &policy).unwrap();
        assert_ne!(first, second);
    }
}
