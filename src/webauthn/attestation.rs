//! Attestation object parsing and statement verification
//!
//! Supported formats are `none`, `packed` and `fido-u2f`. Statement
//! signatures are always verified, either with the credential key (packed
//! self attestation) or with the key of the leaf `x5c` certificate. Trust
//! chains are never walked.

use ciborium::value::Value;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Public};
use openssl::sign::Verifier;
use openssl::x509::X509;

use super::authenticator_data::AuthenticatorData;
use super::cose::CoseKey;
use super::errors::CeremonyError;
use super::types::{AttestationPolicy, COSE_ALG_ES256, COSE_ALG_RS256};

/// Decoded attestation object
#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub format: String,
    pub statement: Vec<(Value, Value)>,
    /// Raw authenticator data, needed again for the signed message
    pub auth_data_bytes: Vec<u8>,
    pub auth_data: AuthenticatorData,
}

impl AttestationObject {
    /// Parse the CBOR attestation object
    ///
    /// # Errors
    /// Returns `MalformedInput` if the CBOR or any required member is invalid.
    pub fn parse(bytes: &[u8]) -> Result<Self, CeremonyError> {
        let value: Value = ciborium::de::from_reader(bytes).map_err(|_| {
            CeremonyError::MalformedInput("Invalid CBOR attestation format".to_string())
        })?;
        let Value::Map(entries) = value else {
            return Err(CeremonyError::MalformedInput(
                "Attestation object is not a map".to_string(),
            ));
        };

        let mut format = None;
        let mut statement = None;
        let mut auth_data_bytes = None;
        for (key, value) in entries {
            match (key.as_text(), value) {
                (Some("fmt"), Value::Text(text)) => format = Some(text),
                (Some("attStmt"), Value::Map(map)) => statement = Some(map),
                (Some("authData"), Value::Bytes(bytes)) => auth_data_bytes = Some(bytes),
                _ => {}
            }
        }

        let (Some(format), Some(statement), Some(auth_data_bytes)) =
            (format, statement, auth_data_bytes)
        else {
            return Err(CeremonyError::MalformedInput(
                "Attestation object missing fmt, attStmt or authData".to_string(),
            ));
        };

        let auth_data = AuthenticatorData::parse(&auth_data_bytes)?;

        Ok(Self {
            format,
            statement,
            auth_data_bytes,
            auth_data,
        })
    }

    /// Check the attestation statement against the credential key
    ///
    /// `client_data_hash` completes the signed message
    /// `authData || clientDataHash` (packed) or the U2F registration message.
    ///
    /// # Errors
    /// Returns `MalformedInput` for ill-formed statements or certificates,
    /// `SignatureInvalid` when the statement signature fails, and
    /// `UnsupportedAttestation` for unknown formats or `none` under the
    /// direct policy.
    pub fn verify_statement(
        &self,
        credential_key: &CoseKey,
        client_data_hash: &[u8],
        policy: AttestationPolicy,
    ) -> Result<(), CeremonyError> {
        match self.format.as_str() {
            "none" => {
                if !self.statement.is_empty() {
                    return Err(CeremonyError::MalformedInput(
                        "Attestation format none must have an empty statement".to_string(),
                    ));
                }
                if policy == AttestationPolicy::Direct {
                    return Err(CeremonyError::UnsupportedAttestation(
                        "Attestation format none does not satisfy direct policy".to_string(),
                    ));
                }
                Ok(())
            }
            "packed" => self.verify_packed(credential_key, client_data_hash),
            "fido-u2f" => self.verify_fido_u2f(credential_key, client_data_hash),
            other => Err(CeremonyError::UnsupportedAttestation(format!(
                "Unknown attestation format {other}"
            ))),
        }
    }

    fn verify_packed(
        &self,
        credential_key: &CoseKey,
        client_data_hash: &[u8],
    ) -> Result<(), CeremonyError> {
        let alg = self
            .statement_value("alg")
            .and_then(|v| v.as_integer())
            .and_then(|i| i64::try_from(i).ok())
            .ok_or_else(|| {
                CeremonyError::MalformedInput("Packed attestation missing alg".to_string())
            })?;
        let signature = self.statement_signature()?;

        let mut message = Vec::with_capacity(self.auth_data_bytes.len() + client_data_hash.len());
        message.extend_from_slice(&self.auth_data_bytes);
        message.extend_from_slice(client_data_hash);

        if self.statement_value("x5c").is_some() {
            let attestation_key = self.leaf_certificate_key()?;
            return verify_with_certificate_key(&attestation_key, alg, &message, signature);
        }

        // Self attestation: signed by the credential key itself
        if alg != credential_key.algorithm() {
            return Err(CeremonyError::MalformedInput(
                "Packed self attestation algorithm does not match credential key".to_string(),
            ));
        }
        credential_key.verify(&message, signature)
    }

    /// U2F signs `0x00 || rpIdHash || clientDataHash || credentialId || publicKey`
    /// with the attestation certificate's P-256 key
    fn verify_fido_u2f(
        &self,
        credential_key: &CoseKey,
        client_data_hash: &[u8],
    ) -> Result<(), CeremonyError> {
        let signature = self.statement_signature()?;
        if self.statement_certificates()?.len() != 1 {
            return Err(CeremonyError::MalformedInput(
                "fido-u2f attestation must carry exactly one certificate".to_string(),
            ));
        }
        let CoseKey::Es256 { point } = credential_key else {
            return Err(CeremonyError::UnsupportedAlgorithm(credential_key.algorithm()));
        };
        let attested = self.auth_data.attested_credential.as_ref().ok_or_else(|| {
            CeremonyError::MalformedInput("No attested credential data".to_string())
        })?;

        let mut message = Vec::with_capacity(
            1 + self.auth_data.rp_id_hash.len()
                + client_data_hash.len()
                + attested.credential_id.len()
                + point.len(),
        );
        message.push(0x00);
        message.extend_from_slice(&self.auth_data.rp_id_hash);
        message.extend_from_slice(client_data_hash);
        message.extend_from_slice(&attested.credential_id);
        message.extend_from_slice(point);

        let attestation_key = self.leaf_certificate_key()?;
        verify_with_certificate_key(&attestation_key, COSE_ALG_ES256, &message, signature)
    }

    fn statement_value(&self, name: &str) -> Option<&Value> {
        self.statement
            .iter()
            .find(|(k, _)| k.as_text() == Some(name))
            .map(|(_, v)| v)
    }

    fn statement_signature(&self) -> Result<&[u8], CeremonyError> {
        self.statement_value("sig")
            .and_then(Value::as_bytes)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                CeremonyError::MalformedInput("Attestation statement missing sig".to_string())
            })
    }

    /// DER certificates of `x5c`, leaf first
    fn statement_certificates(&self) -> Result<Vec<&[u8]>, CeremonyError> {
        let certificates: Option<Vec<&[u8]>> = self
            .statement_value("x5c")
            .and_then(Value::as_array)
            .and_then(|certs| {
                certs
                    .iter()
                    .map(|c| c.as_bytes().map(Vec::as_slice))
                    .collect()
            });
        match certificates {
            Some(certs) if !certs.is_empty() => Ok(certs),
            _ => Err(CeremonyError::MalformedInput(
                "Attestation x5c must be a non-empty array of certificates".to_string(),
            )),
        }
    }

    fn leaf_certificate_key(&self) -> Result<PKey<Public>, CeremonyError> {
        let certificates = self.statement_certificates()?;
        X509::from_der(certificates[0])
            .and_then(|certificate| certificate.public_key())
            .map_err(|e| {
                CeremonyError::MalformedInput(format!("Invalid attestation certificate: {e}"))
            })
    }
}

/// Verify an attestation signature made with a certificate key of type `alg`
fn verify_with_certificate_key(
    key: &PKey<Public>,
    alg: i64,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CeremonyError> {
    let key_matches = match alg {
        COSE_ALG_ES256 => {
            key.ec_key().ok().and_then(|ec| ec.group().curve_name())
                == Some(Nid::X9_62_PRIME256V1)
        }
        COSE_ALG_RS256 => key.id() == Id::RSA,
        other => return Err(CeremonyError::UnsupportedAlgorithm(other)),
    };
    if !key_matches {
        return Err(CeremonyError::MalformedInput(
            "Attestation certificate key does not match alg".to_string(),
        ));
    }

    // openssl reports undecodable signatures as errors; both mean "not verified"
    let verified = Verifier::new(MessageDigest::sha256(), key)
        .and_then(|mut verifier| {
            verifier.update(message)?;
            verifier.verify(signature)
        })
        .unwrap_or(false);
    if verified {
        Ok(())
    } else {
        Err(CeremonyError::SignatureInvalid)
    }
}
