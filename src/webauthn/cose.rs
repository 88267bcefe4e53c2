//! COSE public keys and signature verification
//!
//! Credential keys arrive as COSE maps inside authenticator data. We convert
//! them to SPKI PEM for storage and back into raw components for `ring` when
//! verifying signatures.

use ciborium::value::{Integer, Value};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePublicKey as _, EncodePublicKey as _, LineEnding};
use ring::signature;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};

use super::errors::CeremonyError;
use super::types::{COSE_ALG_ES256, COSE_ALG_RS256};

const COSE_KTY: i64 = 1;
const COSE_ALG: i64 = 3;
const COSE_KTY_EC2: i64 = 2;
const COSE_KTY_RSA: i64 = 3;
const COSE_CRV_P256: i64 = 1;

/// A credential public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    /// P-256 point as an uncompressed SEC1 encoding (`0x04 || x || y`)
    Es256 { point: Vec<u8> },
    Rs256 { n: Vec<u8>, e: Vec<u8> },
}

impl CoseKey {
    /// Parse a CBOR-encoded COSE key
    ///
    /// # Errors
    /// Returns `MalformedInput` for structurally invalid keys and
    /// `UnsupportedAlgorithm` for anything other than ES256 or RS256.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CeremonyError> {
        let value: Value = ciborium::de::from_reader(bytes)
            .map_err(|_| CeremonyError::MalformedInput("Invalid COSE key format".to_string()))?;
        let Value::Map(entries) = value else {
            return Err(CeremonyError::MalformedInput(
                "COSE key is not a map".to_string(),
            ));
        };

        let kty = int_entry(&entries, COSE_KTY)
            .ok_or_else(|| CeremonyError::MalformedInput("Missing COSE key type".to_string()))?;
        let alg = int_entry(&entries, COSE_ALG)
            .ok_or_else(|| CeremonyError::MalformedInput("Missing COSE algorithm".to_string()))?;

        match (kty, alg) {
            (COSE_KTY_EC2, COSE_ALG_ES256) => {
                if int_entry(&entries, -1) != Some(COSE_CRV_P256) {
                    return Err(CeremonyError::UnsupportedAlgorithm(alg));
                }
                let x = bytes_entry(&entries, -2, "x coordinate")?;
                let y = bytes_entry(&entries, -3, "y coordinate")?;
                if x.len() != 32 || y.len() != 32 {
                    return Err(CeremonyError::MalformedInput(
                        "Invalid P-256 coordinate length".to_string(),
                    ));
                }
                let mut point = Vec::with_capacity(65);
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Ok(Self::Es256 { point })
            }
            (COSE_KTY_RSA, COSE_ALG_RS256) => Ok(Self::Rs256 {
                n: bytes_entry(&entries, -1, "RSA modulus")?.to_vec(),
                e: bytes_entry(&entries, -2, "RSA exponent")?.to_vec(),
            }),
            _ => Err(CeremonyError::UnsupportedAlgorithm(alg)),
        }
    }

    #[must_use]
    pub fn algorithm(&self) -> i64 {
        match self {
            Self::Es256 { .. } => COSE_ALG_ES256,
            Self::Rs256 { .. } => COSE_ALG_RS256,
        }
    }

    /// Encode as SPKI PEM for storage
    ///
    /// # Errors
    /// Returns `MalformedInput` if the key material is not a valid key.
    pub fn to_pem(&self) -> Result<String, CeremonyError> {
        match self {
            Self::Es256 { point } => p256::PublicKey::from_sec1_bytes(point)
                .map_err(|_| CeremonyError::MalformedInput("Invalid P-256 point".to_string()))?
                .to_public_key_pem(LineEnding::LF)
                .map_err(|e| CeremonyError::MalformedInput(format!("PEM encoding failed: {e}"))),
            Self::Rs256 { n, e } => RsaPublicKey::new(
                BigUint::from_bytes_be(n),
                BigUint::from_bytes_be(e),
            )
            .map_err(|err| CeremonyError::MalformedInput(format!("Invalid RSA key: {err}")))?
            .to_public_key_pem(LineEnding::LF)
            .map_err(|err| CeremonyError::MalformedInput(format!("PEM encoding failed: {err}"))),
        }
    }

    /// Decode a stored SPKI PEM key
    ///
    /// # Errors
    /// Returns `MalformedInput` if the PEM holds neither a P-256 nor an RSA key.
    pub fn from_pem(pem: &str) -> Result<Self, CeremonyError> {
        if let Ok(key) = p256::PublicKey::from_public_key_pem(pem) {
            return Ok(Self::Es256 {
                point: key.to_encoded_point(false).as_bytes().to_vec(),
            });
        }
        if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
            return Ok(Self::Rs256 {
                n: key.n().to_bytes_be(),
                e: key.e().to_bytes_be(),
            });
        }
        Err(CeremonyError::MalformedInput(
            "Stored public key is not a supported PEM key".to_string(),
        ))
    }

    /// Verify `signature` over `message`
    ///
    /// # Errors
    /// Returns `SignatureInvalid` if verification fails.
    pub fn verify(&self, message: &[u8], signature_bytes: &[u8]) -> Result<(), CeremonyError> {
        let result = match self {
            Self::Es256 { point } => signature::UnparsedPublicKey::new(
                &signature::ECDSA_P256_SHA256_ASN1,
                point,
            )
            .verify(message, signature_bytes),
            Self::Rs256 { n, e } => signature::RsaPublicKeyComponents { n, e }.verify(
                &signature::RSA_PKCS1_2048_8192_SHA256,
                message,
                signature_bytes,
            ),
        };
        result.map_err(|_| CeremonyError::SignatureInvalid)
    }
}

fn find_entry(entries: &[(Value, Value)], label: i64) -> Option<&Value> {
    let label = Value::Integer(Integer::from(label));
    entries.iter().find(|(k, _)| k == &label).map(|(_, v)| v)
}

fn int_entry(entries: &[(Value, Value)], label: i64) -> Option<i64> {
    match find_entry(entries, label)? {
        Value::Integer(i) => i64::try_from(*i).ok(),
        _ => None,
    }
}

fn bytes_entry<'a>(
    entries: &'a [(Value, Value)],
    label: i64,
    what: &str,
) -> Result<&'a [u8], CeremonyError> {
    match find_entry(entries, label) {
        Some(Value::Bytes(bytes)) => Ok(bytes.as_slice()),
        _ => Err(CeremonyError::MalformedInput(format!(
            "Missing or invalid {what}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::{Signature, SigningKey};

    fn signing_key() -> SigningKey {
        SigningKey::from_slice(&[0x42; 32]).unwrap()
    }

    fn es256_cose(key: &SigningKey) -> Vec<u8> {
        let point = key.verifying_key().to_encoded_point(false);
        let map = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(2.into())),
            (Value::Integer(3.into()), Value::Integer((-7).into())),
            (Value::Integer((-1).into()), Value::Integer(1.into())),
            (
                Value::Integer((-2).into()),
                Value::Bytes(point.x().unwrap().to_vec()),
            ),
            (
                Value::Integer((-3).into()),
                Value::Bytes(point.y().unwrap().to_vec()),
            ),
        ]);
        let mut buf = Vec::new();
        ciborium::into_writer(&map, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_es256_pem_round_trip_and_verify() {
        let key = signing_key();
        let cose = CoseKey::from_cbor(&es256_cose(&key)).unwrap();
        assert_eq!(cose.algorithm(), COSE_ALG_ES256);

        let pem = cose.to_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        let restored = CoseKey::from_pem(&pem).unwrap();
        assert_eq!(restored, cose);

        let message = b"authenticator data || client data hash";
        let sig: Signature = key.sign(message);
        restored
            .verify(message, sig.to_der().as_bytes())
            .unwrap();
        assert_eq!(
            restored.verify(b"other message", sig.to_der().as_bytes()),
            Err(CeremonyError::SignatureInvalid)
        );
    }

    #[test]
    fn test_rs256_pem_round_trip() {
        // 2048-bit odd modulus; validity as a product of primes does not matter here
        let mut n = vec![0xC3; 256];
        n[255] = 0x01;
        let cose = CoseKey::Rs256 {
            n: n.clone(),
            e: vec![0x01, 0x00, 0x01],
        };
        let pem = cose.to_pem().unwrap();
        assert_eq!(CoseKey::from_pem(&pem).unwrap(), cose);
    }

    #[test]
    fn test_rs256_cose_key_verifies_pkcs1_signature() {
        let rsa = openssl::rsa::Rsa::generate(2048).unwrap();
        let map = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(3.into())),
            (Value::Integer(3.into()), Value::Integer((-257).into())),
            (Value::Integer((-1).into()), Value::Bytes(rsa.n().to_vec())),
            (Value::Integer((-2).into()), Value::Bytes(rsa.e().to_vec())),
        ]);
        let mut buf = Vec::new();
        ciborium::into_writer(&map, &mut buf).unwrap();
        let cose = CoseKey::from_cbor(&buf).unwrap();
        assert_eq!(cose.algorithm(), COSE_ALG_RS256);
        let restored = CoseKey::from_pem(&cose.to_pem().unwrap()).unwrap();
        assert_eq!(restored, cose);

        let key = openssl::pkey::PKey::from_rsa(rsa).unwrap();
        let message = b"authenticator data || client data hash";
        let mut signer =
            openssl::sign::Signer::new(openssl::hash::MessageDigest::sha256(), &key).unwrap();
        signer.update(message).unwrap();
        let sig = signer.sign_to_vec().unwrap();

        restored.verify(message, &sig).unwrap();
        assert_eq!(
            restored.verify(b"other message", &sig),
            Err(CeremonyError::SignatureInvalid)
        );
    }

    #[test]
    fn test_unsupported_algorithm() {
        let map = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(1.into())),
            (Value::Integer(3.into()), Value::Integer((-8).into())),
        ]);
        let mut buf = Vec::new();
        ciborium::into_writer(&map, &mut buf).unwrap();
        assert_eq!(
            CoseKey::from_cbor(&buf),
            Err(CeremonyError::UnsupportedAlgorithm(-8))
        );
    }

    #[test]
    fn test_garbage_pem_is_malformed() {
        assert!(matches!(
            CoseKey::from_pem("not a key"),
            Err(CeremonyError::MalformedInput(_))
        ));
    }
}
