//! Software authenticator
//!
//! Produces real attestation and assertion responses signed with an ES256
//! key held in memory, so ceremonies can be exercised end to end without a
//! browser. [`Tamper`] bends individual fields of one response to provoke
//! specific verification failures. [`AttestationCertificate`] stands in for a
//! hardware authenticator's batch attestation key.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ciborium::value::Value;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509Builder, X509NameBuilder};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use serde_json::json;

use crate::webauthn::codec;
use crate::webauthn::{
    AssertionPayload, AttestationPayload, LoginOptions, LoginResponse, RegistrationOptions,
    RegistrationResponse, COSE_ALG_ES256, FLAG_ATTESTED_CREDENTIAL_DATA, FLAG_USER_PRESENT,
    FLAG_USER_VERIFIED, TYPE_CREATE, TYPE_GET,
};

/// Attestation statement the authenticator emits on registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationStyle {
    /// `fmt = "none"` with an empty statement
    None,
    /// `fmt = "packed"` self attestation signed by the credential key
    PackedSelf,
    /// `fmt = "packed"` signed by an attestation key with an `x5c` certificate
    PackedCertificate,
    /// `fmt = "fido-u2f"` in the U2F registration message layout
    FidoU2f,
}

/// P-256 attestation key with a self-signed certificate
pub struct AttestationCertificate {
    key: PKey<Private>,
    der: Vec<u8>,
}

impl AttestationCertificate {
    /// # Panics
    /// Panics if openssl cannot generate the key or certificate.
    #[must_use]
    pub fn generate() -> Self {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).expect("P-256 group");
        let key = EcKey::generate(&group)
            .and_then(PKey::from_ec_key)
            .expect("attestation key");

        let mut name = X509NameBuilder::new().expect("name builder");
        name.append_entry_by_text("CN", "Passgate Test Attestation")
            .expect("common name");
        let name = name.build();
        let serial = BigNum::from_u32(1)
            .and_then(|n| n.to_asn1_integer())
            .expect("serial number");
        let not_before = Asn1Time::days_from_now(0).expect("not before");
        let not_after = Asn1Time::days_from_now(365).expect("not after");

        let mut builder = X509Builder::new().expect("certificate builder");
        builder.set_version(2).expect("version");
        builder.set_serial_number(&serial).expect("serial number");
        builder.set_subject_name(&name).expect("subject");
        builder.set_issuer_name(&name).expect("issuer");
        builder.set_pubkey(&key).expect("public key");
        builder.set_not_before(&not_before).expect("not before");
        builder.set_not_after(&not_after).expect("not after");
        builder
            .sign(&key, MessageDigest::sha256())
            .expect("certificate signature");
        let der = builder.build().to_der().expect("DER certificate");

        Self { key, der }
    }

    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// DER ECDSA signature over `message`
    ///
    /// # Panics
    /// Panics if openssl fails to sign.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let mut signer =
            openssl::sign::Signer::new(MessageDigest::sha256(), &self.key).expect("signer");
        signer.update(message).expect("signer input");
        signer.sign_to_vec().expect("signature")
    }
}

/// Per-response overrides
#[derive(Debug, Clone, Default)]
pub struct Tamper {
    pub challenge: Option<Vec<u8>>,
    pub origin: Option<String>,
    pub ceremony_type: Option<String>,
    pub rp_id: Option<String>,
    pub flags: Option<u8>,
    /// Report this counter instead of advancing the internal one
    pub counter: Option<u32>,
    pub user_handle: Option<Vec<u8>>,
    pub corrupt_signature: bool,
}

pub struct SoftAuthenticator {
    signing_key: SigningKey,
    credential_id: Vec<u8>,
    user_handle: Option<Vec<u8>>,
    rp_id: String,
    origin: String,
    counter: u32,
    counter_step: u32,
    attestation: AttestationStyle,
    attestation_certificate: Option<AttestationCertificate>,
}

impl SoftAuthenticator {
    /// New authenticator with a fresh key and credential id
    ///
    /// # Panics
    /// Panics if the system random source fails.
    #[must_use]
    pub fn new(rp_id: &str, origin: &str) -> Self {
        let rng = SystemRandom::new();
        let signing_key = loop {
            let mut secret = [0u8; 32];
            rng.fill(&mut secret).expect("system randomness");
            // Rejects zero and values above the curve order
            if let Ok(key) = SigningKey::from_slice(&secret) {
                break key;
            }
        };
        let mut credential_id = vec![0u8; 32];
        rng.fill(&mut credential_id).expect("system randomness");

        Self {
            signing_key,
            credential_id,
            user_handle: None,
            rp_id: rp_id.to_string(),
            origin: origin.to_string(),
            counter: 0,
            counter_step: 1,
            attestation: AttestationStyle::None,
            attestation_certificate: None,
        }
    }

    #[must_use]
    pub fn with_attestation(mut self, attestation: AttestationStyle) -> Self {
        self.attestation = attestation;
        if matches!(
            attestation,
            AttestationStyle::PackedCertificate | AttestationStyle::FidoU2f
        ) {
            self.attestation_certificate = Some(AttestationCertificate::generate());
        }
        self
    }

    /// Behave like an authenticator without a signature counter (always 0)
    #[must_use]
    pub fn without_counter(mut self) -> Self {
        self.counter = 0;
        self.counter_step = 0;
        self
    }

    #[must_use]
    pub fn credential_id(&self) -> Vec<u8> {
        self.credential_id.clone()
    }

    #[must_use]
    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn set_counter(&mut self, counter: u32) {
        self.counter = counter;
    }

    pub fn register(&mut self, options: &RegistrationOptions) -> RegistrationResponse {
        self.register_with(options, &Tamper::default())
    }

    /// Answer registration options
    ///
    /// # Panics
    /// Panics if the options carry an undecodable challenge or user id.
    pub fn register_with(
        &mut self,
        options: &RegistrationOptions,
        tamper: &Tamper,
    ) -> RegistrationResponse {
        self.user_handle = Some(codec::decode(&options.user.id, "user id").expect("user id"));

        let client_data = self.client_data(TYPE_CREATE, &options.challenge, tamper);
        let flags = tamper
            .flags
            .unwrap_or(FLAG_USER_PRESENT | FLAG_USER_VERIFIED | FLAG_ATTESTED_CREDENTIAL_DATA);
        let counter = tamper.counter.unwrap_or(self.counter);

        let mut auth_data = self.auth_data_header(tamper, flags, counter);
        auth_data.extend_from_slice(&[0u8; 16]); // aaguid
        let id_len = u16::try_from(self.credential_id.len()).expect("credential id length");
        auth_data.extend_from_slice(&id_len.to_be_bytes());
        auth_data.extend_from_slice(&self.credential_id);
        auth_data.extend_from_slice(&self.cose_key());

        let client_data_hash = digest::digest(&digest::SHA256, &client_data);
        let alg = (
            Value::Text("alg".to_string()),
            Value::Integer(COSE_ALG_ES256.into()),
        );
        let signature = |bytes: Vec<u8>| (Value::Text("sig".to_string()), Value::Bytes(bytes));
        let (format, statement) = match self.attestation {
            AttestationStyle::None => ("none", Vec::new()),
            AttestationStyle::PackedSelf => (
                "packed",
                vec![alg, signature(self.sign(&auth_data, &client_data, tamper))],
            ),
            AttestationStyle::PackedCertificate => {
                let mut message = auth_data.clone();
                message.extend_from_slice(client_data_hash.as_ref());
                (
                    "packed",
                    vec![
                        alg,
                        signature(self.certificate_signature(&message, tamper)),
                        self.certificate_chain(),
                    ],
                )
            }
            AttestationStyle::FidoU2f => {
                let mut message = vec![0x00];
                message.extend_from_slice(&auth_data[..32]);
                message.extend_from_slice(client_data_hash.as_ref());
                message.extend_from_slice(&self.credential_id);
                message.extend_from_slice(
                    self.signing_key
                        .verifying_key()
                        .to_encoded_point(false)
                        .as_bytes(),
                );
                (
                    "fido-u2f",
                    vec![
                        signature(self.certificate_signature(&message, tamper)),
                        self.certificate_chain(),
                    ],
                )
            }
        };
        let object = Value::Map(vec![
            (
                Value::Text("fmt".to_string()),
                Value::Text(format.to_string()),
            ),
            (Value::Text("attStmt".to_string()), Value::Map(statement)),
            (Value::Text("authData".to_string()), Value::Bytes(auth_data)),
        ]);
        let mut attestation_object = Vec::new();
        ciborium::into_writer(&object, &mut attestation_object).expect("CBOR encoding");

        RegistrationResponse {
            id: codec::encode(&self.credential_id),
            raw_id: STANDARD.encode(&self.credential_id),
            response: AttestationPayload {
                client_data_json: codec::encode(&client_data),
                attestation_object: codec::encode(&attestation_object),
            },
            r#type: Some("public-key".to_string()),
        }
    }

    pub fn login(&mut self, options: &LoginOptions) -> LoginResponse {
        self.login_with(options, &Tamper::default())
    }

    /// Answer login options, advancing the signature counter
    ///
    /// # Panics
    /// Panics if the options carry an undecodable challenge.
    pub fn login_with(&mut self, options: &LoginOptions, tamper: &Tamper) -> LoginResponse {
        self.counter += self.counter_step;
        let counter = tamper.counter.unwrap_or(self.counter);

        let client_data = self.client_data(TYPE_GET, &options.challenge, tamper);
        let flags = tamper.flags.unwrap_or(FLAG_USER_PRESENT | FLAG_USER_VERIFIED);
        let auth_data = self.auth_data_header(tamper, flags, counter);
        let signature = self.sign(&auth_data, &client_data, tamper);

        let user_handle = tamper.user_handle.as_ref().or(self.user_handle.as_ref());

        LoginResponse {
            id: codec::encode(&self.credential_id),
            raw_id: STANDARD.encode(&self.credential_id),
            response: AssertionPayload {
                client_data_json: codec::encode(&client_data),
                authenticator_data: codec::encode(&auth_data),
                signature: codec::encode(&signature),
                user_handle: user_handle.map(|h| codec::encode(h)),
            },
            r#type: Some("public-key".to_string()),
        }
    }

    fn client_data(&self, ceremony_type: &str, challenge: &str, tamper: &Tamper) -> Vec<u8> {
        let challenge = match &tamper.challenge {
            Some(bytes) => codec::encode(bytes),
            None => codec::encode(&codec::decode(challenge, "challenge").expect("challenge")),
        };
        let document = json!({
            "type": tamper.ceremony_type.as_deref().unwrap_or(ceremony_type),
            "challenge": challenge,
            "origin": tamper.origin.as_deref().unwrap_or(&self.origin),
            "crossOrigin": false,
        });
        serde_json::to_vec(&document).expect("client data JSON")
    }

    fn auth_data_header(&self, tamper: &Tamper, flags: u8, counter: u32) -> Vec<u8> {
        let rp_id = tamper.rp_id.as_deref().unwrap_or(&self.rp_id);
        let mut data = digest::digest(&digest::SHA256, rp_id.as_bytes())
            .as_ref()
            .to_vec();
        data.push(flags);
        data.extend_from_slice(&counter.to_be_bytes());
        data
    }

    fn sign(&self, auth_data: &[u8], client_data: &[u8], tamper: &Tamper) -> Vec<u8> {
        let mut message = auth_data.to_vec();
        message.extend_from_slice(digest::digest(&digest::SHA256, client_data).as_ref());
        let signature: Signature = self.signing_key.sign(&message);
        corrupt_if_asked(signature.to_der().as_bytes().to_vec(), tamper)
    }

    fn attestation_certificate(&self) -> &AttestationCertificate {
        self.attestation_certificate
            .as_ref()
            .expect("attestation certificate for certificate-based styles")
    }

    fn certificate_signature(&self, message: &[u8], tamper: &Tamper) -> Vec<u8> {
        corrupt_if_asked(self.attestation_certificate().sign(message), tamper)
    }

    fn certificate_chain(&self) -> (Value, Value) {
        (
            Value::Text("x5c".to_string()),
            Value::Array(vec![Value::Bytes(
                self.attestation_certificate().der().to_vec(),
            )]),
        )
    }

    fn cose_key(&self) -> Vec<u8> {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        let coordinate = |c: Option<&p256::FieldBytes>| {
            Value::Bytes(c.expect("uncompressed point").to_vec())
        };
        let key = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(2.into())),
            (Value::Integer(3.into()), Value::Integer(COSE_ALG_ES256.into())),
            (Value::Integer((-1).into()), Value::Integer(1.into())),
            (Value::Integer((-2).into()), coordinate(point.x())),
            (Value::Integer((-3).into()), coordinate(point.y())),
        ]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&key, &mut bytes).expect("CBOR encoding");
        bytes
    }
}

fn corrupt_if_asked(mut der: Vec<u8>, tamper: &Tamper) -> Vec<u8> {
    if tamper.corrupt_signature {
        if let Some(last) = der.last_mut() {
            *last ^= 0x01;
        }
    }
    der
}
