use std::sync::Arc;
use std::time::Duration;

use passgate::credentials::{CredentialRecordManager, CredentialStore, FileStore, MemoryStore};
use passgate::testing::constants::{EVIL_ORIGIN, TEST_ORIGIN, TEST_RP_ID};
use passgate::testing::{AttestationStyle, FlakyStore, SoftAuthenticator, Tamper, TestFixtures};
use passgate::webauthn::{
    AttestationPolicy, CeremonyError, CeremonyPolicy, UserVerificationFactor, FLAG_USER_PRESENT,
};
use passgate::CeremonyService;

/// Enrol `alice` and leave her credential's stored counter at `counter`
async fn alice_with_counter(service: &CeremonyService, counter: u32) -> SoftAuthenticator {
    let mut authenticator = TestFixtures::authenticator();
    authenticator.set_counter(counter);
    let start = service.begin_registration("alice", "Alice").unwrap();
    let response = authenticator.register(&start.options);
    let record = service
        .complete_registration(&response, start.pending)
        .await
        .unwrap();
    assert_eq!(record.counter, counter);
    authenticator
}

#[tokio::test]
async fn test_register_and_login_with_packed_self_attestation() {
    let policy = CeremonyPolicy {
        attestation_policy: AttestationPolicy::Direct,
        ..TestFixtures::policy()
    };
    let service = TestFixtures::ceremony_service_with(Arc::new(MemoryStore::new()), policy);
    let mut authenticator =
        TestFixtures::authenticator().with_attestation(AttestationStyle::PackedSelf);

    let start = service.begin_registration("alice", "Alice").unwrap();
    let response = authenticator.register(&start.options);
    let record = service
        .complete_registration(&response, start.pending)
        .await
        .unwrap();
    assert!(record.public_key.starts_with("-----BEGIN PUBLIC KEY-----"));
    assert_eq!(record.algorithm, -7);

    let start = service.begin_login("alice").await.unwrap();
    let response = authenticator.login(&start.options);
    let updated = service
        .complete_login(&response, start.pending)
        .await
        .unwrap();
    assert_eq!(updated.counter, 1);
}

#[tokio::test]
async fn test_direct_policy_rejects_none_attestation() {
    let policy = CeremonyPolicy {
        attestation_policy: AttestationPolicy::Direct,
        ..TestFixtures::policy()
    };
    let service = TestFixtures::ceremony_service_with(Arc::new(MemoryStore::new()), policy);
    let mut authenticator = TestFixtures::authenticator();

    let start = service.begin_registration("alice", "Alice").unwrap();
    let response = authenticator.register(&start.options);
    assert!(matches!(
        service.complete_registration(&response, start.pending).await,
        Err(CeremonyError::UnsupportedAttestation(_))
    ));
    assert!(matches!(
        service.begin_login("alice").await,
        Err(CeremonyError::UnknownUser(_))
    ));
}

#[tokio::test]
async fn test_certificate_attestations_satisfy_direct_policy() {
    for style in [AttestationStyle::PackedCertificate, AttestationStyle::FidoU2f] {
        let policy = CeremonyPolicy {
            attestation_policy: AttestationPolicy::Direct,
            ..TestFixtures::policy()
        };
        let service = TestFixtures::ceremony_service_with(Arc::new(MemoryStore::new()), policy);
        let mut authenticator = TestFixtures::authenticator().with_attestation(style);

        let start = service.begin_registration("alice", "Alice").unwrap();
        let response = authenticator.register(&start.options);
        let record = service
            .complete_registration(&response, start.pending)
            .await
            .unwrap_or_else(|e| panic!("{style:?} registration failed: {e}"));
        assert_eq!(record.algorithm, -7);

        let start = service.begin_login("alice").await.unwrap();
        let response = authenticator.login(&start.options);
        service
            .complete_login(&response, start.pending)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_forged_attestation_signature_rejected() {
    let tamper = Tamper {
        corrupt_signature: true,
        ..Tamper::default()
    };
    for style in [
        AttestationStyle::PackedSelf,
        AttestationStyle::PackedCertificate,
        AttestationStyle::FidoU2f,
    ] {
        let service = TestFixtures::ceremony_service();
        let mut authenticator = TestFixtures::authenticator().with_attestation(style);

        let start = service.begin_registration("alice", "Alice").unwrap();
        let response = authenticator.register_with(&start.options, &tamper);
        assert_eq!(
            service
                .complete_registration(&response, start.pending)
                .await
                .unwrap_err(),
            CeremonyError::SignatureInvalid,
            "{style:?}"
        );
        assert!(matches!(
            service.begin_login("alice").await,
            Err(CeremonyError::UnknownUser(_))
        ));
    }
}

#[tokio::test]
async fn test_algorithm_outside_accepted_list_rejected() {
    let policy = CeremonyPolicy {
        algorithms: vec![-257],
        ..TestFixtures::policy()
    };
    let service = TestFixtures::ceremony_service_with(Arc::new(MemoryStore::new()), policy);
    let mut authenticator = TestFixtures::authenticator();

    let start = service.begin_registration("alice", "Alice").unwrap();
    assert_eq!(start.options.pub_key_cred_params.len(), 1);
    let response = authenticator.register(&start.options);
    assert_eq!(
        service
            .complete_registration(&response, start.pending)
            .await
            .unwrap_err(),
        CeremonyError::UnsupportedAlgorithm(-7)
    );
}

#[tokio::test]
async fn test_response_for_another_challenge_rejected() {
    let service = TestFixtures::ceremony_service();
    let mut authenticator = TestFixtures::authenticator();

    let first = service.begin_registration("alice", "Alice").unwrap();
    let second = service.begin_registration("alice", "Alice").unwrap();
    // Answer the first ceremony's options but complete the second
    let response = authenticator.register(&first.options);

    assert_eq!(
        service
            .complete_registration(&response, second.pending)
            .await
            .unwrap_err(),
        CeremonyError::ChallengeMismatch
    );
}

#[tokio::test]
async fn test_tampered_challenge_rejected_on_login() {
    let service = TestFixtures::ceremony_service();
    let mut authenticator = TestFixtures::enrolled(&service, "alice").await;

    let start = service.begin_login("alice").await.unwrap();
    let tamper = Tamper {
        challenge: Some(vec![0xAB; 32]),
        ..Tamper::default()
    };
    let response = authenticator.login_with(&start.options, &tamper);
    assert_eq!(
        service
            .complete_login(&response, start.pending)
            .await
            .unwrap_err(),
        CeremonyError::ChallengeMismatch
    );
}

#[tokio::test]
async fn test_phishing_origin_rejected() {
    let service = TestFixtures::ceremony_service();
    let mut authenticator = TestFixtures::enrolled(&service, "alice").await;

    let start = service.begin_login("alice").await.unwrap();
    let tamper = Tamper {
        origin: Some(EVIL_ORIGIN.to_string()),
        ..Tamper::default()
    };
    let response = authenticator.login_with(&start.options, &tamper);
    assert_eq!(
        service
            .complete_login(&response, start.pending)
            .await
            .unwrap_err(),
        CeremonyError::OriginMismatch {
            received: EVIL_ORIGIN.to_string()
        }
    );
    // The stored counter is untouched by the failed attempt
    assert_eq!(service.records().find_by_username("alice").await.unwrap().counter, 0);
}

#[tokio::test]
async fn test_wrong_ceremony_type_and_rp_id_rejected() {
    let service = TestFixtures::ceremony_service();
    let mut authenticator = TestFixtures::enrolled(&service, "alice").await;

    let start = service.begin_login("alice").await.unwrap();
    let tamper = Tamper {
        ceremony_type: Some("webauthn.create".to_string()),
        ..Tamper::default()
    };
    let response = authenticator.login_with(&start.options, &tamper);
    assert!(matches!(
        service.complete_login(&response, start.pending).await,
        Err(CeremonyError::CeremonyTypeMismatch { .. })
    ));

    let start = service.begin_login("alice").await.unwrap();
    let tamper = Tamper {
        rp_id: Some("evil.test".to_string()),
        ..Tamper::default()
    };
    let response = authenticator.login_with(&start.options, &tamper);
    assert_eq!(
        service
            .complete_login(&response, start.pending)
            .await
            .unwrap_err(),
        CeremonyError::RelyingPartyMismatch
    );
}

#[tokio::test]
async fn test_corrupted_signature_rejected() {
    let service = TestFixtures::ceremony_service();
    let mut authenticator = TestFixtures::enrolled(&service, "alice").await;

    let start = service.begin_login("alice").await.unwrap();
    let tamper = Tamper {
        corrupt_signature: true,
        ..Tamper::default()
    };
    let response = authenticator.login_with(&start.options, &tamper);
    assert_eq!(
        service
            .complete_login(&response, start.pending)
            .await
            .unwrap_err(),
        CeremonyError::SignatureInvalid
    );
}

#[tokio::test]
async fn test_user_verification_factor_enforced() {
    let policy = CeremonyPolicy {
        assertion_factor: UserVerificationFactor::First,
        ..TestFixtures::policy()
    };
    let service = TestFixtures::ceremony_service_with(Arc::new(MemoryStore::new()), policy);
    let mut authenticator = TestFixtures::enrolled(&service, "alice").await;

    // Touch only, no PIN
    let start = service.begin_login("alice").await.unwrap();
    let tamper = Tamper {
        flags: Some(FLAG_USER_PRESENT),
        ..Tamper::default()
    };
    let response = authenticator.login_with(&start.options, &tamper);
    assert!(matches!(
        service.complete_login(&response, start.pending).await,
        Err(CeremonyError::UserVerificationPolicyViolation(_))
    ));
}

#[tokio::test]
async fn test_mismatched_user_handle_rejected() {
    let service = TestFixtures::ceremony_service();
    let mut authenticator = TestFixtures::enrolled(&service, "alice").await;

    let start = service.begin_login("alice").await.unwrap();
    let tamper = Tamper {
        user_handle: Some(vec![0xEE; 32]),
        ..Tamper::default()
    };
    let response = authenticator.login_with(&start.options, &tamper);
    assert_eq!(
        service
            .complete_login(&response, start.pending)
            .await
            .unwrap_err(),
        CeremonyError::UserHandleMismatch
    );
}

#[tokio::test]
async fn test_repeated_counter_is_replay() {
    let service = TestFixtures::ceremony_service();
    let mut authenticator = alice_with_counter(&service, 5).await;

    let start = service.begin_login("alice").await.unwrap();
    let tamper = Tamper {
        counter: Some(5),
        ..Tamper::default()
    };
    let response = authenticator.login_with(&start.options, &tamper);
    assert_eq!(
        service
            .complete_login(&response, start.pending)
            .await
            .unwrap_err(),
        CeremonyError::CounterReplaySuspected {
            stored: 5,
            received: 5
        }
    );
}

#[tokio::test]
async fn test_advancing_counter_persisted() {
    let service = TestFixtures::ceremony_service();
    let mut authenticator = alice_with_counter(&service, 5).await;

    let start = service.begin_login("alice").await.unwrap();
    let response = authenticator.login(&start.options);
    service
        .complete_login(&response, start.pending)
        .await
        .unwrap();
    assert_eq!(service.records().find_by_username("alice").await.unwrap().counter, 6);
}

#[tokio::test]
async fn test_authenticator_without_counter_accepted() {
    let service = TestFixtures::ceremony_service();
    let mut authenticator = TestFixtures::authenticator().without_counter();
    let start = service.begin_registration("alice", "Alice").unwrap();
    let response = authenticator.register(&start.options);
    service
        .complete_registration(&response, start.pending)
        .await
        .unwrap();

    for _ in 0..2 {
        let start = service.begin_login("alice").await.unwrap();
        let response = authenticator.login(&start.options);
        let record = service
            .complete_login(&response, start.pending)
            .await
            .unwrap();
        assert_eq!(record.counter, 0);
    }
}

#[tokio::test]
async fn test_duplicate_registration_keeps_original() {
    let service = TestFixtures::ceremony_service();
    TestFixtures::enrolled(&service, "alice").await;
    let original = service.records().find_by_username("alice").await.unwrap();

    let mut intruder = TestFixtures::authenticator();
    let start = service.begin_registration("alice", "Mallory").unwrap();
    let response = intruder.register(&start.options);
    assert_eq!(
        service
            .complete_registration(&response, start.pending)
            .await
            .unwrap_err(),
        CeremonyError::DuplicateUser("alice".to_string())
    );
    assert_eq!(
        service.records().find_by_username("alice").await.unwrap(),
        original
    );
}

#[tokio::test]
async fn test_login_for_unknown_user() {
    let service = TestFixtures::ceremony_service();
    assert!(matches!(
        service.begin_login("nobody").await,
        Err(CeremonyError::UnknownUser(_))
    ));
}

#[tokio::test]
async fn test_unknown_credential_rejected() {
    let service = TestFixtures::ceremony_service();
    TestFixtures::enrolled(&service, "alice").await;

    let mut stranger = SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN);
    let start = service.begin_login("alice").await.unwrap();
    let response = stranger.login(&start.options);
    assert_eq!(
        service
            .complete_login(&response, start.pending)
            .await
            .unwrap_err(),
        CeremonyError::UnknownCredential
    );
}

#[tokio::test]
async fn test_store_outage_is_retryable() {
    let store = FlakyStore::failing();
    let service = TestFixtures::ceremony_service_with(
        Arc::clone(&store) as Arc<dyn CredentialStore>,
        TestFixtures::policy(),
    );
    TestFixtures::enrolled(&service, "alice").await;

    store.set_failing(true);
    let err = service.begin_login("alice").await.unwrap_err();
    assert!(err.is_retryable());

    store.set_failing(false);
    assert!(service.begin_login("alice").await.is_ok());
}

#[tokio::test]
async fn test_stalled_store_times_out() {
    let store = FlakyStore::stalling(Duration::from_secs(2));
    let manager = Arc::new(CredentialRecordManager::new(
        Arc::clone(&store) as Arc<dyn CredentialStore>,
        Duration::from_millis(50),
    ));
    let service = CeremonyService::new(
        TestFixtures::relying_party(),
        TestFixtures::policy(),
        manager,
    );
    TestFixtures::enrolled(&service, "alice").await;

    store.set_failing(true);
    assert!(matches!(
        service.begin_login("alice").await,
        Err(CeremonyError::StoreUnavailable(_))
    ));
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");

    let mut authenticator = {
        let service = TestFixtures::ceremony_service_with(
            Arc::new(FileStore::new(&path)),
            TestFixtures::policy(),
        );
        TestFixtures::enrolled(&service, "alice").await
    };

    // A new service over the same file sees the enrolled credential
    let service =
        TestFixtures::ceremony_service_with(Arc::new(FileStore::new(&path)), TestFixtures::policy());
    let start = service.begin_login("alice").await.unwrap();
    let response = authenticator.login(&start.options);
    let record = service
        .complete_login(&response, start.pending)
        .await
        .unwrap();
    assert_eq!(record.counter, 1);

    let document: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(document["alice"]["counter"], 1);
}
