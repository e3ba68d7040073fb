//! End-to-end scenarios over the in-memory transport.

mod common;

use common::{gbar, Committee};
use curve25519_dalek::scalar::Scalar;
use tdkg::{DkgError, ErrorKind, EMBED_LEN};

#[test]
fn encrypt_then_decrypt_round_trip() {
    let committee = Committee::spin(3);
    committee.setup(3).unwrap();

    let message = b"Hello world";
    for actor in &committee.actors {
        let (pair, remainder) = actor.encrypt(message).unwrap();
        assert!(remainder.is_empty());

        let decrypted = actor.decrypt(&pair).unwrap();
        assert_eq!(decrypted, message);
    }
}

#[test]
fn operations_before_setup_fail() {
    let committee = Committee::spin(3);

    let err = committee.actors[0].encrypt(b"too early").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    let err = committee.actors[0].get_public_key().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    let err = committee.actors[0]
        .issue_master_credential("early")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
}

#[test]
fn second_setup_is_rejected() {
    let committee = Committee::spin(3);
    committee.setup(3).unwrap();

    let err = committee.setup(3).unwrap_err();
    assert!(matches!(err, DkgError::SetupAlreadyDone));
}

#[test]
fn every_node_reports_the_same_key() {
    let committee = Committee::spin(4);
    let dist_key = committee.setup(3).unwrap();

    for actor in &committee.actors {
        assert_eq!(actor.get_public_key().unwrap(), dist_key);
    }
}

#[test]
fn single_node_committee_works() {
    let committee = Committee::spin(1);
    committee.setup(1).unwrap();

    let (pair, _) = committee.actors[0].encrypt(b"solo").unwrap();
    assert_eq!(committee.actors[0].decrypt(&pair).unwrap(), b"solo");
}

#[test]
fn empty_message_round_trips() {
    let committee = Committee::spin(3);
    committee.setup(2).unwrap();

    let (pair, remainder) = committee.actors[0].encrypt(b"").unwrap();
    assert!(remainder.is_empty());
    assert!(committee.actors[0].decrypt(&pair).unwrap().is_empty());
}

#[test]
fn long_messages_return_the_tail() {
    let committee = Committee::spin(3);
    committee.setup(3).unwrap();

    let message = [0x5Au8; 48];
    let (pair, remainder) = committee.actors[1].encrypt(&message).unwrap();
    assert_eq!(remainder, &message[EMBED_LEN..]);
    assert_eq!(
        committee.actors[1].decrypt(&pair).unwrap(),
        &message[..EMBED_LEN]
    );
}

#[test]
fn verifiable_batch_round_trips_in_order() {
    let committee = Committee::spin(3);
    committee.setup(3).unwrap();
    let gbar = gbar(&committee.ctx);

    let keys: Vec<Vec<u8>> = (0..5u8).map(|i| vec![i; 29]).collect();
    let mut batch = Vec::new();
    for key in &keys {
        let (ct, remainder) = committee.actors[0].verifiable_encrypt(key, &gbar).unwrap();
        assert!(remainder.is_empty());
        batch.push(ct);
    }

    let decrypted = committee.actors[0].verifiable_decrypt(&batch).unwrap();
    assert_eq!(decrypted, keys);
}

#[test]
fn tampered_proof_fails_the_batch() {
    let committee = Committee::spin(5);
    committee.setup(3).unwrap();
    let gbar = gbar(&committee.ctx);

    let mut batch = Vec::new();
    for i in 0..3u8 {
        let (ct, _) = committee.actors[0]
            .verifiable_encrypt(&[i; 16], &gbar)
            .unwrap();
        batch.push(ct);
    }
    batch[2].f += Scalar::ONE;

    let err = committee.actors[0].verifiable_decrypt(&batch).unwrap_err();
    assert!(matches!(err, DkgError::ProofInvalid(_)));
}

#[test]
fn empty_batch_decrypts_to_nothing() {
    let committee = Committee::spin(3);
    committee.setup(3).unwrap();

    let decrypted = committee.actors[0].verifiable_decrypt(&[]).unwrap();
    assert!(decrypted.is_empty());
}

#[test]
fn credential_chain_verifies() {
    let committee = Committee::spin(3);
    committee.setup(3).unwrap();

    let (master, master_sigs) = committee.actors[0]
        .issue_master_credential("alice")
        .unwrap();
    assert!(!master.is_empty());
    assert_eq!(master_sigs.len(), 3);

    let (event, event_sigs) = committee.actors[0]
        .issue_event_credential("alice", "spring gala", &master, &master_sigs)
        .unwrap();

    let verified = committee.actors[0]
        .verify_event_credential("alice", "spring gala", &event, &event_sigs)
        .unwrap();
    assert!(verified);

    // A different event name must not verify under the same signatures.
    let err = committee.actors[0]
        .verify_event_credential("alice", "autumn gala", &event, &event_sigs)
        .unwrap_err();
    assert!(matches!(err, DkgError::CredentialInvalid(_)));
}

#[test]
fn duplicate_identity_is_rejected() {
    let committee = Committee::spin(3);
    committee.setup(3).unwrap();

    committee.actors[0].issue_master_credential("alice").unwrap();
    let err = committee.actors[0]
        .issue_master_credential("alice")
        .unwrap_err();
    assert!(matches!(err, DkgError::DuplicateIdentity(_)));

    // A different coordinator keeps its own dedup set.
    committee.actors[1].issue_master_credential("alice").unwrap();
}

#[test]
fn forged_master_chain_is_rejected() {
    let committee = Committee::spin(3);
    committee.setup(3).unwrap();

    let (master, mut master_sigs) = committee.actors[0]
        .issue_master_credential("alice")
        .unwrap();
    let (_, bob_sigs) = committee.actors[0].issue_master_credential("bob").unwrap();

    // Swap in a valid signature for a different identity.
    master_sigs[1] = bob_sigs[1].clone();

    let err = committee.actors[0]
        .issue_event_credential("alice", "spring gala", &master, &master_sigs)
        .unwrap_err();
    assert!(matches!(err, DkgError::CredentialInvalid(_)));
}

#[test]
fn reshare_preserves_the_key_and_old_ciphertexts() {
    let mut committee = Committee::spin(3);
    let dist_key = committee.setup(3).unwrap();

    let (pair, _) = committee.actors[0].encrypt(b"before reshare").unwrap();

    // One fresh joiner; the old members stay.
    let joiner = committee.join_node("127.0.0.1:2010");

    let new_addresses = committee.addresses();
    let new_pubkeys = committee.dkg_pubkeys();
    committee.actors[0]
        .reshare(&new_addresses, &new_pubkeys, 3)
        .unwrap();

    assert_eq!(committee.actors[0].get_public_key().unwrap(), dist_key);
    assert_eq!(committee.actors[joiner].get_public_key().unwrap(), dist_key);

    // A ciphertext from before the reshare still decrypts, now through
    // the four-member committee.
    let decrypted = committee.actors[0].decrypt(&pair).unwrap();
    assert_eq!(decrypted, b"before reshare");

    // The joiner can run operations too.
    let (pair, _) = committee.actors[joiner].encrypt(b"after reshare").unwrap();
    assert_eq!(
        committee.actors[joiner].decrypt(&pair).unwrap(),
        b"after reshare"
    );
}

#[test]
fn reshare_before_setup_fails() {
    let committee = Committee::spin(3);
    let err = committee.actors[0]
        .reshare(&committee.addresses(), &committee.dkg_pubkeys(), 2)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
}

#[test]
fn invalid_roster_is_rejected() {
    let committee = Committee::spin(3);

    let err = committee.actors[0]
        .setup(
            &committee.addresses(),
            &committee.dkg_pubkeys(),
            &committee.bdn_pubkeys(),
            4,
        )
        .unwrap_err();
    assert!(matches!(err, DkgError::RosterInvalid(_)));

    let err = committee.actors[0]
        .setup(
            &committee.addresses()[..2],
            &committee.dkg_pubkeys(),
            &committee.bdn_pubkeys(),
            2,
        )
        .unwrap_err();
    assert!(matches!(err, DkgError::RosterInvalid(_)));
}
