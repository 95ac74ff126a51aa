//! End-to-end thread flows between two clients with separate stores.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use sk_client::{Client, ClientError, InvitationOptions, ThreadState};
use sk_crypto::{AgreementKeyPair, EcJwk, SigningKeyPair};
use sk_proto::message::parse_message_id;
use sk_proto::{jws, InvitationPayload, ReplyPayload};
use sk_store::{MemoryStore, Storage};

fn new_client(password: &str) -> (Client, MemoryStore) {
    let mut store = MemoryStore::new();
    let client = Client::generate(&mut store, password).unwrap();
    (client, store)
}

fn invitation_thumbprint(invite: &str) -> String {
    let decoded = jws::decode::<InvitationPayload>(invite).unwrap();
    decoded.payload.epk.thumbprint().unwrap()
}

/// Alice invites, Bob replies, Alice ingests, then they exchange more
/// messages. Covers the happy path plus the first-reply shape, monotone
/// ids, and thread state transitions.
#[test]
fn invite_reply_ingest_exchange() {
    let (alice, mut alice_store) = new_client("alice pw 1");
    let (bob, mut bob_store) = new_client("bob pw 2");

    let invite = alice
        .create_invitation(
            &mut alice_store,
            InvitationOptions {
                nickname: Some("alice".into()),
                ..Default::default()
            },
        )
        .unwrap();
    let invite_tp = invitation_thumbprint(&invite);
    assert_eq!(
        alice.thread_state(&alice_store, &invite_tp).unwrap(),
        ThreadState::Invited
    );

    // Bob accepts. His thread is active immediately.
    let r1 = bob
        .reply_to_invitation(&mut bob_store, &invite, "hi")
        .unwrap();
    let bob_threads = bob.threads(&bob_store).unwrap();
    assert_eq!(bob_threads.len(), 1);
    assert_eq!(
        bob.thread_state(&bob_store, &bob_threads[0]).unwrap(),
        ThreadState::Active
    );

    // First reply shape: self-signed header plus ephemeral key.
    let r1_decoded = jws::decode::<ReplyPayload>(&r1).unwrap();
    assert!(r1_decoded.header.jwk.is_some());
    assert!(r1_decoded.payload.epk.is_some());
    assert_eq!(r1_decoded.payload.re, invite_tp);

    // Alice ingests; her thread id is her invitation's epk thumbprint.
    let received = alice.append_thread(&mut alice_store, &r1, None).unwrap();
    assert_eq!(received.message, "hi");
    assert_eq!(received.thread_thumbprint, invite_tp);
    assert_eq!(alice.threads(&alice_store).unwrap(), vec![invite_tp.clone()]);
    assert_eq!(
        alice.thread_state(&alice_store, &invite_tp).unwrap(),
        ThreadState::Active
    );

    // Second message: bare header, addressed to Bob's epk thumbprint,
    // id = invitation id + 2.
    let r2 = alice
        .reply_to_thread(&mut alice_store, &invite_tp, "hello bob", false)
        .unwrap();
    let r2_decoded = jws::decode::<ReplyPayload>(&r2).unwrap();
    assert!(r2_decoded.header.jwk.is_none());
    assert!(r2_decoded.payload.epk.is_none());

    let invite_decoded = jws::decode::<InvitationPayload>(&invite).unwrap();
    let base = invite_decoded.payload.message_id_value().unwrap();
    assert_eq!(r2_decoded.payload.message_id_value().unwrap(), base + 2);

    let bob_epk_tp = r1_decoded.payload.epk.as_ref().unwrap().thumbprint().unwrap();
    assert_eq!(r2_decoded.payload.re, bob_epk_tp);

    // Bob ingests R2 routed by `re`, replies again; Alice ingests that.
    let received = bob.append_thread(&mut bob_store, &r2, None).unwrap();
    assert_eq!(received.message, "hello bob");
    assert_eq!(received.thread_thumbprint, bob_epk_tp);

    let r3 = bob
        .reply_to_thread(&mut bob_store, &bob_epk_tp, "hello alice", false)
        .unwrap();
    let r3_decoded = jws::decode::<ReplyPayload>(&r3).unwrap();
    assert_eq!(r3_decoded.payload.message_id_value().unwrap(), base + 3);

    let received = alice.append_thread(&mut alice_store, &r3, None).unwrap();
    assert_eq!(received.message, "hello alice");

    // Alice's log: invitation, r1, r2, r3 with ids increasing by one.
    let log = alice.messages(&alice_store, &invite_tp).unwrap();
    assert_eq!(log.len(), 4);
    assert_eq!(log[0], invite);
    let ids: Vec<u64> = log[1..]
        .iter()
        .map(|m| {
            let decoded = jws::decode::<ReplyPayload>(m).unwrap();
            decoded.payload.message_id_value().unwrap()
        })
        .collect();
    assert_eq!(ids, vec![base + 1, base + 2, base + 3]);
}

/// Both sides derive the same AES key for one thread, and keys never
/// leak across threads.
#[test]
fn shared_secrets_match_and_stay_isolated() {
    let (alice, mut alice_store) = new_client("alice pw 1");
    let (bob, mut bob_store) = new_client("bob pw 2");
    let (carol, mut carol_store) = new_client("carol pw 3");

    let invite_b = alice
        .create_invitation(&mut alice_store, InvitationOptions::default())
        .unwrap();
    let invite_c = alice
        .create_invitation(&mut alice_store, InvitationOptions::default())
        .unwrap();

    let r1_bob = bob
        .reply_to_invitation(&mut bob_store, &invite_b, "from bob")
        .unwrap();
    let r1_carol = carol
        .reply_to_invitation(&mut carol_store, &invite_c, "from carol")
        .unwrap();

    alice.append_thread(&mut alice_store, &r1_bob, None).unwrap();
    alice
        .append_thread(&mut alice_store, &r1_carol, None)
        .unwrap();

    let tp_bob_side = bob.threads(&bob_store).unwrap()[0].clone();
    let tp_alice_bob = invitation_thumbprint(&invite_b);
    let tp_alice_carol = invitation_thumbprint(&invite_c);

    // ECDH symmetry: Alice and Bob agree on the thread key.
    let alice_secret = alice
        .read_thread_secret(&alice_store, &tp_alice_bob)
        .unwrap();
    let bob_secret = bob.read_thread_secret(&bob_store, &tp_bob_side).unwrap();
    assert_eq!(alice_secret.secret.as_bytes(), bob_secret.secret.as_bytes());

    // No cross-thread leakage: the Carol-thread key cannot open Bob's
    // ciphertext.
    let carol_secret = alice
        .read_thread_secret(&alice_store, &tp_alice_carol)
        .unwrap();
    assert_ne!(
        alice_secret.secret.as_bytes(),
        carol_secret.secret.as_bytes()
    );

    let r1_decoded = jws::decode::<ReplyPayload>(&r1_bob).unwrap();
    let wrong = sk_crypto::aead::decrypt(
        carol_secret.secret.as_bytes(),
        &r1_decoded.payload.iv_bytes().unwrap(),
        &r1_decoded.payload.ciphertext().unwrap(),
    );
    assert!(wrong.is_err());
}

/// A first reply whose message id skips ahead is rejected before any
/// thread state is created.
#[test]
fn out_of_order_first_reply_is_rejected() {
    let (alice, mut alice_store) = new_client("alice pw 1");

    let invite = alice
        .create_invitation(&mut alice_store, InvitationOptions::default())
        .unwrap();
    let invite_decoded = jws::decode::<InvitationPayload>(&invite).unwrap();
    let invite_tp = invite_decoded.payload.epk.thumbprint().unwrap();
    let base = invite_decoded.payload.message_id_value().unwrap();

    // A well-formed, correctly signed first reply with id = base + 2.
    let mallory = SigningKeyPair::generate();
    let mallory_epk = AgreementKeyPair::generate();
    let payload = ReplyPayload {
        re: invite_tp.clone(),
        message_id: format!("{:x}", base + 2),
        message: URL_SAFE_NO_PAD.encode(b"junk"),
        iv: URL_SAFE_NO_PAD.encode([0u8; 12]),
        epk: Some(mallory_epk.public_jwk().unwrap()),
    };
    let header = jws::Header::with_key(&mallory.public_jwk().unwrap());
    let forged = jws::sign(&header, &payload, &mallory).unwrap();

    let err = alice.append_thread(&mut alice_store, &forged, None);
    assert!(matches!(
        err,
        Err(ClientError::OutOfOrder { expected, got }) if got == expected + 1
    ));

    // Nothing was committed: the thread is still only invited.
    assert_eq!(
        alice.thread_state(&alice_store, &invite_tp).unwrap(),
        ThreadState::Invited
    );
    assert!(alice.threads(&alice_store).unwrap().is_empty());
}

/// A correctly signed, correctly sequenced first reply whose `epk` is
/// not a point on P-384 is rejected without creating any thread state,
/// and the genuine reply still lands afterwards.
#[test]
fn off_curve_first_reply_leaves_no_thread_state() {
    let (alice, mut alice_store) = new_client("alice pw 1");
    let (bob, mut bob_store) = new_client("bob pw 2");

    let invite = alice
        .create_invitation(&mut alice_store, InvitationOptions::default())
        .unwrap();
    let invite_decoded = jws::decode::<InvitationPayload>(&invite).unwrap();
    let invite_tp = invite_decoded.payload.epk.thumbprint().unwrap();
    let base = invite_decoded.payload.message_id_value().unwrap();

    let mallory = SigningKeyPair::generate();
    let bad_epk = EcJwk {
        kty: "EC".into(),
        crv: "P-384".into(),
        x: URL_SAFE_NO_PAD.encode([1u8; 48]),
        y: URL_SAFE_NO_PAD.encode([2u8; 48]),
        d: None,
    };
    let payload = ReplyPayload {
        re: invite_tp.clone(),
        message_id: format!("{:x}", base + 1),
        message: URL_SAFE_NO_PAD.encode(b"junk"),
        iv: URL_SAFE_NO_PAD.encode([0u8; 12]),
        epk: Some(bad_epk),
    };
    let header = jws::Header::with_key(&mallory.public_jwk().unwrap());
    let forged = jws::sign(&header, &payload, &mallory).unwrap();

    assert!(alice.append_thread(&mut alice_store, &forged, None).is_err());

    // Nothing was committed: still just an invitation.
    assert_eq!(
        alice.thread_state(&alice_store, &invite_tp).unwrap(),
        ThreadState::Invited
    );
    assert!(alice.threads(&alice_store).unwrap().is_empty());

    // Bob's real reply is unaffected.
    let r1 = bob
        .reply_to_invitation(&mut bob_store, &invite, "hi")
        .unwrap();
    let received = alice.append_thread(&mut alice_store, &r1, None).unwrap();
    assert_eq!(received.message, "hi");
    assert_eq!(
        alice.thread_state(&alice_store, &invite_tp).unwrap(),
        ThreadState::Active
    );
}

/// Tampering with the ciphertext inside a signed reply breaks the
/// signature, not just the decryption.
#[test]
fn tampered_reply_fails_signature() {
    let (alice, mut alice_store) = new_client("alice pw 1");
    let (bob, mut bob_store) = new_client("bob pw 2");

    let invite = alice
        .create_invitation(&mut alice_store, InvitationOptions::default())
        .unwrap();
    let r1 = bob
        .reply_to_invitation(&mut bob_store, &invite, "hi")
        .unwrap();

    // Re-encode the payload with one ciphertext character changed.
    let decoded = jws::decode::<ReplyPayload>(&r1).unwrap();
    let mut payload = decoded.payload.clone();
    let mut chars: Vec<char> = payload.message.chars().collect();
    chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
    payload.message = chars.into_iter().collect();

    let parts: Vec<&str> = r1.split('.').collect();
    let forged = format!(
        "{}.{}.{}",
        parts[0],
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap()),
        parts[2]
    );

    let err = alice.append_thread(&mut alice_store, &forged, None);
    assert!(matches!(err, Err(ClientError::BadSignature)));

    // Garbling the whole envelope is caught even earlier.
    let err = alice.append_thread(&mut alice_store, "one.segment", None);
    assert!(matches!(err, Err(ClientError::MalformedEnvelope(_))));
}

/// Messages that resolve to nothing fail with the matching error.
#[test]
fn unknown_routing_targets() {
    let (alice, mut alice_store) = new_client("alice pw 1");
    let (bob, mut bob_store) = new_client("bob pw 2");

    let invite = alice
        .create_invitation(&mut alice_store, InvitationOptions::default())
        .unwrap();
    let r1 = bob
        .reply_to_invitation(&mut bob_store, &invite, "hi")
        .unwrap();

    // Bob's first reply delivered to the wrong client: no invitation.
    let (carol, mut carol_store) = new_client("carol pw 3");
    let err = carol.append_thread(&mut carol_store, &r1, None);
    assert!(matches!(err, Err(ClientError::UnknownInvitation(_))));

    // A bare-header reply whose `re` matches no thread.
    alice.append_thread(&mut alice_store, &r1, None).unwrap();
    let invite_tp = invitation_thumbprint(&invite);
    let r2 = alice
        .reply_to_thread(&mut alice_store, &invite_tp, "hello", false)
        .unwrap();
    let err = carol.append_thread(&mut carol_store, &r2, None);
    assert!(matches!(err, Err(ClientError::UnknownThread(_))));
}

/// Re-ingesting an already appended message adds a log entry but leaves
/// thread bookkeeping untouched.
#[test]
fn duplicate_append_is_accepted_without_side_effects() {
    let (alice, mut alice_store) = new_client("alice pw 1");
    let (bob, mut bob_store) = new_client("bob pw 2");

    let invite = alice
        .create_invitation(&mut alice_store, InvitationOptions::default())
        .unwrap();
    let invite_tp = invitation_thumbprint(&invite);
    let r1 = bob
        .reply_to_invitation(&mut bob_store, &invite, "hi")
        .unwrap();

    alice.append_thread(&mut alice_store, &r1, None).unwrap();
    let threads_before = alice.threads(&alice_store).unwrap();
    let id_before: String = alice_store
        .get_json(&format!("message-id:{invite_tp}"))
        .unwrap()
        .unwrap();

    let received = alice.append_thread(&mut alice_store, &r1, None).unwrap();
    assert_eq!(received.message, "hi");

    // Two copies in the log, one thread, same counter.
    let log = alice.messages(&alice_store, &invite_tp).unwrap();
    assert_eq!(log.iter().filter(|m| *m == &r1).count(), 2);
    assert_eq!(alice.threads(&alice_store).unwrap(), threads_before);
    let id_after: String = alice_store
        .get_json(&format!("message-id:{invite_tp}"))
        .unwrap()
        .unwrap();
    assert_eq!(id_before, id_after);
}

/// Self-signing a later reply is legal; verification uses the embedded
/// key. A client can also ingest its own echoed message.
#[test]
fn self_signed_later_reply_and_echo() {
    let (alice, mut alice_store) = new_client("alice pw 1");
    let (bob, mut bob_store) = new_client("bob pw 2");

    let invite = alice
        .create_invitation(&mut alice_store, InvitationOptions::default())
        .unwrap();
    let invite_tp = invitation_thumbprint(&invite);
    let r1 = bob
        .reply_to_invitation(&mut bob_store, &invite, "hi")
        .unwrap();
    alice.append_thread(&mut alice_store, &r1, None).unwrap();

    // Later reply with self_sign = true still verifies at Bob's end.
    let r2 = alice
        .reply_to_thread(&mut alice_store, &invite_tp, "signed again", true)
        .unwrap();
    let r2_decoded = jws::decode::<ReplyPayload>(&r2).unwrap();
    assert!(r2_decoded.header.jwk.is_some());
    let received = bob.append_thread(&mut bob_store, &r2, None).unwrap();
    assert_eq!(received.message, "signed again");

    // Alice's own message echoed back to her: `re` addresses Bob's side,
    // so her identity key verifies it.
    let r3 = alice
        .reply_to_thread(&mut alice_store, &invite_tp, "echo me", false)
        .unwrap();
    let echoed = alice
        .append_thread(&mut alice_store, &r3, Some(&invite_tp))
        .unwrap();
    assert_eq!(echoed.message, "echo me");
}

/// The message counter survives in hex form across the whole flow.
#[test]
fn message_ids_are_hex_strings() {
    let (alice, mut alice_store) = new_client("alice pw 1");
    let (bob, mut bob_store) = new_client("bob pw 2");

    let invite = alice
        .create_invitation(&mut alice_store, InvitationOptions::default())
        .unwrap();
    let invite_tp = invitation_thumbprint(&invite);
    let r1 = bob
        .reply_to_invitation(&mut bob_store, &invite, "hi")
        .unwrap();
    alice.append_thread(&mut alice_store, &r1, None).unwrap();

    let stored: String = alice_store
        .get_json(&format!("message-id:{invite_tp}"))
        .unwrap()
        .unwrap();
    parse_message_id(&stored).unwrap();
}
