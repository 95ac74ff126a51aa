//! Message threads: invitations, replies, and ingest.
//!
//! Protocol:
//!   The inviter mints a fresh ECDH keypair, backs it up self-encrypted,
//!   and publishes a signed invitation carrying the public half plus a
//!   random starting message id. The replier mints its own keypair,
//!   derives the shared AES key, and answers with a self-signed first
//!   reply (`header.jwk` + `payload.epk`) whose id is the invitation's
//!   plus one. From then on both sides exchange bare replies addressed
//!   by thread thumbprint, ids increasing by one per message.
//!
//! Thread state:
//!   `Invited` — invitation issued, no reply ingested yet (inviter only).
//!   `Active`  — `thread-info` exists; replies flow both ways.
//!   Threads are append-only; there is no terminal state.
//!
//! Every ingest path verifies the envelope signature before anything is
//! persisted, and every outgoing reply is self-verified and
//! self-decrypted before its storage writes happen.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroizing, ZeroizeOnDrop};

use sk_crypto::{aead, keys::derive_shared, EcJwk, SharedKey};
use sk_proto::message::{format_message_id, parse_message_id};
use sk_proto::{jws, InvitationPayload, ReplyPayload, MAX_MESSAGE_ID};
use sk_store::keys as ns;
use sk_store::{Storage, ThreadInfo};

use crate::client::Client;
use crate::error::ClientError;

/// Optional plaintext fields on an invitation.
#[derive(Debug, Clone, Default)]
pub struct InvitationOptions {
    pub note: Option<String>,
    pub nickname: Option<String>,
}

/// A decrypted incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub thread_thumbprint: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Invitation issued, no reply ingested yet.
    Invited,
    /// Thread info exists; messages flow.
    Active,
}

/// The live key material for one thread: the derived AES key and this
/// side's ephemeral public JWK.
pub struct ThreadSecret {
    pub secret: SharedKey,
    pub epk: EcJwk,
}

/// Serialized form of a thread's ECDH keypair, stored self-encrypted.
#[derive(Serialize, Deserialize, ZeroizeOnDrop)]
struct ThreadKeyPair {
    #[serde(rename = "publicKey")]
    public_key: EcJwk,
    #[serde(rename = "privateKey")]
    private_key: EcJwk,
}

impl Client {
    // ── Outgoing ─────────────────────────────────────────────────────────────

    /// Issue an invitation. Returns the signed JWS to hand to the peer;
    /// the new thread stays `Invited` until the peer's reply is ingested.
    pub fn create_invitation<S: Storage>(
        &self,
        store: &mut S,
        options: InvitationOptions,
    ) -> Result<String, ClientError> {
        let (thumbprint, epk) = self.make_thread_keys(store)?;

        let message_id: u64 = OsRng.gen_range(0..MAX_MESSAGE_ID);
        let payload = InvitationPayload {
            message_id: format_message_id(message_id),
            epk,
            note: options.note,
            nickname: options.nickname,
        };
        let header = jws::Header::with_key(self.identity_public());
        let signed = jws::sign(&header, &payload, self.signing())?;

        store.set_json(&ns::invitation(&thumbprint), &signed)?;
        tracing::info!(thread = %thumbprint, "Created invitation");
        Ok(signed)
    }

    /// Accept an invitation: verify it, start the local thread, and send
    /// the (self-signed) first reply.
    pub fn reply_to_invitation<S: Storage>(
        &self,
        store: &mut S,
        signed_invite: &str,
        msg: &str,
    ) -> Result<String, ClientError> {
        let decoded = jws::decode::<InvitationPayload>(signed_invite)?;
        let inviter = decoded.header.jwk.clone().ok_or_else(|| {
            ClientError::MalformedEnvelope("Invitation has no embedded identity key".into())
        })?;
        decoded.verify_embedded()?;

        let my_thumbprint = self.start_thread(
            store,
            signed_invite,
            decoded.payload.epk.clone(),
            inviter,
            &decoded.payload.message_id,
            None,
        )?;
        self.reply_to_thread(store, &my_thumbprint, msg, true)
    }

    /// Encrypt and sign one message on an active thread.
    ///
    /// `self_sign` embeds the identity key and the thread `epk`; it is
    /// required on the first reply of a thread and harmless later.
    ///
    /// Concurrent calls on the same thread race on the message counter;
    /// callers must issue per-thread operations serially.
    pub fn reply_to_thread<S: Storage>(
        &self,
        store: &mut S,
        thread_thumbprint: &str,
        msg: &str,
        self_sign: bool,
    ) -> Result<String, ClientError> {
        let info = self.require_thread_info(store, thread_thumbprint)?;
        let secret = self.thread_secret(store, &info)?;

        let iv = aead::random_iv();
        let ciphertext = aead::encrypt(secret.secret.as_bytes(), &iv, msg.as_bytes())?;

        let id_key = ns::message_id(thread_thumbprint);
        let current: String = store
            .get_json(&id_key)?
            .ok_or_else(|| ClientError::NotFound(id_key.clone()))?;
        let next = parse_message_id(&current)? + 1;
        if next >= MAX_MESSAGE_ID {
            return Err(ClientError::MessageIdOverflow);
        }

        let payload = ReplyPayload {
            re: info.their_epk.thumbprint()?,
            message_id: format_message_id(next),
            message: URL_SAFE_NO_PAD.encode(&ciphertext),
            iv: URL_SAFE_NO_PAD.encode(iv),
            epk: if self_sign {
                Some(secret.epk.clone())
            } else {
                None
            },
        };
        let header = if self_sign {
            jws::Header::with_key(self.identity_public())
        } else {
            jws::Header::bare()
        };
        let signed = jws::sign(&header, &payload, self.signing())?;

        // Self-verify and self-decrypt before any storage write.
        self.self_test_reply(&signed, &secret, msg)?;

        store.set_json(&id_key, &format_message_id(next))?;
        store.append_json(&ns::messages(thread_thumbprint), &signed)?;
        tracing::debug!(thread = %thread_thumbprint, message_id = next, "Appended outgoing message");
        Ok(signed)
    }

    // ── Ingest ───────────────────────────────────────────────────────────────

    /// Ingest an incoming message.
    ///
    /// Without a `thread_thumbprint` the message is routed by its `re`
    /// field: a bare header resolves to an existing thread, a self-signed
    /// header bootstraps a thread from one of this client's invitations.
    pub fn append_thread<S: Storage>(
        &self,
        store: &mut S,
        signed: &str,
        thread_thumbprint: Option<&str>,
    ) -> Result<ReceivedMessage, ClientError> {
        match thread_thumbprint {
            Some(thumbprint) => self.append_known(store, signed, thumbprint),
            None => self.append_routed(store, signed),
        }
    }

    fn append_routed<S: Storage>(
        &self,
        store: &mut S,
        signed: &str,
    ) -> Result<ReceivedMessage, ClientError> {
        let decoded = jws::decode::<ReplyPayload>(signed)?;
        let re = decoded.payload.re.clone();

        let sender = match decoded.header.jwk.clone() {
            None => {
                // Subsequent message: `re` addresses our thread id.
                return if store.has(&ns::thread_info(&re))? {
                    self.append_known(store, signed, &re)
                } else {
                    Err(ClientError::UnknownThread(re))
                };
            }
            Some(sender) => sender,
        };

        // Self-signed: the peer's first reply to one of our invitations.
        let their_epk = decoded
            .payload
            .epk
            .clone()
            .ok_or(ClientError::MalformedFirstReply)?;
        let signed_invite: String = store
            .get_json(&ns::invitation(&re))?
            .ok_or_else(|| ClientError::UnknownInvitation(re.clone()))?;

        decoded.verify_embedded()?;

        let invitation = jws::decode::<InvitationPayload>(&signed_invite)?;
        let expected = invitation.payload.message_id_value()? + 1;
        let got = decoded.payload.message_id_value()?;
        if got != expected {
            return Err(ClientError::OutOfOrder { expected, got });
        }

        let my_thumbprint = invitation.payload.epk.thumbprint()?;
        // Re-ingesting the same first reply must not restart the thread.
        if !store.has(&ns::thread_info(&my_thumbprint))? {
            self.start_thread(
                store,
                &signed_invite,
                their_epk,
                sender,
                &decoded.payload.message_id,
                Some(my_thumbprint.clone()),
            )?;
        }
        self.append_known(store, signed, &my_thumbprint)
    }

    fn append_known<S: Storage>(
        &self,
        store: &mut S,
        signed: &str,
        thread_thumbprint: &str,
    ) -> Result<ReceivedMessage, ClientError> {
        let info = self.require_thread_info(store, thread_thumbprint)?;
        let decoded = jws::decode::<ReplyPayload>(signed)?;

        // Pick the verifier: an embedded key wins, otherwise the
        // addressee decides which long-term key signed this.
        if let Some(embedded) = &decoded.header.jwk {
            let embedded_tp = embedded.thumbprint()?;
            if embedded_tp != info.their_signature.thumbprint()?
                && embedded_tp != self.thumbprint()
            {
                tracing::warn!(
                    thread = %thread_thumbprint,
                    signer = %embedded_tp,
                    "Embedded key matches no known identity on this thread"
                );
            }
            decoded.verify_embedded()?;
        } else if decoded.payload.re == info.my_thumbprint {
            decoded.verify_with(&info.their_signature)?;
        } else if decoded.payload.re == info.their_epk.thumbprint()? {
            // Our own outgoing message, echoed back to us.
            decoded.verify_with(self.identity_public())?;
        } else {
            return Err(ClientError::UnverifiedSigner);
        }

        let secret = self.thread_secret(store, &info)?;
        let plaintext = aead::decrypt(
            secret.secret.as_bytes(),
            &decoded.payload.iv_bytes()?,
            &decoded.payload.ciphertext()?,
        )?;
        let message = String::from_utf8(plaintext.to_vec())
            .map_err(|_| ClientError::MalformedEnvelope("Message plaintext is not UTF-8".into()))?;

        // Advance the counter monotonically so our next reply continues
        // the sequence; re-ingesting an old message changes nothing.
        let got = decoded.payload.message_id_value()?;
        let id_key = ns::message_id(thread_thumbprint);
        let current = match store.get_json::<String>(&id_key)? {
            Some(hex) => parse_message_id(&hex)?,
            None => 0,
        };
        if got > current {
            store.set_json(&id_key, &format_message_id(got))?;
        }

        store.append_json(&ns::messages(thread_thumbprint), &signed)?;
        tracing::debug!(thread = %thread_thumbprint, message_id = got, "Appended incoming message");
        Ok(ReceivedMessage {
            thread_thumbprint: thread_thumbprint.to_string(),
            message,
        })
    }

    // ── Thread key material ──────────────────────────────────────────────────

    /// Recover the AES key for a thread from the self-encrypted backup.
    /// The thread's private key materializes only inside this call.
    pub fn read_thread_secret<S: Storage>(
        &self,
        store: &S,
        thread_thumbprint: &str,
    ) -> Result<ThreadSecret, ClientError> {
        let info = self.require_thread_info(store, thread_thumbprint)?;
        self.thread_secret(store, &info)
    }

    fn thread_secret<S: Storage>(
        &self,
        store: &S,
        info: &ThreadInfo,
    ) -> Result<ThreadSecret, ClientError> {
        let their_public = info.their_epk.to_public_key()?;

        let key_key = ns::encrypted_thread_key(&info.my_thumbprint);
        let encrypted: String = store
            .get_json(&key_key)?
            .ok_or_else(|| ClientError::NotFound(key_key))?;
        let serialized = Zeroizing::new(self.decrypt_from_self(&encrypted)?);
        let keys: ThreadKeyPair = serde_json::from_str(&serialized)?;

        if keys.public_key.thumbprint()? != info.my_thumbprint {
            return Err(ClientError::MalformedEnvelope(
                "Stored thread key does not match its thread id".into(),
            ));
        }

        let secret_key = keys.private_key.to_secret_key()?;
        let shared = derive_shared(&secret_key, &their_public)?;
        Ok(ThreadSecret {
            secret: shared,
            epk: keys.public_key.clone(),
        })
    }

    /// Mint a thread keypair and store it self-encrypted under its
    /// public thumbprint.
    fn make_thread_keys<S: Storage>(
        &self,
        store: &mut S,
    ) -> Result<(String, EcJwk), ClientError> {
        let pair = sk_crypto::AgreementKeyPair::generate();
        let public_jwk = pair.public_jwk()?;
        let thumbprint = public_jwk.thumbprint()?;

        let keys = ThreadKeyPair {
            public_key: public_jwk.clone(),
            private_key: pair.private_jwk()?,
        };
        let serialized = Zeroizing::new(serde_json::to_string(&keys)?);
        let encrypted = self.encrypt_to_self(&serialized)?;

        store.set_json(&ns::encrypted_thread_key(&thumbprint), &encrypted)?;
        Ok((thumbprint, public_jwk))
    }

    fn start_thread<S: Storage>(
        &self,
        store: &mut S,
        signed_invite: &str,
        their_epk: EcJwk,
        their_signature: EcJwk,
        message_id: &str,
        my_thumbprint: Option<String>,
    ) -> Result<String, ClientError> {
        // The counterparty key must be a valid P-384 point before any
        // write happens; a garbage `epk` must not leave a half-started
        // thread behind.
        their_epk.to_public_key()?;

        let my_thumbprint = match my_thumbprint {
            // Inviter side: thread keys already exist from the invitation.
            Some(thumbprint) => thumbprint,
            // Replier side: mint ours now.
            None => self.make_thread_keys(store)?.0,
        };

        let their_signature = their_signature.to_public();
        store.set_json(
            &ns::public_key(&their_signature.thumbprint()?),
            &their_signature,
        )?;

        let info = ThreadInfo {
            my_thumbprint: my_thumbprint.clone(),
            their_epk: their_epk.to_public(),
            their_signature,
            signed_invite: signed_invite.to_string(),
            created_at: Utc::now(),
        };
        store.append_json(&ns::threads(self.thumbprint()), &my_thumbprint)?;
        store.append_json(&ns::messages(&my_thumbprint), &signed_invite)?;
        store.set_json(&ns::message_id(&my_thumbprint), &message_id)?;
        // `thread-info` goes last: its presence is what marks the thread
        // Active, so interrupted starts stay recoverable by re-ingesting.
        store.set_json(&ns::thread_info(&my_thumbprint), &info)?;

        tracing::info!(thread = %my_thumbprint, "Thread started");
        Ok(my_thumbprint)
    }

    fn self_test_reply(
        &self,
        signed: &str,
        secret: &ThreadSecret,
        msg: &str,
    ) -> Result<(), ClientError> {
        let check = || -> Result<bool, ClientError> {
            let decoded = jws::decode::<ReplyPayload>(signed)?;
            decoded.verify_with(self.identity_public())?;
            let plaintext = aead::decrypt(
                secret.secret.as_bytes(),
                &decoded.payload.iv_bytes()?,
                &decoded.payload.ciphertext()?,
            )?;
            Ok(plaintext.as_slice() == msg.as_bytes())
        };
        match check() {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => Err(ClientError::SelfEncryptMismatch),
        }
    }

    // ── Introspection ────────────────────────────────────────────────────────

    pub fn thread_state<S: Storage>(
        &self,
        store: &S,
        thread_thumbprint: &str,
    ) -> Result<ThreadState, ClientError> {
        if store.has(&ns::thread_info(thread_thumbprint))? {
            Ok(ThreadState::Active)
        } else if store.has(&ns::invitation(thread_thumbprint))? {
            Ok(ThreadState::Invited)
        } else {
            Err(ClientError::UnknownThread(thread_thumbprint.to_string()))
        }
    }

    /// All thread thumbprints this client participates in.
    pub fn threads<S: Storage>(&self, store: &S) -> Result<Vec<String>, ClientError> {
        Ok(store.get_list(&ns::threads(self.thumbprint()))?)
    }

    /// The raw JWS log of a thread, oldest first (the invitation leads).
    pub fn messages<S: Storage>(
        &self,
        store: &S,
        thread_thumbprint: &str,
    ) -> Result<Vec<String>, ClientError> {
        Ok(store.get_list(&ns::messages(thread_thumbprint))?)
    }

    fn require_thread_info<S: Storage>(
        &self,
        store: &S,
        thread_thumbprint: &str,
    ) -> Result<ThreadInfo, ClientError> {
        store
            .get_json(&ns::thread_info(thread_thumbprint))?
            .ok_or_else(|| ClientError::NotFound(ns::thread_info(thread_thumbprint)))
    }
}
