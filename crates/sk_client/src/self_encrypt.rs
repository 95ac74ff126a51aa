//! Self-encryption: encrypting data for the client itself.
//!
//! A fresh ephemeral ECDH key is paired with the client's long-term
//! storage key, so each record has its own AES key and nothing but the
//! unwrapped storage private key can open it. The result is a signed
//! SelfEncrypted JWS whose header embeds the identity public key and
//! whose payload carries `{message, iv, epk}`.
//!
//! Every `encrypt_to_self` immediately verifies and decrypts its own
//! output. A mismatch means a wiring bug, and the call fails
//! `SelfEncryptMismatch` without anything leaving the function.
//!
//! Used to back up per-thread private keys under
//! `encrypted-thread-key:<thumbprint>`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use sk_crypto::{aead, keys::derive_shared, AgreementKeyPair};
use sk_proto::{jws, SelfEncryptedPayload};

use crate::client::Client;
use crate::error::ClientError;

impl Client {
    /// Encrypt `msg` to this client's own storage key.
    pub fn encrypt_to_self(&self, msg: &str) -> Result<String, ClientError> {
        let epk = AgreementKeyPair::generate();
        let secret = derive_shared(epk.secret_key(), self.agreement().public_key())?;

        let iv = aead::random_iv();
        let ciphertext = aead::encrypt(secret.as_bytes(), &iv, msg.as_bytes())?;

        let payload = SelfEncryptedPayload {
            message: URL_SAFE_NO_PAD.encode(&ciphertext),
            iv: URL_SAFE_NO_PAD.encode(iv),
            epk: epk.public_jwk()?,
        };
        let header = jws::Header::with_key(self.identity_public());
        let signed = jws::sign(&header, &payload, self.signing())?;

        // Construction-time self-test: any discrepancy is fatal.
        match self.decrypt_from_self(&signed) {
            Ok(plaintext) if plaintext == msg => Ok(signed),
            _ => Err(ClientError::SelfEncryptMismatch),
        }
    }

    /// Verify and decrypt a SelfEncrypted JWS produced by this client.
    pub fn decrypt_from_self(&self, signed: &str) -> Result<String, ClientError> {
        let decoded = jws::decode::<SelfEncryptedPayload>(signed)?;
        decoded.verify_with(self.identity_public())?;

        let epk = decoded.payload.epk.to_public_key()?;
        let secret = derive_shared(self.agreement().secret_key(), &epk)?;

        let plaintext = aead::decrypt(
            secret.as_bytes(),
            &decoded.payload.iv_bytes()?,
            &decoded.payload.ciphertext()?,
        )?;
        String::from_utf8(plaintext.to_vec()).map_err(|_| {
            ClientError::MalformedEnvelope("Self-encrypted plaintext is not UTF-8".into())
        })
    }
}
