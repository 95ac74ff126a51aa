//! Identity lifecycle: generate, load, backup, restore.
//!
//! An identity is two P-384 keypairs: the ECDSA signing key (whose public
//! JWK thumbprint is the client's stable id) and the ECDH "storage" key
//! that self-encryption targets. Both private halves are stored wrapped
//! under the user's password; unwrapped key material exists only inside a
//! live [`Client`] and is zeroized when it drops (the underlying scalar
//! types zeroize themselves).
//!
//! An identity is created once per password and never mutated.

use chrono::Utc;
use zeroize::Zeroize;

use sk_crypto::{wrap, AgreementKeyPair, CryptoError, EcJwk, SigningKeyPair};
use sk_proto::{jws, BackupPayload};
use sk_store::keys as ns;
use sk_store::{IdentityRecord, Storage, WrappedKey};

use crate::error::ClientError;

/// A loaded client: unwrapped identity + storage keys.
pub struct Client {
    thumbprint: String,
    identity_public: EcJwk,
    storage_public: EcJwk,
    signing: SigningKeyPair,
    agreement: AgreementKeyPair,
}

impl Client {
    /// Create a brand-new identity and persist it under `password`.
    pub fn generate<S: Storage>(store: &mut S, password: &str) -> Result<Self, ClientError> {
        let signing = SigningKeyPair::generate();
        let agreement = AgreementKeyPair::generate();

        let identity_public = signing.public_jwk()?;
        let storage_public = agreement.public_jwk()?;
        let thumbprint = identity_public.thumbprint()?;

        let mut id_private = signing.private_jwk()?;
        let mut storage_private = agreement.private_jwk()?;
        let record = IdentityRecord {
            id: WrappedKey {
                jwk: identity_public.clone(),
                wrapped: wrap::wrap_private(&id_private, password)?,
            },
            storage: WrappedKey {
                jwk: storage_public.clone(),
                wrapped: wrap::wrap_private(&storage_private, password)?,
            },
            created_at: Utc::now(),
        };
        id_private.zeroize();
        storage_private.zeroize();

        store.set_json(&ns::identity(&thumbprint), &record)?;
        tracing::info!(thumbprint = %thumbprint, "Generated new identity");

        Ok(Self {
            thumbprint,
            identity_public,
            storage_public,
            signing,
            agreement,
        })
    }

    /// Load an existing identity. Fails `NotFound` when no record exists
    /// for `thumbprint` and `BadPassword` when the wrapped keys do not
    /// authenticate; neither path mutates storage.
    pub fn load<S: Storage>(
        store: &S,
        thumbprint: &str,
        password: &str,
    ) -> Result<Self, ClientError> {
        let record: IdentityRecord = store
            .get_json(&ns::identity(thumbprint))?
            .ok_or_else(|| ClientError::NotFound(ns::identity(thumbprint)))?;

        let mut id_private = wrap::unwrap_private(&record.id.wrapped, password)?;
        let mut storage_private = wrap::unwrap_private(&record.storage.wrapped, password)?;
        let signing = SigningKeyPair::from_jwk(&id_private);
        let agreement = AgreementKeyPair::from_jwk(&storage_private);
        id_private.zeroize();
        storage_private.zeroize();
        let (signing, agreement) = (signing?, agreement?);

        let identity_public = record.id.jwk.to_public();
        if identity_public.thumbprint()? != thumbprint {
            return Err(CryptoError::InvalidKey(
                "Identity record does not match its thumbprint".into(),
            )
            .into());
        }

        Ok(Self {
            thumbprint: thumbprint.to_string(),
            identity_public,
            storage_public: record.storage.jwk.to_public(),
            signing,
            agreement,
        })
    }

    /// Emit a signed, password-wrapped copy of the identity record,
    /// suitable for offline storage.
    pub fn make_backup<S: Storage>(
        &self,
        store: &S,
        password: &str,
    ) -> Result<String, ClientError> {
        let record: IdentityRecord = store
            .get_json(&ns::identity(&self.thumbprint))?
            .ok_or_else(|| ClientError::NotFound(ns::identity(&self.thumbprint)))?;

        let serialized = serde_json::to_vec(&record)?;
        let payload = BackupPayload {
            thumbprint: self.thumbprint.clone(),
            record: wrap::wrap_bytes(&serialized, password)?,
        };
        let header = jws::Header::with_key(&self.identity_public);
        Ok(jws::sign(&header, &payload, &self.signing)?)
    }

    /// Install an identity from a backup produced by [`Self::make_backup`].
    ///
    /// `backup_password` protects the backup itself; the identity record
    /// inside keeps its original wrapping, so the identity password is
    /// still required to [`Self::load`] afterwards. Returns the installed
    /// thumbprint.
    pub fn restore_backup<S: Storage>(
        store: &mut S,
        backup: &str,
        backup_password: &str,
    ) -> Result<String, ClientError> {
        let decoded = jws::decode::<BackupPayload>(backup)?;
        decoded.verify_embedded()?;

        let serialized = wrap::unwrap_bytes(&decoded.payload.record, backup_password)?;
        let record: IdentityRecord = serde_json::from_slice(&serialized)
            .map_err(|_| ClientError::MalformedEnvelope("Backup record is not valid".into()))?;

        let thumbprint = record.id.jwk.thumbprint()?;
        if thumbprint != decoded.payload.thumbprint {
            return Err(ClientError::MalformedEnvelope(
                "Backup thumbprint does not match its identity record".into(),
            ));
        }

        store.set_json(&ns::identity(&thumbprint), &record)?;
        tracing::info!(thumbprint = %thumbprint, "Restored identity from backup");
        Ok(thumbprint)
    }

    /// The client's stable id: RFC 7638 thumbprint of the identity
    /// public JWK.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    pub fn identity_public(&self) -> &EcJwk {
        &self.identity_public
    }

    pub fn storage_public(&self) -> &EcJwk {
        &self.storage_public
    }

    pub(crate) fn signing(&self) -> &SigningKeyPair {
        &self.signing
    }

    pub(crate) fn agreement(&self) -> &AgreementKeyPair {
        &self.agreement
    }
}
