//! Typed records stored under the namespaces of `keys`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sk_crypto::EcJwk;

/// One half of an identity: public JWK plus the password-wrapped private
/// JWK (an opaque blob from `sk_crypto::wrap`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedKey {
    pub jwk: EcJwk,
    #[serde(rename = "private")]
    pub wrapped: String,
}

/// Stored under `identity:<thumbprint>`. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// ECDSA signing identity.
    pub id: WrappedKey,
    /// ECDH storage key (self-encryption target).
    pub storage: WrappedKey,
    pub created_at: DateTime<Utc>,
}

/// Stored under `thread-info:<my thumbprint>` once a thread is active.
///
/// The thread's own private key is NOT here; it lives self-encrypted
/// under `encrypted-thread-key:<my thumbprint>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadInfo {
    /// Thumbprint of this side's ephemeral public key; the local thread id.
    #[serde(rename = "myThumbprint")]
    pub my_thumbprint: String,
    /// Counterparty's ephemeral ECDH public JWK.
    #[serde(rename = "theirEPK")]
    pub their_epk: EcJwk,
    /// Counterparty's long-term identity public JWK.
    #[serde(rename = "theirSignature")]
    pub their_signature: EcJwk,
    /// The original signed invitation, kept for audit.
    #[serde(rename = "signedInvite")]
    pub signed_invite: String,
    pub created_at: DateTime<Utc>,
}
