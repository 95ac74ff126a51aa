use sk_crypto::CryptoError;
use sk_proto::ProtoError;
use sk_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Wrong password")]
    BadPassword,

    #[error("Signature verification failed")]
    BadSignature,

    #[error("No rule selects a verifier key for this message")]
    UnverifiedSigner,

    #[error("Ciphertext failed authentication")]
    BadCiphertext,

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("First reply must be self-signed and carry an ephemeral key")]
    MalformedFirstReply,

    #[error("No invitation matches {0}")]
    UnknownInvitation(String),

    #[error("No thread matches {0}")]
    UnknownThread(String),

    #[error("Out-of-order reply: expected message id {expected:x}, got {got:x}")]
    OutOfOrder { expected: u64, got: u64 },

    #[error("Message id counter reached its ceiling")]
    MessageIdOverflow,

    #[error("Self-encryption self-test failed")]
    SelfEncryptMismatch,

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Crypto error: {0}")]
    Crypto(CryptoError),

    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl From<CryptoError> for ClientError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::BadPassword => ClientError::BadPassword,
            CryptoError::SignatureVerification => ClientError::BadSignature,
            CryptoError::AeadDecrypt => ClientError::BadCiphertext,
            other => ClientError::Crypto(other),
        }
    }
}

impl From<ProtoError> for ClientError {
    fn from(err: ProtoError) -> Self {
        match err {
            ProtoError::Malformed(msg) => ClientError::MalformedEnvelope(msg),
            ProtoError::Signature => ClientError::BadSignature,
            ProtoError::NoVerificationKey => ClientError::UnverifiedSigner,
            ProtoError::Crypto(inner) => ClientError::from(inner),
        }
    }
}

impl From<StoreError> for ClientError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => ClientError::NotFound(key),
            other => ClientError::Store(other),
        }
    }
}
