use sk_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Envelope signature verification failed")]
    Signature,

    #[error("No verification key: header embeds no jwk and none was supplied")]
    NoVerificationKey,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}
