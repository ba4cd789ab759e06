use thiserror::Error;

use xsg_proto::DecodeError;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Peer public key is not a valid curve point.
    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Integrity tag did not verify; the packet must be discarded.
    #[error("integrity check failed")]
    AuthError,

    #[error("ciphertext is not a whole number of blocks")]
    InvalidCiphertext,

    #[error("invalid key material")]
    InvalidKey,

    #[error("random number generator failed")]
    Rng,

    #[error(transparent)]
    Codec(#[from] DecodeError),
}
