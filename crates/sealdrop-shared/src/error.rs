use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Message too short: {len} bytes (need at least {min})")]
    MessageTooShort { len: usize, min: usize },

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Random number generator unavailable")]
    Entropy,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid key bytes")]
    InvalidKeyBytes,

    #[error("Invalid signature encoding")]
    InvalidSignatureBytes,

    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Failed to generate keypair")]
    GenerationFailed,
}
