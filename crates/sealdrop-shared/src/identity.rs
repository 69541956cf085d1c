//! The two key pairs every sealdrop identity holds.
//!
//! - [`IdentityKeyPair`] (Ed25519) signs login challenges and proves control
//!   of a username.
//! - [`ExchangeKeyPair`] (X25519) is the long-term key that files addressed to
//!   the user are sealed under.
//!
//! Only the public halves are ever registered with a server.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use x25519_dalek::{PublicKey as ExchangePublicKey, StaticSecret};

use crate::constants::{EXCHANGE_SECRET_SIZE, PUBKEY_SIZE, SIGNATURE_SIZE, SIGNING_KEYPAIR_SIZE};
use crate::crypto::random_bytes;
use crate::error::IdentityError;
use crate::protocol::RegisterRequest;

/// Ed25519 signing pair.
#[derive(Clone)]
pub struct IdentityKeyPair {
    signing_key: SigningKey,
}

impl IdentityKeyPair {
    /// Generate a new signing pair from OS randomness.
    ///
    /// Entropy failure is reported, not retried.
    pub fn generate() -> Result<Self, IdentityError> {
        let seed: [u8; 32] = random_bytes().map_err(|_| IdentityError::GenerationFailed)?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Restore from the 64-byte keypair form (seed || public key).
    ///
    /// Fails if the embedded public half does not match the seed.
    pub fn from_keypair_bytes(bytes: &[u8; SIGNING_KEYPAIR_SIZE]) -> Result<Self, IdentityError> {
        let signing_key =
            SigningKey::from_keypair_bytes(bytes).map_err(|_| IdentityError::InvalidKeyBytes)?;
        Ok(Self { signing_key })
    }

    /// 64-byte private key including the embedded public half.
    pub fn to_keypair_bytes(&self) -> [u8; SIGNING_KEYPAIR_SIZE] {
        self.signing_key.to_keypair_bytes()
    }

    pub fn public_key_bytes(&self) -> [u8; PUBKEY_SIZE] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public", &fingerprint(&self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

/// X25519 key-exchange pair.
#[derive(Clone)]
pub struct ExchangeKeyPair {
    secret: StaticSecret,
    public: ExchangePublicKey,
}

impl ExchangeKeyPair {
    pub fn generate() -> Result<Self, IdentityError> {
        let secret: [u8; EXCHANGE_SECRET_SIZE] =
            random_bytes().map_err(|_| IdentityError::GenerationFailed)?;
        Ok(Self::from_secret_bytes(secret))
    }

    pub fn from_secret_bytes(secret: [u8; EXCHANGE_SECRET_SIZE]) -> Self {
        let secret = StaticSecret::from(secret);
        let public = ExchangePublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn from_secret_slice(bytes: &[u8]) -> Result<Self, IdentityError> {
        let secret: [u8; EXCHANGE_SECRET_SIZE] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidKeyBytes)?;
        Ok(Self::from_secret_bytes(secret))
    }

    pub fn secret_bytes(&self) -> [u8; EXCHANGE_SECRET_SIZE] {
        self.secret.to_bytes()
    }

    pub fn public_key_bytes(&self) -> [u8; PUBKEY_SIZE] {
        self.public.to_bytes()
    }
}

impl std::fmt::Debug for ExchangeKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeKeyPair")
            .field("public", &fingerprint(&self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

/// Everything a client holds for one username.
#[derive(Debug, Clone)]
pub struct KeyBundle {
    pub identity: IdentityKeyPair,
    pub exchange: ExchangeKeyPair,
}

impl KeyBundle {
    pub fn generate() -> Result<Self, IdentityError> {
        Ok(Self {
            identity: IdentityKeyPair::generate()?,
            exchange: ExchangeKeyPair::generate()?,
        })
    }

    /// Registration payload carrying only the public halves.
    pub fn registration(&self, username: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            identity_public_key: self.identity.public_key_bytes().to_vec(),
            exchange_public_key: self.exchange.public_key_bytes().to_vec(),
        }
    }
}

/// Verify an Ed25519 signature given raw key and signature bytes.
pub fn verify_signature(
    pubkey_bytes: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), IdentityError> {
    let pubkey: &[u8; PUBKEY_SIZE] = pubkey_bytes
        .try_into()
        .map_err(|_| IdentityError::InvalidKeyBytes)?;
    let verifying_key =
        VerifyingKey::from_bytes(pubkey).map_err(|_| IdentityError::InvalidKeyBytes)?;
    let signature =
        Signature::from_slice(signature).map_err(|_| IdentityError::InvalidSignatureBytes)?;
    verifying_key
        .verify(message, &signature)
        .map_err(|_| IdentityError::VerificationFailed)
}

/// Short hex prefix of a public key, for log lines.
pub fn fingerprint(pubkey: &[u8; PUBKEY_SIZE]) -> String {
    hex::encode(&pubkey[..4])
}
