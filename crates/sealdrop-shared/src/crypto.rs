//! Transfer cipher.
//!
//! Files are sealed with the NaCl `crypto_box` construction (X25519 +
//! XSalsa20-Poly1305) directly under the recipient's long-term exchange key
//! and a one-time sender key. There is no symmetric envelope: the sender's
//! ephemeral public key travels alongside the ciphertext instead.
//!
//! Wire layout: `nonce (24) || sealed (plaintext + 16 byte tag)`.

use crypto_box::aead::generic_array::GenericArray;
use crypto_box::aead::Aead;
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use rand::RngCore;

use crate::constants::{NONCE_SIZE, PUBKEY_SIZE};
use crate::error::CryptoError;
use crate::identity::ExchangeKeyPair;

/// Fill a fixed-size buffer from the OS RNG.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut buf = [0u8; N];
    rand::rngs::OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|_| CryptoError::Entropy)?;
    Ok(buf)
}

pub fn generate_nonce() -> Result<[u8; NONCE_SIZE], CryptoError> {
    random_bytes()
}

// Returns nonce || ciphertext (24 bytes nonce prepended)
pub fn encrypt(
    plaintext: &[u8],
    recipient_pub: &[u8; PUBKEY_SIZE],
    sender_secret: &[u8; 32],
) -> Result<Vec<u8>, CryptoError> {
    let sealer = SalsaBox::new(
        &PublicKey::from(*recipient_pub),
        &SecretKey::from(*sender_secret),
    );
    let nonce_bytes = generate_nonce()?;
    let nonce = GenericArray::from_slice(&nonce_bytes);

    let ciphertext = sealer
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn decrypt(
    data: &[u8],
    sender_pub: &[u8; PUBKEY_SIZE],
    recipient_secret: &[u8; 32],
) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::MessageTooShort {
            len: data.len(),
            min: NONCE_SIZE,
        });
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let opener = SalsaBox::new(
        &PublicKey::from(*sender_pub),
        &SecretKey::from(*recipient_secret),
    );
    let nonce = GenericArray::from_slice(nonce_bytes);

    opener
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// A file sealed for one recipient with a one-time sender key.
#[derive(Debug, Clone)]
pub struct SealedPayload {
    /// Public half of the ephemeral exchange pair. The secret half is gone.
    pub ephemeral_public: [u8; PUBKEY_SIZE],
    pub ciphertext: Vec<u8>,
}

/// Seal `plaintext` for `recipient_pub` using a freshly generated exchange
/// pair whose secret half is dropped before returning.
pub fn seal_for_recipient(
    plaintext: &[u8],
    recipient_pub: &[u8; PUBKEY_SIZE],
) -> Result<SealedPayload, CryptoError> {
    let ephemeral = ExchangeKeyPair::generate().map_err(|_| CryptoError::Entropy)?;
    let ciphertext = encrypt(plaintext, recipient_pub, &ephemeral.secret_bytes())?;

    Ok(SealedPayload {
        ephemeral_public: ephemeral.public_key_bytes(),
        ciphertext,
    })
}

/// Open a payload produced by [`seal_for_recipient`].
pub fn open_from_sender(
    ciphertext: &[u8],
    ephemeral_public: &[u8; PUBKEY_SIZE],
    recipient: &ExchangeKeyPair,
) -> Result<Vec<u8>, CryptoError> {
    decrypt(ciphertext, ephemeral_public, &recipient.secret_bytes())
}

/// Borrow a slice as a 32-byte public key.
pub fn public_key_from_slice(bytes: &[u8]) -> Result<[u8; PUBKEY_SIZE], CryptoError> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength {
            expected: PUBKEY_SIZE,
            actual: bytes.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TAG_SIZE;

    fn pair() -> ExchangeKeyPair {
        ExchangeKeyPair::generate().unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let sender = pair();
        let recipient = pair();
        let plaintext = b"the relay never sees this";

        let encrypted = encrypt(
            plaintext,
            &recipient.public_key_bytes(),
            &sender.secret_bytes(),
        )
        .unwrap();
        let decrypted = decrypt(
            &encrypted,
            &sender.public_key_bytes(),
            &recipient.secret_bytes(),
        )
        .unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let sender = pair();
        let recipient = pair();

        let encrypted =
            encrypt(b"", &recipient.public_key_bytes(), &sender.secret_bytes()).unwrap();
        assert_eq!(encrypted.len(), NONCE_SIZE + TAG_SIZE);

        let decrypted = decrypt(
            &encrypted,
            &sender.public_key_bytes(),
            &recipient.secret_bytes(),
        )
        .unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_wrong_recipient_key_fails() {
        let sender = pair();
        let recipient = pair();
        let eavesdropper = pair();

        let encrypted = encrypt(
            b"Secret message",
            &recipient.public_key_bytes(),
            &sender.secret_bytes(),
        )
        .unwrap();

        let result = decrypt(
            &encrypted,
            &sender.public_key_bytes(),
            &eavesdropper.secret_bytes(),
        );
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_wrong_sender_key_fails() {
        let sender = pair();
        let impostor = pair();
        let recipient = pair();

        let encrypted = encrypt(
            b"Secret message",
            &recipient.public_key_bytes(),
            &sender.secret_bytes(),
        )
        .unwrap();

        assert!(decrypt(
            &encrypted,
            &impostor.public_key_bytes(),
            &recipient.secret_bytes()
        )
        .is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let sender = pair();
        let recipient = pair();

        let mut encrypted = encrypt(
            b"Important data",
            &recipient.public_key_bytes(),
            &sender.secret_bytes(),
        )
        .unwrap();
        let len = encrypted.len();
        encrypted[len - 1] ^= 0xFF;

        assert!(decrypt(
            &encrypted,
            &sender.public_key_bytes(),
            &recipient.secret_bytes()
        )
        .is_err());
    }

    #[test]
    fn test_short_input_fails() {
        let sender = pair();
        let recipient = pair();

        for len in [0, 1, NONCE_SIZE - 1] {
            let result = decrypt(
                &vec![0u8; len],
                &sender.public_key_bytes(),
                &recipient.secret_bytes(),
            );
            assert!(matches!(result, Err(CryptoError::MessageTooShort { .. })));
        }

        // A bare nonce has no tag to authenticate.
        let result = decrypt(
            &[0u8; NONCE_SIZE],
            &sender.public_key_bytes(),
            &recipient.secret_bytes(),
        );
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let sender = pair();
        let recipient = pair();

        let a = encrypt(b"same", &recipient.public_key_bytes(), &sender.secret_bytes()).unwrap();
        let b = encrypt(b"same", &recipient.public_key_bytes(), &sender.secret_bytes()).unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_sealed_payload_opens_with_recipient_key() {
        let recipient = pair();
        let plaintext = vec![7u8; 4096];

        let sealed = seal_for_recipient(&plaintext, &recipient.public_key_bytes()).unwrap();
        assert_eq!(sealed.ciphertext.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);

        let opened =
            open_from_sender(&sealed.ciphertext, &sealed.ephemeral_public, &recipient).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_each_seal_uses_new_ephemeral_key() {
        let recipient = pair();
        let a = seal_for_recipient(b"x", &recipient.public_key_bytes()).unwrap();
        let b = seal_for_recipient(b"x", &recipient.public_key_bytes()).unwrap();
        assert_ne!(a.ephemeral_public, b.ephemeral_public);
    }

    #[test]
    fn test_public_key_from_slice() {
        assert!(public_key_from_slice(&[0u8; 32]).is_ok());
        assert!(matches!(
            public_key_from_slice(&[0u8; 33]),
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 33
            })
        ));
    }
}
