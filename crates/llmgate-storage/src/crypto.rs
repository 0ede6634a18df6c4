use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

/// A fixed salt for deriving the server's symmetric key from its passphrase.
///
/// Intentional, not an oversight (see DESIGN.md): there is exactly one
/// derived key per deployment, from a single high-entropy operator-chosen
/// passphrase, so a per-record salt buys nothing a unique passphrase doesn't
/// already provide. Do not change this to per-record salts without also
/// changing the key model.
const KEY_DERIVATION_SALT: &[u8] = b"llmgate-upstream-credential-v1";
const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("ciphertext too short to contain a nonce")]
    Truncated,
    #[error("decryption failed (wrong key or tampered ciphertext)")]
    Invalid,
}

/// Encryption of upstream credentials at rest. A trait boundary exists so
/// the store-backed caller can be swapped in tests without touching the
/// algorithm; the core ships exactly one concrete implementation.
pub trait Crypto: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// AES-256-GCM with a key derived from an operator passphrase via PBKDF2.
pub struct AesGcmCrypto {
    cipher: Aes256Gcm,
}

impl AesGcmCrypto {
    pub fn derive(passphrase: &str) -> Self {
        let mut key_bytes = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<sha2::Sha256>(
            passphrase.as_bytes(),
            KEY_DERIVATION_SALT,
            100_000,
            &mut key_bytes,
        );
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }
}

impl Crypto for AesGcmCrypto {
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .expect("AES-GCM encryption over a bounded in-memory buffer cannot fail");
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        out
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(CryptoError::Truncated);
        }
        let (nonce_bytes, body) = ciphertext.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, body)
            .map_err(|_| CryptoError::Invalid)
    }
}
