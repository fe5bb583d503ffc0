use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use secrecy::{ExposeSecret, SecretBox};
use sha2::Sha256;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::envelope::NONCE_LEN;
use crate::error::CodecError;

/// Length of the derived key in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// PBKDF2-HMAC-SHA256 rounds. Fixed so that old envelopes keep opening.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Symmetric key material bound to one `(password, salt)` pair.
///
/// A `DerivedKey` backs exactly one seal or open call and is then dropped,
/// which wipes it. It cannot be cloned or serialized, and the key bytes never
/// leave the crate:
///
/// ```compile_fail
/// let key = qrseal::crypt::DerivedKey::derive(b"password", &[0u8; 16]);
/// let _bytes = key.key();
/// ```
///
/// Sealing is crate-private too, since it takes the nonce from the caller:
///
/// ```compile_fail
/// let key = qrseal::crypt::DerivedKey::derive(b"password", &[0u8; 16]);
/// let _sealed = key.seal(&[0u8; 12], b"attack at dawn");
/// ```
pub struct DerivedKey {
    key: SecretBox<[u8; KEY_LEN]>,
}

impl DerivedKey {
    /// Stretches `password` with PBKDF2-HMAC-SHA256 over `salt`.
    ///
    /// Deterministic: the same pair always yields the same key.
    pub fn derive(password: &[u8], salt: &[u8]) -> Self {
        debug!(iterations = PBKDF2_ITERATIONS, "deriving key");

        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, PBKDF2_ITERATIONS, &mut key);

        let derived = Self {
            key: SecretBox::new(Box::new(key)),
        };

        // The array above was copied into the box; wipe the stack copy.
        key.zeroize();

        derived
    }

    #[cfg(test)]
    fn key(&self) -> &SecretBox<[u8; KEY_LEN]> {
        &self.key
    }

    /// AES-256-GCM encryption. The returned buffer ends with the 16-byte tag.
    pub(crate) fn seal(&self, nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Vec<u8> {
        let cipher = self.cipher();
        let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(nonce), plaintext) else {
            unreachable!("AES-GCM encryption cannot fail below the 64 GiB message limit");
        };
        ciphertext
    }

    /// AES-256-GCM decryption and tag verification.
    pub fn open(&self, nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CodecError::AuthenticationFailed)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.expose_secret()))
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

impl Zeroize for DerivedKey {
    fn zeroize(&mut self) {
        self.key.zeroize();
    }
}

impl ZeroizeOnDrop for DerivedKey {}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}
