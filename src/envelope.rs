//! Password-sealed envelopes.
//!
//! An envelope is `salt(16) || nonce(12) || ciphertext || tag(16)`, carried
//! as standard padded Base64. The key is PBKDF2-HMAC-SHA256 over the
//! password and salt, and the cipher is AES-256-GCM.
//!
//! Salt and nonce are drawn fresh from the codec's [`SecureRandomSource`] on
//! every seal. Nothing is shared between calls, so any number of seals and
//! opens may be in flight at once.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use seal_rand::{SecureRandomSource, SystemRandom};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};
use zeroize::{Zeroize, Zeroizing};

use crate::crypt::DerivedKey;
use crate::error::CodecError;

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
/// Salt, nonce and tag around an empty ciphertext.
pub const MIN_ENVELOPE_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;
/// Minimum password length in characters, for both sealing and opening.
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Envelope {
    salt: [u8; SALT_LEN],
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl Envelope {
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let parts = bytes
            .split_first_chunk::<SALT_LEN>()
            .and_then(|(salt, rest)| {
                rest.split_first_chunk::<NONCE_LEN>()
                    .map(|(nonce, ciphertext)| (salt, nonce, ciphertext))
            });

        match parts {
            Some((salt, nonce, ciphertext)) if ciphertext.len() >= TAG_LEN => Ok(Self {
                salt: *salt,
                nonce: *nonce,
                ciphertext: ciphertext.to_vec(),
            }),
            _ => Err(CodecError::TruncatedEnvelope {
                len: bytes.len(),
                min_len: MIN_ENVELOPE_LEN,
            }),
        }
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub(crate) fn encode(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// Base64 decoding only; surrounding whitespace is ignored.
    pub(crate) fn decode_base64(text: &str) -> Result<Vec<u8>, CodecError> {
        STANDARD
            .decode(text.trim())
            .map_err(|e| CodecError::InvalidEncoding(e.to_string()))
    }
}

/// Checks run before any cryptographic work.
pub fn validate_inputs(plaintext: &str, password: &str) -> Result<(), CodecError> {
    if plaintext.trim().is_empty() {
        return Err(CodecError::EmptyPlaintext);
    }
    check_password(password)
}

fn check_password(password: &str) -> Result<(), CodecError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CodecError::WeakPassword {
            min_len: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// Rough Base64 length of an envelope around `plaintext_len` bytes.
///
/// For display only. Saturates at `usize::MAX` instead of overflowing.
pub fn estimate_envelope_size(plaintext_len: usize) -> usize {
    let total = (MIN_ENVELOPE_LEN as u128 + plaintext_len as u128) * 4;
    usize::try_from(total.div_ceil(3)).unwrap_or(usize::MAX)
}

/// Seals and opens envelopes, drawing salts and nonces from `R`.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeCodec<R = SystemRandom> {
    rng: R,
}

impl EnvelopeCodec<SystemRandom> {
    pub fn new() -> Self {
        Self::with_source(SystemRandom::new())
    }
}

impl<R: SecureRandomSource> EnvelopeCodec<R> {
    pub fn with_source(rng: R) -> Self {
        Self { rng }
    }

    /// Encrypts `plaintext` on the current thread and returns the Base64 envelope.
    #[instrument(skip_all, fields(plaintext_len = plaintext.len()))]
    pub fn seal(&mut self, plaintext: &str, password: &SecretString) -> Result<String, CodecError> {
        let (salt, nonce) = self.draw(plaintext, password)?;
        let envelope = seal_envelope(salt, nonce, plaintext.as_bytes(), password.expose_secret());
        Ok(envelope.encode())
    }

    /// Decrypts a Base64 envelope on the current thread.
    #[instrument(skip_all, fields(envelope_len = envelope.len()))]
    pub fn open(&self, envelope: &str, password: &SecretString) -> Result<String, CodecError> {
        let parsed = parse_for_open(envelope, password.expose_secret())?;
        open_envelope(&parsed, password.expose_secret())
    }

    /// Like [`EnvelopeCodec::seal`], with key derivation and encryption run
    /// on Tokio's blocking pool. Outside a Tokio runtime the work runs inline
    /// when the future is polled.
    pub async fn encrypt(
        &mut self,
        plaintext: &str,
        password: &SecretString,
    ) -> Result<String, CodecError> {
        let (salt, nonce) = self.draw(plaintext, password)?;
        let plaintext = Zeroizing::new(plaintext.as_bytes().to_vec());
        let password = Zeroizing::new(password.expose_secret().to_owned());

        let envelope =
            run_blocking(move || Ok(seal_envelope(salt, nonce, &plaintext, &password))).await?;
        Ok(envelope.encode())
    }

    /// Like [`EnvelopeCodec::open`], with key derivation and decryption run
    /// on Tokio's blocking pool. Outside a Tokio runtime the work runs inline
    /// when the future is polled.
    pub async fn decrypt(
        &self,
        envelope: &str,
        password: &SecretString,
    ) -> Result<String, CodecError> {
        let parsed = parse_for_open(envelope, password.expose_secret())?;
        let password = Zeroizing::new(password.expose_secret().to_owned());

        run_blocking(move || open_envelope(&parsed, &password)).await
    }

    fn draw(
        &mut self,
        plaintext: &str,
        password: &SecretString,
    ) -> Result<([u8; SALT_LEN], [u8; NONCE_LEN]), CodecError> {
        validate_inputs(plaintext, password.expose_secret())?;
        Ok((self.rng.array(), self.rng.array()))
    }
}

/// Encrypts with fresh OS randomness. See [`EnvelopeCodec::encrypt`].
pub async fn encrypt(plaintext: &str, password: &SecretString) -> Result<String, CodecError> {
    EnvelopeCodec::new().encrypt(plaintext, password).await
}

/// See [`EnvelopeCodec::decrypt`].
pub async fn decrypt(envelope: &str, password: &SecretString) -> Result<String, CodecError> {
    EnvelopeCodec::new().decrypt(envelope, password).await
}

fn seal_envelope(
    salt: [u8; SALT_LEN],
    nonce: [u8; NONCE_LEN],
    plaintext: &[u8],
    password: &str,
) -> Envelope {
    let key = DerivedKey::derive(password.as_bytes(), &salt);
    let ciphertext = key.seal(&nonce, plaintext);
    drop(key);

    debug!(ciphertext_len = ciphertext.len(), "sealed envelope");
    Envelope {
        salt,
        nonce,
        ciphertext,
    }
}

// Encoding, then password, then length. No key is derived on failure.
fn parse_for_open(text: &str, password: &str) -> Result<Envelope, CodecError> {
    let bytes = Envelope::decode_base64(text)?;
    check_password(password)?;
    Envelope::from_bytes(&bytes)
}

fn open_envelope(envelope: &Envelope, password: &str) -> Result<String, CodecError> {
    let key = DerivedKey::derive(password.as_bytes(), &envelope.salt);
    let plaintext = key.open(&envelope.nonce, &envelope.ciphertext)?;
    drop(key);

    debug!(plaintext_len = plaintext.len(), "opened envelope");
    String::from_utf8(plaintext).map_err(|e| {
        e.into_bytes().zeroize();
        CodecError::InvalidPlaintextEncoding
    })
}

async fn run_blocking<T, F>(work: F) -> Result<T, CodecError>
where
    F: FnOnce() -> Result<T, CodecError> + Send + 'static,
    T: Send + 'static,
{
    // Any executor may poll these futures; only Tokio has a blocking pool.
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return work();
    };
    match handle.spawn_blocking(work).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(_) => Err(CodecError::Cancelled),
    }
}
