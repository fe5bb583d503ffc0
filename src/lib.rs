//! Payloads for scannable codes: plain text, TOTP provisioning links, and
//! password-sealed envelopes.
//!
//! The two building blocks are independent:
//!
//! - [`secret`] detects how a TOTP secret was typed and rewrites it into the
//!   canonical alphabet that authenticator apps expect.
//! - [`envelope`] seals text under a password (PBKDF2-HMAC-SHA256 +
//!   AES-256-GCM) into a single Base64 string, and opens it again.
//!
//! [`payload`] ties them together for whatever renders the code.

pub mod crypt;
pub mod envelope;
pub mod error;
pub mod payload;
pub mod secret;
pub mod uri;

pub use envelope::{
    EnvelopeCodec, MIN_PASSWORD_LEN, decrypt, encrypt, estimate_envelope_size, validate_inputs,
};
pub use error::{CodecError, SecretError};
pub use payload::{Payload, PayloadKind};
pub use seal_rand::{SecureRandomSource, SystemRandom};
pub use secret::{NormalizedSecret, SecretFormat, clean, detect_format, normalize, normalize_uri};
pub use uri::{ProvisioningUri, parse_provisioning_uri};
