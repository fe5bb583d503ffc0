//! The three kinds of content a scannable code can carry.
//!
//! Rendering the code and decoding a photographed one happen elsewhere; this
//! module only produces and recognizes the string that goes into it.

use std::borrow::Cow;

use secrecy::SecretString;

use crate::envelope::{Envelope, EnvelopeCodec, estimate_envelope_size};
use crate::error::{CodecError, SecretError};
use crate::secret::normalize;
use crate::uri::{ProvisioningUri, SCHEME, parse_provisioning_uri};
use seal_rand::SecureRandomSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Text,
    Totp,
    Envelope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Totp(ProvisioningUri),
    /// A Base64 envelope produced by [`EnvelopeCodec`].
    Envelope(String),
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text(text.into())
    }

    /// Builds a provisioning link from a free-form secret.
    pub fn totp(
        secret: &str,
        label: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Result<Self, SecretError> {
        let secret = normalize(secret)?;
        Ok(Payload::Totp(ProvisioningUri::new(secret, label, issuer)))
    }

    pub async fn sealed<R: SecureRandomSource>(
        codec: &mut EnvelopeCodec<R>,
        plaintext: &str,
        password: &SecretString,
    ) -> Result<Self, CodecError> {
        let envelope = codec.encrypt(plaintext, password).await?;
        Ok(Payload::Envelope(envelope))
    }

    /// Recognizes the content read back from a code.
    ///
    /// `otpauth:` links must parse; Base64 that holds a complete envelope is
    /// an envelope; anything else is text.
    pub fn classify(content: &str) -> Result<Self, SecretError> {
        let trimmed = content.trim();
        let is_link = trimmed
            .get(..SCHEME.len() + 1)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("otpauth:"));
        if is_link {
            return parse_provisioning_uri(trimmed).map(Payload::Totp);
        }

        let is_envelope = Envelope::decode_base64(trimmed)
            .and_then(|bytes| Envelope::from_bytes(&bytes))
            .is_ok();
        if is_envelope {
            return Ok(Payload::Envelope(trimmed.to_string()));
        }

        Ok(Payload::Text(content.to_string()))
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Text(_) => PayloadKind::Text,
            Payload::Totp(_) => PayloadKind::Totp,
            Payload::Envelope(_) => PayloadKind::Envelope,
        }
    }

    /// The exact string to encode into the code.
    pub fn content(&self) -> Cow<'_, str> {
        match self {
            Payload::Text(text) => Cow::Borrowed(text),
            Payload::Totp(uri) => Cow::Owned(uri.to_uri()),
            Payload::Envelope(envelope) => Cow::Borrowed(envelope),
        }
    }

    /// Content length in bytes.
    pub fn size(&self) -> usize {
        self.content().len()
    }

    /// What [`Payload::size`] will roughly be after sealing `plaintext`.
    pub fn estimate_sealed_size(plaintext: &str) -> usize {
        estimate_envelope_size(plaintext.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seal_rand::SeededRandom;

    #[test]
    fn totp_payload_carries_normalized_secret() {
        let payload = Payload::totp("jbsw y3dp ehpk 3pxp", "Example:alice", "Example").unwrap();
        assert_eq!(payload.kind(), PayloadKind::Totp);
        assert_eq!(
            payload.content(),
            "otpauth://totp/Example:alice?secret=JBSWY3DPEHPK3PXP&issuer=Example"
        );
    }

    #[test]
    fn totp_payload_rejects_empty_secret() {
        assert!(matches!(
            Payload::totp("  ", "alice", ""),
            Err(SecretError::InvalidSecret(_))
        ));
    }

    #[test]
    fn text_payload_is_verbatim() {
        let payload = Payload::text("hello there");
        assert_eq!(payload.content(), "hello there");
        assert_eq!(payload.size(), 11);
    }

    #[tokio::test]
    async fn sealed_payload_is_recognized_as_envelope() {
        let mut codec = EnvelopeCodec::with_source(SeededRandom::new(3));
        let password = SecretString::from("correct horse battery staple");
        let payload = Payload::sealed(&mut codec, "attack at dawn", &password)
            .await
            .unwrap();
        assert_eq!(payload.kind(), PayloadKind::Envelope);
        assert_eq!(Payload::classify(&payload.content()).unwrap(), payload);

        let estimate = Payload::estimate_sealed_size("attack at dawn");
        assert!(estimate.abs_diff(payload.size()) <= 2);
    }

    #[test]
    fn classifies_scanned_content() {
        let link = "otpauth://totp/Example:alice?secret=JBSWY3DPEHPK3PXP&issuer=Example";
        assert_eq!(Payload::classify(link).unwrap().kind(), PayloadKind::Totp);
        assert_eq!(Payload::classify("hello").unwrap(), Payload::text("hello"));
        // Valid Base64 but too short for an envelope.
        assert_eq!(Payload::classify("aGVsbG8=").unwrap().kind(), PayloadKind::Text);
        assert!(matches!(
            Payload::classify("otpauth://hotp/x?secret=A"),
            Err(SecretError::MalformedUri(_))
        ));
    }
}
