//! Error kinds shared by the normalizer and the envelope codec.

use thiserror::Error;

/// Failures while reading or normalizing TOTP secret material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    #[error("invalid secret: {0}")]
    InvalidSecret(String),
    #[error("malformed provisioning URI: {0}")]
    MalformedUri(String),
}

/// Failures while sealing or opening an envelope.
///
/// Every variant except [`CodecError::AuthenticationFailed`] and
/// [`CodecError::InvalidPlaintextEncoding`] is detected before any key
/// derivation happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("plaintext is empty")]
    EmptyPlaintext,
    #[error("password must be at least {min_len} characters")]
    WeakPassword { min_len: usize },
    #[error("envelope is not valid base64: {0}")]
    InvalidEncoding(String),
    #[error("envelope is {len} bytes, expected at least {min_len}")]
    TruncatedEnvelope { len: usize, min_len: usize },
    // One message for both a wrong password and a tampered envelope.
    #[error("unable to open envelope: authentication failed")]
    AuthenticationFailed,
    #[error("decrypted data is not valid UTF-8 text")]
    InvalidPlaintextEncoding,
    #[error("crypto worker was cancelled before completing")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failure_message_is_uninformative() {
        let msg = CodecError::AuthenticationFailed.to_string();
        assert!(!msg.contains("password"));
        assert!(!msg.contains("corrupt"));
        assert!(!msg.contains("tamper"));
    }

    #[test]
    fn messages_name_their_limits() {
        assert_eq!(
            CodecError::WeakPassword { min_len: 8 }.to_string(),
            "password must be at least 8 characters"
        );
        assert_eq!(
            CodecError::TruncatedEnvelope { len: 10, min_len: 44 }.to_string(),
            "envelope is 10 bytes, expected at least 44"
        );
    }
}
