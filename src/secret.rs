//! Detection and normalization of user-supplied TOTP secrets.
//!
//! Authenticator applications expect the shared secret in the canonical
//! 32-symbol alphabet (`A-Z`, `2-7`). Users paste secrets in whatever shape
//! their provider handed out: grouped canonical text, hex dumps, or plain
//! passphrases. [`normalize`] turns all of them into a [`NormalizedSecret`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SecretError;
use crate::uri::parse_provisioning_uri;

/// The canonical alphabet, indexed by 5-bit value.
pub const CANONICAL_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Canonical pad symbol. Only ever accepted as a trailing run.
pub const PAD: char = '=';

/// Encoding family of a raw secret string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretFormat {
    Canonical,
    Hexadecimal,
    WordPhrase,
    Ambiguous,
}

impl fmt::Display for SecretFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecretFormat::Canonical => "canonical",
            SecretFormat::Hexadecimal => "hexadecimal",
            SecretFormat::WordPhrase => "word-phrase",
            SecretFormat::Ambiguous => "ambiguous",
        };
        f.write_str(name)
    }
}

/// A secret in the canonical alphabet, ready for a TOTP generator.
///
/// Always non-empty. Pad symbols, if any, form a contiguous suffix.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NormalizedSecret(String);

impl NormalizedSecret {
    /// Accepts text that is already canonical, without any cleaning.
    pub fn parse(value: impl Into<String>) -> Result<Self, SecretError> {
        let value = value.into();
        let body = value.trim_end_matches(PAD);
        if body.is_empty() {
            return Err(SecretError::InvalidSecret(
                "secret has no canonical symbols".to_string(),
            ));
        }
        if let Some(bad) = body.chars().find(|c| !is_canonical_symbol(*c)) {
            return Err(SecretError::InvalidSecret(format!(
                "'{bad}' is not in the canonical alphabet"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for symmetry with [`NormalizedSecret::len`].
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decodes the canonical text back into raw key bytes.
    ///
    /// Pad symbols are ignored and trailing bits that do not fill a whole
    /// byte are dropped, so `encode_canonical(bytes)` always decodes back to
    /// `bytes`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 5 / 8);
        let mut buffer: u32 = 0;
        let mut bits: u32 = 0;
        for symbol in self.0.bytes().take_while(|b| *b != PAD as u8) {
            let value = CANONICAL_ALPHABET
                .iter()
                .position(|a| *a == symbol)
                .unwrap_or_default() as u32;
            buffer = (buffer << 5) | value;
            bits += 5;
            if bits >= 8 {
                out.push((buffer >> (bits - 8)) as u8);
                bits -= 8;
            }
            buffer &= (1 << bits) - 1;
        }
        out
    }
}

impl fmt::Display for NormalizedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Secrets stay out of debug output.
impl fmt::Debug for NormalizedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizedSecret")
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}

impl AsRef<str> for NormalizedSecret {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for NormalizedSecret {
    type Err = SecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NormalizedSecret {
    type Error = SecretError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<NormalizedSecret> for String {
    fn from(secret: NormalizedSecret) -> Self {
        secret.0
    }
}

/// Strips whitespace, hyphens and underscores, then uppercases.
pub fn clean(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .flat_map(char::to_uppercase)
        .collect()
}

/// Classifies `input`. Checks run in a fixed order and the first match wins.
pub fn detect_format(input: &str) -> SecretFormat {
    classify(input, &clean(input))
}

fn classify(input: &str, cleaned: &str) -> SecretFormat {
    if is_canonical(cleaned) {
        SecretFormat::Canonical
    } else if is_hex(cleaned) {
        SecretFormat::Hexadecimal
    } else if input.split_whitespace().count() >= 2 {
        SecretFormat::WordPhrase
    } else {
        SecretFormat::Ambiguous
    }
}

/// Rewrites arbitrary secret material into the canonical alphabet.
pub fn normalize(input: &str) -> Result<NormalizedSecret, SecretError> {
    let cleaned = clean(input);
    if cleaned.is_empty() {
        return Err(SecretError::InvalidSecret("secret is empty".to_string()));
    }

    let format = classify(input, &cleaned);
    let normalized = match format {
        SecretFormat::Canonical => cleaned,
        SecretFormat::Hexadecimal => {
            let bytes = hex::decode(&cleaned)
                .map_err(|e| SecretError::InvalidSecret(format!("hexadecimal secret: {e}")))?;
            encode_canonical(&bytes)
        }
        SecretFormat::WordPhrase => {
            let joined = join_upper(input);
            if is_canonical(&joined) {
                joined
            } else {
                encode_canonical(joined.as_bytes())
            }
        }
        SecretFormat::Ambiguous => interpret_ambiguous(input, &cleaned),
    };

    debug!(%format, len = normalized.len(), "normalized secret");
    Ok(NormalizedSecret(normalized))
}

/// Extracts the `secret` parameter of a provisioning URI and normalizes it.
pub fn normalize_uri(uri: &str) -> Result<NormalizedSecret, SecretError> {
    let parsed = parse_provisioning_uri(uri)?;
    normalize(&parsed.secret)
}

/// Packs bytes into canonical symbols, 5 bits at a time, MSB first.
///
/// A trailing partial group is right-filled with zero bits. No pad symbols
/// are emitted.
pub fn encode_canonical(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            let index = (buffer >> (bits - 5)) & 0b1_1111;
            out.push(char::from(CANONICAL_ALPHABET[index as usize]));
            bits -= 5;
        }
        buffer &= (1 << bits) - 1;
    }

    if bits > 0 {
        let index = (buffer << (5 - bits)) & 0b1_1111;
        out.push(char::from(CANONICAL_ALPHABET[index as usize]));
    }

    out
}

// Canonical, then hex, then raw text. First success wins.
fn interpret_ambiguous(input: &str, cleaned: &str) -> String {
    if is_canonical(cleaned) {
        return cleaned.to_string();
    }
    if let Ok(bytes) = hex::decode(cleaned) {
        return encode_canonical(&bytes);
    }
    encode_canonical(join_upper(input).as_bytes())
}

fn join_upper(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

fn is_canonical_symbol(c: char) -> bool {
    c.is_ascii_uppercase() || ('2'..='7').contains(&c)
}

fn is_canonical(s: &str) -> bool {
    let body = s.trim_end_matches(PAD);
    !body.is_empty() && body.chars().all(is_canonical_symbol)
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}
