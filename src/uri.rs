//! `otpauth://totp/...` provisioning links.
//!
//! Format:
//!
//! ```text
//! otpauth://totp/ISSUER:ACCOUNT?secret=SECRET&issuer=ISSUER&algorithm=SHA1&digits=6&period=30
//! ```

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use url::{Url, form_urlencoded};

use crate::error::SecretError;

pub const SCHEME: &str = "otpauth";
pub const AUTHORITY: &str = "totp";

// Keep labels readable: `Example:user@example.com` stays as is.
const LABEL: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b':')
    .remove(b'@')
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

/// Fields of a TOTP provisioning link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningUri {
    pub secret: String,
    pub label: String,
    pub issuer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digits: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,
}

impl ProvisioningUri {
    pub fn new(
        secret: impl Into<String>,
        label: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            secret: secret.into(),
            label: label.into(),
            issuer: issuer.into(),
            algorithm: None,
            digits: None,
            period: None,
        }
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }

    pub fn with_digits(mut self, digits: u32) -> Self {
        self.digits = Some(digits);
        self
    }

    pub fn with_period(mut self, period: u64) -> Self {
        self.period = Some(period);
        self
    }

    /// Renders the link. Optional parameters are only emitted when set.
    pub fn to_uri(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("secret", &self.secret);
        if !self.issuer.is_empty() {
            query.append_pair("issuer", &self.issuer);
        }
        if let Some(algorithm) = &self.algorithm {
            query.append_pair("algorithm", algorithm);
        }
        if let Some(digits) = self.digits {
            query.append_pair("digits", &digits.to_string());
        }
        if let Some(period) = self.period {
            query.append_pair("period", &period.to_string());
        }

        format!(
            "{SCHEME}://{AUTHORITY}/{label}?{query}",
            label = utf8_percent_encode(&self.label, LABEL),
            query = query.finish()
        )
    }
}

impl fmt::Display for ProvisioningUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

/// Parses a provisioning link.
///
/// The label is the first non-empty path segment and must decode to UTF-8.
/// When the query carries no `issuer`, the label prefix before `:` is used
/// instead.
pub fn parse_provisioning_uri(uri: &str) -> Result<ProvisioningUri, SecretError> {
    let url = Url::parse(uri.trim()).map_err(|e| malformed(format!("not a URI: {e}")))?;

    if !url.scheme().eq_ignore_ascii_case(SCHEME) {
        return Err(malformed(format!(
            "expected scheme '{SCHEME}', got '{}'",
            url.scheme()
        )));
    }
    match url.host_str() {
        Some(host) if host.eq_ignore_ascii_case(AUTHORITY) => {}
        other => {
            return Err(malformed(format!(
                "expected authority '{AUTHORITY}', got '{}'",
                other.unwrap_or_default()
            )));
        }
    }

    let label = url
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()))
        .map(|segment| {
            percent_decode_str(segment)
                .decode_utf8()
                .map(|label| label.into_owned())
                .map_err(|e| malformed(format!("label is not valid UTF-8: {e}")))
        })
        .transpose()?
        .unwrap_or_default();

    let mut secret = None;
    let mut issuer = None;
    let mut algorithm = None;
    let mut digits = None;
    let mut period = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "secret" if !value.is_empty() => secret = Some(value.into_owned()),
            "issuer" => issuer = Some(value.into_owned()),
            "algorithm" => algorithm = Some(value.into_owned()),
            "digits" => digits = Some(parse_number::<u32>("digits", &value)?),
            "period" => period = Some(parse_number::<u64>("period", &value)?),
            _ => {}
        }
    }

    let secret = secret.ok_or_else(|| malformed("missing 'secret' parameter".to_string()))?;
    let issuer = issuer
        .or_else(|| label.split_once(':').map(|(prefix, _)| prefix.trim().to_string()))
        .unwrap_or_default();

    Ok(ProvisioningUri {
        secret,
        label,
        issuer,
        algorithm,
        digits,
        period,
    })
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, SecretError> {
    value
        .parse()
        .map_err(|_| malformed(format!("'{name}' must be an unsigned integer, got '{value}'")))
}

fn malformed(reason: String) -> SecretError {
    SecretError::MalformedUri(reason)
}
