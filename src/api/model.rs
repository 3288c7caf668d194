use serde::{Deserialize, Serialize};
use trust_dns_server::client::rr::LowerName;

/// Length of a [DNS-01] key authorization digest: 32 bytes, base64url encoded without padding.
///
/// [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
pub const TXT_LENGTH: usize = 43;

/// Body of the `/present` and `/cleanup` requests.
#[derive(Deserialize, Debug, Clone, Default, Eq, PartialEq)]
pub(super) struct RecordRequest {
    pub fqdn: String,
    pub value: String,
}

/// A validated record request, with the FQDN in canonical form.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TxtRecord {
    pub fqdn: LowerName,
    pub value: String,
}

#[derive(Serialize, Debug, Clone, Eq, PartialEq)]
pub(super) struct RecordResponse {
    pub fqdn: String,
    pub value: String,
}

impl From<TxtRecord> for RecordResponse {
    fn from(record: TxtRecord) -> Self {
        RecordResponse {
            fqdn: record.fqdn.to_string(),
            value: record.value,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TxtValidationError {
    #[error("invalid length: found {actual} characters, expected {expected}")]
    InvalidLength { actual: usize, expected: usize },
    #[error("invalid character {0:?}")]
    InvalidCharacter(char),
}

/// Check `value` looks like a DNS-01 challenge response: [`TXT_LENGTH`] characters of the
/// base64url alphabet. `=` padding is tolerated.
pub fn valid_dns01(value: &str) -> Result<(), TxtValidationError> {
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '=')))
    {
        return Err(TxtValidationError::InvalidCharacter(c));
    }
    match value.len() {
        TXT_LENGTH => Ok(()),
        actual => Err(TxtValidationError::InvalidLength {
            actual,
            expected: TXT_LENGTH,
        }),
    }
}

/// Body of the `/register` request. Missing fields are caught by validation rather than
/// deserialization, so they get their own error code.
#[derive(Deserialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(default)]
pub(super) struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub zone: String,
    pub allowfrom: Option<Vec<String>>,
}

#[derive(Serialize, Debug, Clone, Eq, PartialEq)]
pub(super) struct RegisterResponse {
    pub message: &'static str,
    pub username: String,
    pub zone: String,
}
