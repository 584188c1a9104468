use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

/// Access/refresh token pair plus the expiry of the access token.
///
/// The three fields are always replaced together; `expires_at` belongs to the
/// `access_token` it arrived with.
///
/// # Example
/// ```
/// use chrono::{Duration, Utc};
/// use civic_link::auth::TokenPair;
///
/// let pair = TokenPair::new("access", "refresh", Utc::now() + Duration::hours(1));
/// assert!(!pair.is_expired(Duration::seconds(30)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(deserialize_with = "deserialize_expires_at")]
    pub expires_at: DateTime<Utc>,
}

impl TokenPair {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Whether the access token expires within `leeway` from now.
    pub fn is_expired(&self, leeway: Duration) -> bool {
        self.expires_at <= Utc::now() + leeway
    }

    /// Hex SHA-256 of the access token, used to tie the stored expiry to it.
    pub fn access_digest(&self) -> String {
        digest_hex(&self.access_token)
    }
}

pub(crate) fn digest_hex(value: &str) -> String {
    Sha256::digest(value.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// `expiresAt` arrives either as RFC 3339 or as epoch milliseconds.
fn deserialize_expires_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawExpiry {
        Millis(i64),
        Text(DateTime<Utc>),
    }

    match RawExpiry::deserialize(deserializer)? {
        RawExpiry::Text(at) => Ok(at),
        RawExpiry::Millis(ms) => DateTime::<Utc>::from_timestamp_millis(ms)
            .ok_or_else(|| serde::de::Error::custom(format!("expiresAt out of range: {ms}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_and_epoch_millis() {
        let text: TokenPair = serde_json::from_str(
            r#"{"accessToken":"a","refreshToken":"r","expiresAt":"2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let millis: TokenPair = serde_json::from_str(
            r#"{"accessToken":"a","refreshToken":"r","expiresAt":1893456000000}"#,
        )
        .unwrap();
        assert_eq!(text.expires_at, millis.expires_at);
    }

    #[test]
    fn expiry_honours_leeway() {
        let pair = TokenPair::new("a", "r", Utc::now() + Duration::seconds(10));
        assert!(!pair.is_expired(Duration::zero()));
        assert!(pair.is_expired(Duration::seconds(30)));
    }

    #[test]
    fn digest_is_stable_hex() {
        let pair = TokenPair::new("abc", "r", Utc::now());
        assert_eq!(
            pair.access_digest(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
