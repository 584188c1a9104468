//! The refresh-token exchange against `POST /auth/refresh`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::token::TokenPair;
use crate::error::envelope::error_from_body;
use crate::error::Result;
use crate::util::timeout::with_timeout;

/// Exchanges a refresh token for a new token pair.
///
/// Implementations perform exactly one network call per invocation; the
/// coordinator decides when (and how rarely) to call it.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair>;
}

/// Refresher that talks to the backend's refresh endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

impl HttpTokenRefresher {
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        tracing::debug!(url = %self.url, "refreshing access token");
        let call = async {
            let resp = self
                .client
                .post(&self.url)
                .json(&RefreshRequest { refresh_token })
                .send()
                .await?;
            let status = resp.status().as_u16();
            let body = resp.text().await?;
            if !(200..300).contains(&status) {
                return Err(error_from_body(status, &body));
            }
            parse_token_pair(&body)
        };
        with_timeout(self.timeout, true, call).await
    }
}

/// Accepts both a bare token pair and one wrapped in the success envelope.
fn parse_token_pair(body: &str) -> Result<TokenPair> {
    let value: Value = serde_json::from_str(body)?;
    let payload = match value.get("data") {
        Some(data) if value.get("success").is_some() => data.clone(),
        _ => value,
    };
    Ok(serde_json::from_value(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_pair() {
        let pair = parse_token_pair(
            r#"{"accessToken":"a2","refreshToken":"r2","expiresAt":"2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(pair.access_token, "a2");
        assert_eq!(pair.refresh_token, "r2");
    }

    #[test]
    fn parses_enveloped_pair() {
        let pair = parse_token_pair(
            r#"{"success":true,"data":{"accessToken":"a3","refreshToken":"r3","expiresAt":1893456000000},"timestamp":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(pair.access_token, "a3");
    }

    #[test]
    fn missing_fields_are_malformed() {
        let err = parse_token_pair(r#"{"accessToken":"a"}"#).unwrap_err();
        assert!(!err.retryable);
        assert!(err.message.starts_with("Malformed response body"));
    }

    #[tokio::test]
    async fn rejected_refresh_maps_the_error_envelope() {
        use wiremock::matchers::{body_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(body_json(serde_json::json!({"refreshToken": "revoked"})))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "success": false,
                "error": {"code": "TOKEN_REVOKED", "message": "refresh token revoked", "statusCode": 401}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let refresher = HttpTokenRefresher::new(
            reqwest::Client::new(),
            format!("{}/auth/refresh", server.uri()),
            Duration::from_secs(5),
        );
        let err = refresher.refresh("revoked").await.unwrap_err();

        assert_eq!(err.status_code, Some(401));
        assert_eq!(err.code, "TOKEN_REVOKED");
        assert!(err.is_unauthorized());
    }
}
