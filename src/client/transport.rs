//! Wire layer: turns a descriptor into one HTTP exchange.

use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};

use super::request::{RequestBody, RequestDescriptor};
use super::response::ApiResponse;
use crate::error::{envelope, ApiError, Result};
use crate::util::timeout::with_timeout;

/// Build the HTTP client shared by the transport and the token refresher.
pub fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| ApiError::validation(format!("Failed to build HTTP client: {e}")))
}

#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl Transport {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URLs pass through; paths are joined onto the base URL.
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }

    /// Perform one attempt, bounded by the request timeout.
    pub async fn send(&self, request: &RequestDescriptor) -> Result<ApiResponse> {
        with_timeout(self.timeout, request.is_idempotent(), self.exchange(request)).await
    }

    async fn exchange(&self, request: &RequestDescriptor) -> Result<ApiResponse> {
        let url = self.resolve_url(&request.url);
        let mut builder = self.client.request(request.method.clone(), &url);

        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ApiError::validation(format!("Invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ApiError::validation(format!("Invalid header value for {name}: {e}")))?;
            builder = builder.header(name, value);
        }
        builder = match &request.body {
            Some(RequestBody::Json(value)) => builder.body(serde_json::to_vec(value)?),
            Some(RequestBody::Multipart(file)) => builder.multipart(file.to_form()?),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        if (200..300).contains(&status) {
            ApiResponse::from_body(status, &body)
        } else {
            Err(envelope::error_from_body(status, &body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn transport() -> Transport {
        Transport::new(
            reqwest::Client::new(),
            "https://api.example.com/api/",
            Duration::from_secs(30),
        )
    }

    #[test]
    fn joins_paths_onto_base() {
        assert_eq!(
            transport().resolve_url("/visitors"),
            "https://api.example.com/api/visitors"
        );
        assert_eq!(
            transport().resolve_url("bills/1"),
            "https://api.example.com/api/bills/1"
        );
    }

    #[test]
    fn absolute_urls_pass_through() {
        assert_eq!(
            transport().resolve_url("https://cdn.example.com/file.png"),
            "https://cdn.example.com/file.png"
        );
    }

    #[tokio::test]
    async fn connection_refused_is_a_retryable_network_error() {
        let transport = Transport::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            Duration::from_secs(5),
        );
        let err = transport
            .send(&RequestDescriptor::get("/visitors"))
            .await
            .unwrap_err();
        assert!(err.is_network());
        assert!(err.retryable);
    }

    #[tokio::test]
    async fn bad_header_is_rejected_before_sending() {
        let err = transport()
            .send(&RequestDescriptor::get("/visitors").with_header("X-Bad", "line\nbreak"))
            .await
            .unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
    }
}
