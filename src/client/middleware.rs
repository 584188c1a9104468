//! Ordered request/response middleware composed around every dispatch.
//!
//! Request middleware runs in registration order on a copy of the descriptor
//! just before it goes on the wire. Response middleware runs in registration
//! order on every successful response; `on_error` observes failures.

use std::fmt;
use std::sync::Arc;

use super::request::RequestDescriptor;
use super::response::ApiResponse;
use crate::error::{ApiError, Result};

/// Transforms an outgoing request. Returning an error rejects the call
/// before anything is sent.
pub trait RequestMiddleware: Send + Sync {
    fn name(&self) -> &str;
    fn on_request(&self, request: &mut RequestDescriptor) -> Result<()>;
}

/// Transforms successful responses and observes failures.
pub trait ResponseMiddleware: Send + Sync {
    fn name(&self) -> &str;

    fn on_response(&self, _request: &RequestDescriptor, _response: &mut ApiResponse) -> Result<()> {
        Ok(())
    }

    fn on_error(&self, _request: &RequestDescriptor, _error: &ApiError) {}
}

/// The middleware chain used by [`ApiClient`](super::ApiClient).
#[derive(Clone, Default)]
pub struct Pipeline {
    request: Vec<Arc<dyn RequestMiddleware>>,
    response: Vec<Arc<dyn ResponseMiddleware>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("request", &self.request_names())
            .field("response", &self.response_names())
            .finish()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON default headers plus request logging.
    pub fn standard() -> Self {
        let logger = Arc::new(RequestLogger);
        Self::new()
            .with_request(Arc::new(DefaultHeaders::json()))
            .with_request(logger.clone())
            .with_response(logger)
    }

    pub fn with_request(mut self, middleware: Arc<dyn RequestMiddleware>) -> Self {
        self.request.push(middleware);
        self
    }

    pub fn with_response(mut self, middleware: Arc<dyn ResponseMiddleware>) -> Self {
        self.response.push(middleware);
        self
    }

    pub fn request_names(&self) -> Vec<&str> {
        self.request.iter().map(|m| m.name()).collect()
    }

    pub fn response_names(&self) -> Vec<&str> {
        self.response.iter().map(|m| m.name()).collect()
    }

    pub fn apply_request(&self, request: &mut RequestDescriptor) -> Result<()> {
        for middleware in &self.request {
            middleware.on_request(request)?;
        }
        Ok(())
    }

    pub fn apply_response(&self, request: &RequestDescriptor, response: &mut ApiResponse) -> Result<()> {
        for middleware in &self.response {
            middleware.on_response(request, response)?;
        }
        Ok(())
    }

    pub fn notify_error(&self, request: &RequestDescriptor, error: &ApiError) {
        for middleware in &self.response {
            middleware.on_error(request, error);
        }
    }
}

/// Adds headers the caller did not set.
///
/// `Content-Type` is left alone for multipart bodies so the transport can
/// write the boundary.
#[derive(Debug, Clone)]
pub struct DefaultHeaders {
    headers: Vec<(String, String)>,
}

impl DefaultHeaders {
    pub fn new(headers: Vec<(String, String)>) -> Self {
        Self { headers }
    }

    pub fn json() -> Self {
        Self::new(vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ])
    }
}

impl RequestMiddleware for DefaultHeaders {
    fn name(&self) -> &str {
        "default-headers"
    }

    fn on_request(&self, request: &mut RequestDescriptor) -> Result<()> {
        let multipart = request.is_multipart();
        for (name, value) in &self.headers {
            if multipart && name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            let present = request
                .headers
                .keys()
                .any(|existing| existing.eq_ignore_ascii_case(name));
            if !present {
                request.headers.insert(name.clone(), value.clone());
            }
        }
        Ok(())
    }
}

/// Logs every dispatch, response and failure through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogger;

impl RequestMiddleware for RequestLogger {
    fn name(&self) -> &str {
        "request-logger"
    }

    fn on_request(&self, request: &mut RequestDescriptor) -> Result<()> {
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            retry_count = request.retry_count,
            "dispatching request"
        );
        Ok(())
    }
}

impl ResponseMiddleware for RequestLogger {
    fn name(&self) -> &str {
        "request-logger"
    }

    fn on_response(&self, request: &RequestDescriptor, response: &mut ApiResponse) -> Result<()> {
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status = response.status,
            "request succeeded"
        );
        Ok(())
    }

    fn on_error(&self, request: &RequestDescriptor, error: &ApiError) {
        tracing::warn!(
            method = %request.method,
            url = %request.url,
            code = %error.code,
            kind = %error.kind,
            "request failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::request::FileUpload;
    use serde_json::json;
    use std::sync::Mutex;

    struct RequireHeader(&'static str);

    impl RequestMiddleware for RequireHeader {
        fn name(&self) -> &str {
            "require-header"
        }

        fn on_request(&self, request: &mut RequestDescriptor) -> Result<()> {
            if request.headers.contains_key(self.0) {
                Ok(())
            } else {
                Err(ApiError::validation(format!("missing {}", self.0)))
            }
        }
    }

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl ResponseMiddleware for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn on_response(&self, _request: &RequestDescriptor, response: &mut ApiResponse) -> Result<()> {
            response.data["seen"] = json!(true);
            self.seen.lock().unwrap().push("ok".to_string());
            Ok(())
        }

        fn on_error(&self, _request: &RequestDescriptor, error: &ApiError) {
            self.seen.lock().unwrap().push(error.code.clone());
        }
    }

    #[test]
    fn standard_pipeline_is_inspectable() {
        let pipeline = Pipeline::standard();
        assert_eq!(pipeline.request_names(), vec!["default-headers", "request-logger"]);
        assert_eq!(pipeline.response_names(), vec!["request-logger"]);
    }

    #[test]
    fn default_headers_do_not_override_caller() {
        let mut request = RequestDescriptor::get("/visitors").with_header("accept", "text/csv");
        DefaultHeaders::json().on_request(&mut request).unwrap();

        assert_eq!(request.headers["accept"], "text/csv");
        assert_eq!(request.headers["Content-Type"], "application/json");
        assert!(!request.headers.contains_key("Accept"));
    }

    #[test]
    fn multipart_requests_skip_json_content_type() {
        let mut request = RequestDescriptor::upload("/files", FileUpload::new("a.txt", b"hi".to_vec()));
        DefaultHeaders::json().on_request(&mut request).unwrap();
        assert!(!request.headers.contains_key("Content-Type"));
    }

    #[test]
    fn failing_request_middleware_stops_the_chain() {
        let pipeline = Pipeline::new()
            .with_request(Arc::new(RequireHeader("X-Society-Id")))
            .with_request(Arc::new(DefaultHeaders::json()));
        let mut request = RequestDescriptor::get("/visitors");

        let err = pipeline.apply_request(&mut request).unwrap_err();

        assert_eq!(err.code, "VALIDATION_ERROR");
        assert!(request.headers.is_empty());
    }

    #[test]
    fn response_middleware_transforms_and_observes() {
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let pipeline = Pipeline::new().with_response(recorder.clone());
        let request = RequestDescriptor::get("/visitors");
        let mut response = ApiResponse::new(200, json!({}));

        pipeline.apply_response(&request, &mut response).unwrap();
        pipeline.notify_error(&request, &ApiError::http(404, None, "gone"));

        assert_eq!(response.data["seen"], json!(true));
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["ok", "UNKNOWN_ERROR"]);
    }
}
