//! Request descriptors handed to [`ApiClient::execute`](super::ApiClient::execute).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use reqwest::Method;
use serde_json::Value;

use crate::error::Result;
use crate::util::cache::CachePattern;

const UPLOAD_CHUNK_BYTES: usize = 16 * 1024;

/// Upload progress reported while a multipart body streams out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub sent: u64,
    pub total: u64,
}

pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// A file sent as a multipart body with a single `file` field.
#[derive(Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Arc<Vec<u8>>,
    pub progress: Option<ProgressCallback>,
}

impl fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .field("progress", &self.progress.as_ref().map(|_| ".."))
            .finish()
    }
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes: Arc::new(bytes),
            progress: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(UploadProgress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Build a fresh multipart form; called once per dispatch attempt.
    pub(crate) fn to_form(&self) -> Result<reqwest::multipart::Form> {
        let total = self.bytes.len() as u64;
        let bytes = Arc::clone(&self.bytes);
        let progress = self.progress.clone();
        let len = bytes.len();

        let chunks = (0..len).step_by(UPLOAD_CHUNK_BYTES).map(move |start| {
            let end = (start + UPLOAD_CHUNK_BYTES).min(len);
            let chunk = bytes[start..end].to_vec();
            if let Some(callback) = &progress {
                callback(UploadProgress {
                    sent: end as u64,
                    total,
                });
            }
            Ok::<_, std::io::Error>(chunk)
        });

        let body = reqwest::Body::wrap_stream(futures::stream::iter(chunks));
        let mut part = reqwest::multipart::Part::stream_with_length(body, total)
            .file_name(self.file_name.clone());
        if let Some(content_type) = &self.content_type {
            part = part.mime_str(content_type)?;
        }
        Ok(reqwest::multipart::Form::new().part("file", part))
    }
}

/// Request payload.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Multipart(FileUpload),
}

/// Everything needed to perform one logical call.
///
/// Immutable once handed over, apart from `retry_count`, which the client
/// sets on each attempt.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use civic_link::client::RequestDescriptor;
///
/// let list = RequestDescriptor::get("/visitors")
///     .with_param("status", "pending")
///     .with_cache("visitors.list?status=pending", Duration::from_secs(60));
///
/// let create = RequestDescriptor::post("/visitors", serde_json::json!({"name": "Test"}))
///     .invalidating("visitors.list");
/// # let _ = (list, create);
/// ```
#[derive(Debug, Clone, Builder)]
pub struct RequestDescriptor {
    #[builder(default = Method::GET)]
    pub method: Method,
    #[builder(into)]
    pub url: String,
    #[builder(default)]
    pub params: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    #[builder(default)]
    pub headers: BTreeMap<String, String>,
    #[builder(default)]
    pub retry_count: u32,
    #[builder(into)]
    pub cache_key: Option<String>,
    pub cache_ttl: Option<Duration>,
    /// Cache patterns dropped after this call succeeds.
    #[builder(default)]
    pub invalidates: Vec<CachePattern>,
    #[builder(default = true)]
    pub authenticated: bool,
}

impl RequestDescriptor {
    pub fn get(url: impl Into<String>) -> Self {
        Self::builder().method(Method::GET).url(url).build()
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::builder().method(Method::DELETE).url(url).build()
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::with_json(Method::POST, url, body)
    }

    pub fn put(url: impl Into<String>, body: Value) -> Self {
        Self::with_json(Method::PUT, url, body)
    }

    pub fn patch(url: impl Into<String>, body: Value) -> Self {
        Self::with_json(Method::PATCH, url, body)
    }

    pub fn upload(url: impl Into<String>, file: FileUpload) -> Self {
        Self::builder()
            .method(Method::POST)
            .url(url)
            .body(RequestBody::Multipart(file))
            .build()
    }

    fn with_json(method: Method, url: impl Into<String>, body: Value) -> Self {
        Self::builder()
            .method(method)
            .url(url)
            .body(RequestBody::Json(body))
            .build()
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Cache the response under `key` for `ttl`.
    pub fn with_cache(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.cache_key = Some(key.into());
        self.cache_ttl = Some(ttl);
        self
    }

    /// Cache the response under `key` with the client's default TTL.
    pub fn cached_as(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Drop matching cache entries once this call succeeds.
    pub fn invalidating(mut self, pattern: impl Into<CachePattern>) -> Self {
        self.invalidates.push(pattern.into());
        self
    }

    /// Send without an `Authorization` header.
    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn is_idempotent(&self) -> bool {
        is_idempotent(&self.method)
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.body, Some(RequestBody::Multipart(_)))
    }

    pub(crate) fn with_bearer(mut self, token: &str) -> Self {
        self.headers
            .insert("Authorization".to_string(), format!("Bearer {token}"));
        self
    }
}

/// Methods whose repetition has no additional effect on the server.
pub fn is_idempotent(method: &Method) -> bool {
    [
        Method::GET,
        Method::HEAD,
        Method::OPTIONS,
        Method::PUT,
        Method::DELETE,
        Method::TRACE,
    ]
    .contains(method)
}
