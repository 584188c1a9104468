//! The authenticated request executor.
//!
//! [`ApiClient`] is the single entry point domain code calls. Per call it
//! consults the response cache, parks the call in the offline queue when
//! there is no connectivity, attaches a valid bearer token, runs the
//! middleware pipeline and retries transient failures with backoff. A 401
//! triggers one coordinated token refresh and one redispatch.

pub mod middleware;
pub mod network;
pub mod queue;
pub mod request;
pub mod response;
pub mod transport;

pub use middleware::{DefaultHeaders, Pipeline, RequestLogger, RequestMiddleware, ResponseMiddleware};
pub use network::{NetworkMonitor, NetworkState};
pub use queue::{FlushReport, OfflineQueue, PendingRequest};
pub use request::{FileUpload, ProgressCallback, RequestBody, RequestDescriptor, UploadProgress};
pub use response::ApiResponse;
pub use transport::Transport;

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::auth::{
    FileTokenStore, HttpTokenRefresher, RefreshCoordinator, TokenRefresher, TokenStore,
};
use crate::config::ClientConfig;
use crate::error::{ApiError, Result};
use crate::util::cache::{CachePattern, ResponseCache};
use crate::util::retry::RetryPolicy;

struct ClientInner {
    config: ClientConfig,
    transport: Transport,
    coordinator: Arc<RefreshCoordinator>,
    retry: RetryPolicy,
    cache: ResponseCache,
    queue: OfflineQueue,
    network: NetworkMonitor,
    pipeline: Pipeline,
}

/// Cheap-to-clone handle; clones share the cache, queue and session.
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use civic_link::client::{ApiClient, RequestDescriptor};
/// use civic_link::config::ClientConfig;
///
/// # async fn example() -> civic_link::error::Result<()> {
/// let client = ApiClient::builder(ClientConfig::new("https://api.example.com/api")).build()?;
/// let visitors = client
///     .execute(
///         RequestDescriptor::get("/visitors")
///             .with_cache("visitors.list", Duration::from_secs(60)),
///     )
///     .await?;
/// println!("{}", visitors.data);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.config.base_url)
            .field("online", &self.is_online())
            .field("pending_requests", &self.pending_requests())
            .field("cached_entries", &self.inner.cache.len())
            .field("pipeline", &self.inner.pipeline)
            .finish()
    }
}

/// Assembles an [`ApiClient`]; every seam falls back to a production default.
pub struct ApiClientBuilder {
    config: ClientConfig,
    token_store: Option<Arc<dyn TokenStore>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    network: Option<NetworkMonitor>,
    pipeline: Option<Pipeline>,
    retry: Option<RetryPolicy>,
    http_client: Option<reqwest::Client>,
}

impl ApiClientBuilder {
    pub fn with_token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn with_network_monitor(mut self, network: NetworkMonitor) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Override the policy derived from the config.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let config = self.config;
        config.validate()?;

        let http = match self.http_client {
            Some(client) => client,
            None => transport::build_http_client()?,
        };
        let store: Arc<dyn TokenStore> = match self.token_store {
            Some(store) => store,
            None => Arc::new(FileTokenStore::new(config.token_store_config())),
        };
        let refresher: Arc<dyn TokenRefresher> = match self.refresher {
            Some(refresher) => refresher,
            None => Arc::new(HttpTokenRefresher::new(
                http.clone(),
                config.refresh_url(),
                config.request_timeout,
            )),
        };

        let coordinator =
            Arc::new(RefreshCoordinator::new(store, refresher).with_leeway(config.refresh_leeway));
        let cache = ResponseCache::new(config.cache_max_entries, config.default_cache_ttl);

        // Cached payloads belong to the session that fetched them.
        let session_cache = cache.clone();
        coordinator.on_auth_failure(Arc::new(move || session_cache.clear()));

        let inner = ClientInner {
            transport: Transport::new(http, config.base_url.clone(), config.request_timeout),
            retry: self.retry.unwrap_or_else(|| config.retry_policy()),
            network: self.network.unwrap_or_default(),
            pipeline: self.pipeline.unwrap_or_else(Pipeline::standard),
            queue: OfflineQueue::new(),
            coordinator,
            cache,
            config,
        };
        Ok(ApiClient {
            inner: Arc::new(inner),
        })
    }
}

impl ApiClient {
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            token_store: None,
            refresher: None,
            network: None,
            pipeline: None,
            retry: None,
            http_client: None,
        }
    }

    /// Perform one logical call.
    ///
    /// Cache hits return without touching the network. While offline, or
    /// while earlier queued calls are still being replayed, the call waits in
    /// the queue until its turn comes (or until `queue_wait_timeout` elapses,
    /// which also removes it from the queue). A network failure that leaves
    /// the device offline is queued instead of surfaced.
    pub async fn execute(&self, request: RequestDescriptor) -> Result<ApiResponse> {
        if let Some(key) = &request.cache_key {
            if let Some(data) = self.inner.cache.get(key) {
                tracing::debug!(key = %key, "cache hit");
                return Ok(ApiResponse::cached(data));
            }
        }

        // Calls queued earlier go out first, even once connectivity is back.
        if !self.is_online() || !self.inner.queue.is_empty() || self.inner.queue.is_draining() {
            return self.enqueue_and_wait(request).await;
        }

        match self.execute_online(request.clone()).await {
            Err(err) if err.is_network() && !self.is_online() => {
                tracing::info!(url = %request.url, "connectivity lost during call; queueing");
                self.enqueue_and_wait(request).await
            }
            outcome => outcome,
        }
    }

    /// Send a file as a multipart `file` field.
    pub async fn upload(&self, url: impl Into<String>, file: FileUpload) -> Result<ApiResponse> {
        self.execute(RequestDescriptor::upload(url, file)).await
    }

    /// Drain the offline queue now, in submission order.
    pub async fn flush_offline_queue(&self) -> FlushReport {
        let network = self.inner.network.clone();
        self.inner
            .queue
            .flush(move || network.is_online(), |request| self.execute_online(request))
            .await
    }

    /// Flush the offline queue every time connectivity comes back.
    ///
    /// The task ends once the client has been dropped.
    pub fn spawn_connectivity_listener(&self) -> JoinHandle<()> {
        let mut changes = self.inner.network.subscribe();
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            let mut was_online = changes.borrow_and_update().is_online();
            while changes.changed().await.is_ok() {
                let online = changes.borrow_and_update().is_online();
                if online {
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    let client = ApiClient { inner };
                    if !was_online || client.pending_requests() > 0 {
                        tracing::info!(
                            pending = client.pending_requests(),
                            "connectivity restored; flushing offline queue"
                        );
                        client.flush_offline_queue().await;
                    }
                }
                was_online = online;
            }
        })
    }

    /// Periodically drop expired cache entries.
    pub fn spawn_cache_sweeper(&self) -> JoinHandle<()> {
        self.inner
            .cache
            .spawn_sweeper(self.inner.config.cache_sweep_interval)
    }

    /// Drop cached entries matching `pattern`, or everything for `None`.
    pub fn invalidate_cache(&self, pattern: Option<&CachePattern>) -> usize {
        self.inner.cache.invalidate(pattern)
    }

    pub fn is_online(&self) -> bool {
        self.inner.network.is_online()
    }

    /// Run `callback` whenever the session is lost for good.
    pub fn on_auth_failure(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner.coordinator.on_auth_failure(Arc::new(callback));
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.inner.network
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Retry loop around [`attempt`](Self::attempt), then cache bookkeeping.
    pub(crate) async fn execute_online(&self, request: RequestDescriptor) -> Result<ApiResponse> {
        let outcome = self
            .inner
            .retry
            .execute(|retry_count| {
                let mut attempt = request.clone();
                attempt.retry_count = retry_count;
                self.attempt(attempt)
            })
            .await;

        match outcome {
            Ok(response) => {
                self.record_success(&request, &response);
                Ok(response)
            }
            Err(err) => {
                self.inner.pipeline.notify_error(&request, &err);
                Err(err)
            }
        }
    }

    async fn attempt(&self, request: RequestDescriptor) -> Result<ApiResponse> {
        if !request.authenticated {
            return self.dispatch(request).await;
        }

        let token = self.inner.coordinator.ensure_valid_token().await?;
        match self.dispatch(request.clone().with_bearer(&token)).await {
            Err(err) if err.is_unauthorized() => {
                tracing::info!(url = %request.url, "access token rejected; refreshing");
                let token = self
                    .inner
                    .coordinator
                    .refresh_after_unauthorized(&token)
                    .await?;
                self.dispatch(request.with_bearer(&token)).await
            }
            outcome => outcome,
        }
    }

    async fn dispatch(&self, mut request: RequestDescriptor) -> Result<ApiResponse> {
        self.inner.pipeline.apply_request(&mut request)?;
        let mut response = self.inner.transport.send(&request).await?;
        self.inner.pipeline.apply_response(&request, &mut response)?;
        Ok(response)
    }

    fn record_success(&self, request: &RequestDescriptor, response: &ApiResponse) {
        for pattern in &request.invalidates {
            let removed = self.inner.cache.invalidate(Some(pattern));
            tracing::debug!(pattern = ?pattern, removed, "invalidated cache entries");
        }
        if let Some(key) = &request.cache_key {
            let ttl = request
                .cache_ttl
                .unwrap_or_else(|| self.inner.cache.default_ttl());
            self.inner.cache.set(key.clone(), response.data.clone(), ttl);
        }
    }

    async fn enqueue_and_wait(&self, request: RequestDescriptor) -> Result<ApiResponse> {
        let (id, receiver) = self.inner.queue.enqueue(request);

        // Connectivity may have returned between the check and the enqueue.
        if self.is_online() {
            let client = self.clone();
            tokio::spawn(async move {
                client.flush_offline_queue().await;
            });
        }

        let delivered = match self.inner.config.queue_wait_timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(delivered) => delivered,
                Err(_) => {
                    if !self.inner.queue.cancel(id) {
                        tracing::debug!(id = %id, "wait expired while the call was being replayed");
                    }
                    return Err(ApiError::network(format!(
                        "Still offline after {}ms; request abandoned",
                        limit.as_millis()
                    )));
                }
            },
            None => receiver.await,
        };
        delivered.unwrap_or_else(|_| Err(ApiError::network("Offline queue dropped the request")))
    }
}
