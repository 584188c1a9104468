//! Single-flight access token refresh.
//!
//! The coordinator is the only writer of the stored [`TokenPair`]. Callers ask
//! it for a usable access token; when the stored one has expired (or the
//! server rejected it with a 401) exactly one refresh call is made, and every
//! caller that shows up while it runs awaits the same memoized future.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use strum::Display;

use super::refresh::TokenRefresher;
use super::store::TokenStore;
use super::token::TokenPair;
use crate::error::{ApiError, Result};

type RefreshFuture = Shared<BoxFuture<'static, Result<String>>>;

/// Callback fired when a refresh permanently fails.
pub type AuthFailureCallback = Arc<dyn Fn() + Send + Sync>;

/// Where the coordinator is in its refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RefreshState {
    Valid,
    Refreshing,
    Failed,
}

struct RefreshInner {
    state: RefreshState,
    in_flight: Option<RefreshFuture>,
}

/// Owns the token lifecycle: validity checks, refresh, login and logout.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use civic_link::auth::{HttpTokenRefresher, MemoryTokenStore, RefreshCoordinator};
///
/// # async fn example() -> civic_link::error::Result<()> {
/// let refresher = HttpTokenRefresher::new(
///     reqwest::Client::new(),
///     "https://api.example.com/auth/refresh",
///     Duration::from_secs(30),
/// );
/// let coordinator = RefreshCoordinator::new(Arc::new(MemoryTokenStore::new()), Arc::new(refresher));
/// let token = coordinator.ensure_valid_token().await?;
/// # let _ = token;
/// # Ok(())
/// # }
/// ```
pub struct RefreshCoordinator {
    store: Arc<dyn TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    leeway: chrono::Duration,
    inner: Arc<Mutex<RefreshInner>>,
    hooks: Arc<Mutex<Vec<AuthFailureCallback>>>,
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("state", &self.state())
            .field("leeway", &self.leeway)
            .finish()
    }
}

impl RefreshCoordinator {
    pub fn new(store: Arc<dyn TokenStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            store,
            refresher,
            leeway: chrono::Duration::zero(),
            inner: Arc::new(Mutex::new(RefreshInner {
                state: RefreshState::Valid,
                in_flight: None,
            })),
            hooks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Treat tokens expiring within `leeway` as already expired.
    pub fn with_leeway(mut self, leeway: std::time::Duration) -> Self {
        self.leeway = chrono::Duration::from_std(leeway).unwrap_or(chrono::Duration::zero());
        self
    }

    pub fn state(&self) -> RefreshState {
        lock(&self.inner).state
    }

    /// Register a callback for permanent refresh failure.
    pub fn on_auth_failure(&self, callback: AuthFailureCallback) {
        lock(&self.hooks).push(callback);
    }

    /// Return a usable access token, refreshing at most once system-wide.
    pub async fn ensure_valid_token(&self) -> Result<String> {
        self.acquire(|pair| !pair.is_expired(self.leeway)).await
    }

    /// Obtain a replacement for an access token the server answered 401 to.
    ///
    /// If another caller already swapped the token, the new one is returned
    /// without a network call.
    pub async fn refresh_after_unauthorized(&self, rejected: &str) -> Result<String> {
        self.acquire(|pair| pair.access_token != rejected && !pair.is_expired(self.leeway))
            .await
    }

    /// Persist a freshly issued pair (login).
    pub fn install(&self, pair: &TokenPair) -> Result<()> {
        let mut inner = lock(&self.inner);
        self.store.save(pair)?;
        inner.state = RefreshState::Valid;
        Ok(())
    }

    /// Drop the stored pair (logout).
    pub fn clear(&self) -> Result<()> {
        let _inner = lock(&self.inner);
        self.store.clear()?;
        Ok(())
    }

    /// Currently stored pair, if any.
    pub fn current(&self) -> Result<Option<TokenPair>> {
        Ok(self.store.load()?)
    }

    async fn acquire(&self, usable: impl Fn(&TokenPair) -> bool) -> Result<String> {
        let pending = {
            let mut inner = lock(&self.inner);
            if let Some(in_flight) = inner.in_flight.clone() {
                in_flight
            } else {
                match self.store.load()? {
                    Some(pair) if usable(&pair) => return Ok(pair.access_token),
                    Some(pair) => self.start_refresh(&mut inner, pair),
                    None => return Err(ApiError::auth_expired("Not logged in")),
                }
            }
        };
        pending.await
    }

    fn start_refresh(&self, inner: &mut RefreshInner, pair: TokenPair) -> RefreshFuture {
        inner.state = RefreshState::Refreshing;

        let store = Arc::clone(&self.store);
        let refresher = Arc::clone(&self.refresher);
        let shared_inner = Arc::clone(&self.inner);
        let hooks = Arc::clone(&self.hooks);

        let refresh = async move {
            let refreshed = refresher.refresh(&pair.refresh_token).await;

            let mut inner = lock(&shared_inner);
            inner.in_flight = None;
            let outcome = refreshed.and_then(|next| {
                store.save(&next)?;
                Ok(next)
            });

            match outcome {
                Ok(next) => {
                    inner.state = RefreshState::Valid;
                    drop(inner);
                    tracing::info!(expires_at = %next.expires_at, "access token refreshed");
                    Ok(next.access_token)
                }
                Err(err) => {
                    inner.state = RefreshState::Failed;
                    if let Err(clear_err) = store.clear() {
                        tracing::warn!(error = %clear_err, "failed to clear token store after refresh failure");
                    }
                    drop(inner);
                    tracing::warn!(error = %err, "token refresh failed; session cleared");

                    let callbacks = lock(&hooks).clone();
                    for callback in callbacks {
                        callback();
                    }
                    Err(ApiError::auth_expired(format!(
                        "Session expired: {}",
                        err.message
                    )))
                }
            }
        }
        .boxed()
        .shared();

        inner.in_flight = Some(refresh.clone());
        refresh
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
