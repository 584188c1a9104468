use super::coordinator::RefreshState;
use super::token::TokenPair;
use crate::client::{ApiClient, ApiResponse, RequestDescriptor};
use crate::error::Result;

pub const ME_PATH: &str = "/auth/me";
pub const LOGOUT_PATH: &str = "/auth/logout";

/// Session facade over an [`ApiClient`].
///
/// All I/O decisions (printing, prompting, exit codes) belong to the caller.
/// `AuthService` only returns typed results and errors.
///
/// # Example
/// ```no_run
/// use chrono::{Duration, Utc};
/// use civic_link::auth::{AuthService, TokenPair};
/// use civic_link::client::ApiClient;
/// use civic_link::config::ClientConfig;
///
/// # async fn example() -> civic_link::error::Result<()> {
/// let client = ApiClient::builder(ClientConfig::from_env()?).build()?;
/// let auth = AuthService::new(client);
/// auth.install_session(&TokenPair::new("access", "refresh", Utc::now() + Duration::hours(1)))?;
/// let me = auth.me().await?;
/// # let _ = me;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AuthService {
    client: ApiClient,
}

impl AuthService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Store the pair issued by a successful login.
    pub fn install_session(&self, pair: &TokenPair) -> Result<()> {
        self.client.coordinator().install(pair)?;
        tracing::info!(expires_at = %pair.expires_at, "session installed");
        Ok(())
    }

    pub fn session(&self) -> Result<Option<TokenPair>> {
        self.client.coordinator().current()
    }

    pub fn is_authenticated(&self) -> Result<bool> {
        Ok(self.session()?.is_some())
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.client.coordinator().state()
    }

    /// Profile of the signed-in user.
    pub async fn me(&self) -> Result<ApiResponse> {
        self.client.execute(RequestDescriptor::get(ME_PATH)).await
    }

    /// End the session.
    ///
    /// The server is told when reachable, but its answer never blocks the
    /// local cleanup: both token tiers and the whole cache are cleared.
    pub async fn logout(&self) -> Result<()> {
        if self.client.is_online() && self.session()?.is_some() {
            let request = RequestDescriptor::post(LOGOUT_PATH, serde_json::json!({}));
            if let Err(err) = self.client.execute_online(request).await {
                tracing::warn!(error = %err, "server logout failed; clearing local session anyway");
            }
        } else {
            tracing::debug!("skipping server logout");
        }

        self.client.coordinator().clear()?;
        let dropped = self.client.invalidate_cache(None);
        tracing::info!(dropped_cache_entries = dropped, "logged out");
        Ok(())
    }
}
