//! Shared test helpers: token pairs, mock-backed clients, polling.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use civic_link::auth::{MemoryTokenStore, TokenPair};
use civic_link::client::{ApiClient, NetworkMonitor, NetworkState};
use civic_link::config::ClientConfig;
use serde_json::{json, Value};
use wiremock::MockServer;

pub fn fresh_pair(access: &str) -> TokenPair {
    TokenPair::new(access, format!("{access}-refresh"), Utc::now() + chrono::Duration::hours(1))
}

pub fn expired_pair(access: &str) -> TokenPair {
    TokenPair::new(access, format!("{access}-refresh"), Utc::now() - chrono::Duration::minutes(5))
}

/// Body the refresh endpoint answers with, wrapped in the success envelope.
pub fn refresh_body(access: &str) -> Value {
    json!({
        "success": true,
        "data": {
            "accessToken": access,
            "refreshToken": format!("{access}-refresh"),
            "expiresAt": (Utc::now() + chrono::Duration::hours(1)).to_rfc3339(),
        },
        "timestamp": Utc::now().to_rfc3339(),
    })
}

pub fn envelope(data: Value) -> Value {
    json!({ "success": true, "data": data, "timestamp": Utc::now().to_rfc3339() })
}

/// Config pointed at the mock server with fast backoff.
pub fn test_config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(server.uri())
        .with_retry_base_delay(Duration::from_millis(10))
        .with_request_timeout(Duration::from_secs(5))
}

pub struct TestClient {
    pub client: ApiClient,
    pub store: Arc<MemoryTokenStore>,
    pub network: NetworkMonitor,
}

pub fn client_with(config: ClientConfig, pair: Option<TokenPair>, online: bool) -> TestClient {
    let store = Arc::new(match pair {
        Some(pair) => MemoryTokenStore::with_pair(pair),
        None => MemoryTokenStore::new(),
    });
    let network = NetworkMonitor::new(if online {
        NetworkState::online()
    } else {
        NetworkState::offline()
    });
    let client = ApiClient::builder(config)
        .with_token_store(store.clone())
        .with_network_monitor(network.clone())
        .build()
        .expect("client builds");
    TestClient {
        client,
        store,
        network,
    }
}

pub fn online_client(server: &MockServer, pair: TokenPair) -> TestClient {
    client_with(test_config(server), Some(pair), true)
}

pub fn offline_client(server: &MockServer, pair: TokenPair) -> TestClient {
    client_with(test_config(server), Some(pair), false)
}

/// Poll until the offline queue holds `expected` calls.
pub async fn wait_for_queue_len(client: &ApiClient, expected: usize) {
    for _ in 0..400 {
        if client.pending_requests() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "queue never reached {expected} entries (has {})",
        client.pending_requests()
    );
}
