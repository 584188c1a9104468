//! Connectivity seam fed by the platform's network state monitor.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Snapshot reported by the platform on every connectivity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub is_connected: bool,
    /// `None` while the platform has not probed reachability yet.
    pub is_internet_reachable: Option<bool>,
}

impl NetworkState {
    pub fn online() -> Self {
        Self {
            is_connected: true,
            is_internet_reachable: Some(true),
        }
    }

    pub fn offline() -> Self {
        Self {
            is_connected: false,
            is_internet_reachable: Some(false),
        }
    }

    /// Connected, and reachability not known to be false.
    pub fn is_online(&self) -> bool {
        self.is_connected && self.is_internet_reachable != Some(false)
    }
}

/// Shared connectivity state. Clones observe the same state.
///
/// # Example
/// ```
/// use civic_link::client::{NetworkMonitor, NetworkState};
///
/// let monitor = NetworkMonitor::new(NetworkState::online());
/// monitor.report(NetworkState::offline());
/// assert!(!monitor.is_online());
/// ```
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    sender: Arc<watch::Sender<NetworkState>>,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkState::online())
    }
}

impl NetworkMonitor {
    pub fn new(initial: NetworkState) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Record a connectivity change from the platform.
    pub fn report(&self, state: NetworkState) {
        let previous = self.sender.send_replace(state);
        if previous.is_online() != state.is_online() {
            tracing::info!(
                online = state.is_online(),
                is_connected = state.is_connected,
                is_internet_reachable = ?state.is_internet_reachable,
                "network state changed"
            );
        }
    }

    pub fn current(&self) -> NetworkState {
        *self.sender.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.sender.subscribe()
    }
}
