//! Token storage, single-flight refresh and the auth endpoints.

pub mod coordinator;
pub mod error;
pub mod refresh;
pub mod service;
pub mod store;
pub mod token;

pub use coordinator::{AuthFailureCallback, RefreshCoordinator, RefreshState};
pub use error::AuthError;
pub use refresh::{HttpTokenRefresher, TokenRefresher};
pub use service::AuthService;
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore, TokenStoreConfig};
pub use token::TokenPair;
