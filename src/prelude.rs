//! Convenience re-exports for common use.

pub use crate::auth::{AuthService, RefreshState, TokenPair, TokenStore};
pub use crate::client::{
    ApiClient, ApiResponse, FileUpload, NetworkMonitor, NetworkState, Pipeline, RequestDescriptor,
};
pub use crate::config::ClientConfig;
pub use crate::error::{ApiError, ErrorKind, Result};
pub use crate::util::cache::CachePattern;
