//! civic-link: resilient authenticated API access
//!
//! The network layer of a residential-community app. Every call goes through
//! one [`ApiClient`](client::ApiClient), which keeps the session alive with a
//! single-flight token refresh, retries transient failures with exponential
//! backoff, parks calls in a FIFO queue while the device is offline and
//! serves repeated reads from a TTL cache.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use civic_link::prelude::*;
//!
//! # async fn example() -> civic_link::error::Result<()> {
//! let client = ApiClient::builder(ClientConfig::from_env()?).build()?;
//! client.spawn_connectivity_listener();
//! client.spawn_cache_sweeper();
//!
//! let bills = client
//!     .execute(RequestDescriptor::get("/bills").with_cache("bills.list", Duration::from_secs(60)))
//!     .await?;
//! println!("{}", bills.data);
//!
//! client
//!     .execute(RequestDescriptor::post("/bills/bill-123/pay", serde_json::json!({})).invalidating("bills."))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod prelude;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
