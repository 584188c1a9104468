//! `civic request` handler.

use std::str::FromStr;

use reqwest::Method;

use super::RequestArgs;
use crate::client::{ApiClient, RequestBody, RequestDescriptor};
use crate::error::ApiError;

/// Turn CLI arguments into a descriptor.
pub fn build_descriptor(args: &RequestArgs) -> Result<RequestDescriptor, ApiError> {
    let method = Method::from_str(&args.method.to_ascii_uppercase())
        .map_err(|e| ApiError::validation(format!("Invalid method {:?}: {e}", args.method)))?;
    let body = args
        .body
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| ApiError::validation(format!("--body is not valid JSON: {e}")))?
        .map(RequestBody::Json);

    Ok(RequestDescriptor::builder()
        .method(method)
        .url(args.path.clone())
        .params(args.params.clone())
        .maybe_body(body)
        .maybe_cache_key(args.cache_key.clone())
        .authenticated(!args.no_auth)
        .build())
}

/// Handle `civic request <METHOD> <PATH>`.
pub async fn handle_request(
    client: &ApiClient,
    args: &RequestArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let descriptor = build_descriptor(args)?;
    let response = client.execute(descriptor).await?;

    if response.from_cache {
        eprintln!("(served from cache)");
    } else {
        eprintln!("HTTP {}", response.status);
    }
    println!("{}", serde_json::to_string_pretty(&response.data)?);
    Ok(())
}
