//! CLI auth command handlers for status, me, and logout.

use crate::auth::AuthService;
use crate::client::ApiClient;

/// Handle `civic auth status`.
pub async fn handle_status(client: &ApiClient) -> Result<(), Box<dyn std::error::Error>> {
    let auth = AuthService::new(client.clone());

    println!("🔐 Session Status\n");
    println!("  Backend: {}", client.config().base_url);
    println!("  Token dir: {}", client.config().token_dir.display());

    match auth.session() {
        Ok(Some(pair)) => {
            let leeway = chrono::Duration::from_std(client.config().refresh_leeway)
                .unwrap_or_else(|_| chrono::Duration::zero());
            if pair.is_expired(leeway) {
                println!("  Session: ⚠️  Access token expired (will refresh on next request)");
            } else {
                println!(
                    "  Session: ✅ Logged in (expires {})",
                    pair.expires_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Ok(None) => println!("  Session: ❌ Not logged in"),
        Err(e) => println!("  Session: ⚠️  Error: {e}"),
    }
    println!("  Refresh state: {}", auth.refresh_state());
    Ok(())
}

/// Handle `civic auth me`.
pub async fn handle_me(client: &ApiClient) -> Result<(), Box<dyn std::error::Error>> {
    let response = AuthService::new(client.clone()).me().await?;
    println!("{}", serde_json::to_string_pretty(&response.data)?);
    Ok(())
}

/// Handle `civic auth logout`.
pub async fn handle_logout(client: &ApiClient) -> Result<(), Box<dyn std::error::Error>> {
    AuthService::new(client.clone()).logout().await?;
    println!("✅ Logged out");
    Ok(())
}
