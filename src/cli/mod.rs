//! CLI entry point for civic-link.

pub mod auth;
pub mod request;

use clap::{Parser, Subcommand};

/// Resilient client for the civic backend
#[derive(Parser, Debug)]
#[command(name = "civic", version, about = "civic-link API client CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Session management
    Auth(AuthArgs),
    /// Send one request through the resilient client
    Request(RequestArgs),
}

/// Arguments for the `auth` subcommand group.
#[derive(Parser, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Show the stored session
    Status,
    /// Fetch the signed-in user's profile
    Me,
    /// End the session and clear local credentials
    Logout,
}

/// Arguments for `civic request`.
#[derive(Parser, Debug)]
pub struct RequestArgs {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE)
    pub method: String,

    /// Path relative to the base URL, or an absolute URL
    pub path: String,

    /// JSON request body
    #[arg(long)]
    pub body: Option<String>,

    /// Cache the response under this key
    #[arg(long)]
    pub cache_key: Option<String>,

    /// Query parameter as name=value (repeatable)
    #[arg(long = "param", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,

    /// Send without the bearer token
    #[arg(long)]
    pub no_auth: bool,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_request_with_body_and_cache_key() {
        let cli = Cli::try_parse_from([
            "civic",
            "request",
            "POST",
            "/visitors",
            "--body",
            r#"{"name":"Test"}"#,
            "--cache-key",
            "visitors.last",
        ])
        .unwrap();
        match cli.command {
            Commands::Request(args) => {
                assert_eq!(args.method, "POST");
                assert_eq!(args.path, "/visitors");
                assert_eq!(args.body.as_deref(), Some(r#"{"name":"Test"}"#));
                assert_eq!(args.cache_key.as_deref(), Some("visitors.last"));
                assert!(!args.no_auth);
            }
            other => panic!("expected Request, got {other:?}"),
        }
    }

    #[test]
    fn parse_repeated_params() {
        let cli = Cli::try_parse_from([
            "civic", "request", "GET", "/bills", "--param", "status=due", "--param", "page=2",
        ])
        .unwrap();
        match cli.command {
            Commands::Request(args) => assert_eq!(
                args.params,
                vec![
                    ("status".to_string(), "due".to_string()),
                    ("page".to_string(), "2".to_string())
                ]
            ),
            other => panic!("expected Request, got {other:?}"),
        }
    }

    #[test]
    fn reject_param_without_equals() {
        assert!(Cli::try_parse_from(["civic", "request", "GET", "/bills", "--param", "oops"]).is_err());
    }

    fn auth_command(word: &str) -> AuthCommands {
        match Cli::try_parse_from(["civic", "auth", word]).unwrap().command {
            Commands::Auth(auth) => auth.command,
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[test]
    fn parse_auth_subcommands() {
        assert!(matches!(auth_command("status"), AuthCommands::Status));
        assert!(matches!(auth_command("me"), AuthCommands::Me));
        assert!(matches!(auth_command("logout"), AuthCommands::Logout));
    }
}
