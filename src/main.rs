//! civic CLI binary entry point.

use clap::Parser;
use civic_link::cli::{AuthCommands, Cli, Commands};
use civic_link::client::ApiClient;
use civic_link::config::ClientConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env()?;
    let client = ApiClient::builder(config).build()?;

    match cli.command {
        Commands::Auth(auth_args) => match auth_args.command {
            AuthCommands::Status => civic_link::cli::auth::handle_status(&client).await,
            AuthCommands::Me => civic_link::cli::auth::handle_me(&client).await,
            AuthCommands::Logout => civic_link::cli::auth::handle_logout(&client).await,
        },
        Commands::Request(args) => civic_link::cli::request::handle_request(&client, &args).await,
    }
}
