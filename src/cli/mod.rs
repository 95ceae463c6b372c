use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use crate::auth::{Authenticator, Claims, Role};
use crate::config::{self, AppConfig};
use crate::database::DatabaseManager;
use crate::routes;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "teller-api")]
#[command(about = "Teller API - customers, accounts, deposits and transactions over REST")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Bind address, overrides API_HOST")]
        host: Option<String>,

        #[arg(long, help = "Port, overrides TELLER_API_PORT / PORT")]
        port: Option<u16>,
    },

    #[command(about = "Print the effective configuration as JSON, secrets redacted")]
    Config,

    #[command(about = "Sign a bearer token for a user id")]
    Token {
        #[arg(long, help = "Subject (user id)")]
        sub: String,

        #[arg(long, default_value = "", help = "Audience (tenant)")]
        aud: String,

        #[arg(long = "role", value_parser = ["user", "admin", "super_admin"], help = "Role, repeatable")]
        roles: Vec<String>,

        #[arg(long, help = "Lifetime in hours, defaults to security.jwt_expiry_hours")]
        hours: Option<u64>,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::config().clone();

    match cli.command.unwrap_or(Commands::Serve { host: None, port: None }) {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            Ok(())
        }
        Commands::Token { sub, aud, roles, hours } => {
            let roles: Vec<Role> = roles.iter().filter_map(|r| parse_role(r)).collect();
            let claims = Claims::new(sub, aud, &roles, hours.unwrap_or(config.security.jwt_expiry_hours));
            let authenticator = Authenticator::new(&config.security.jwt_secret).context("JWT_SECRET must be set")?;
            println!("{}", authenticator.encode(&claims)?);
            Ok(())
        }
    }
}

fn parse_role(raw: &str) -> Option<Role> {
    match raw {
        "user" => Some(Role::User),
        "admin" => Some(Role::Admin),
        "super_admin" => Some(Role::SuperAdmin),
        _ => None,
    }
}

async fn serve(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.api.host = host;
    }
    if let Some(port) = port {
        config.api.port = port;
    }

    tracing::info!("Starting teller-api in {:?} mode", config.environment);
    let pool = DatabaseManager::connect(&config.database)
        .await
        .context("failed to connect to the database")?;

    let bind_addr = format!("{}:{}", config.api.host, config.api.port);
    let state = AppState::new(pool, config).context("JWT_SECRET must be set")?;
    let app = routes::app(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("teller-api listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    tracing::info!("teller-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["teller-api", "serve", "--port", "8081"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve { port: Some(8081), .. })));

        let cli = Cli::try_parse_from(["teller-api"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["teller-api", "token", "--sub", "abc", "--role", "admin", "--role", "user"]).unwrap();
        match cli.command {
            Some(Commands::Token { roles, aud, .. }) => {
                assert_eq!(roles, vec!["admin".to_string(), "user".to_string()]);
                assert_eq!(aud, "");
            }
            _ => panic!("expected token command"),
        }

        assert!(Cli::try_parse_from(["teller-api", "token", "--sub", "abc", "--role", "root"]).is_err());
    }
}
