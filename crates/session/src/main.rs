// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::{Parser, Subcommand};
use tracing::error;

use dz_session::codec;
use dz_session::config::SessionConfig;
use dz_session::monitor::system_now_ms;

#[derive(Debug, Parser)]
#[command(name = "dz-session", version, about = "Dashboard session token manager")]
struct Cli {
    #[command(flatten)]
    config: SessionConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Keep the stored session refreshed until interrupted.
    Run,
    /// Sign in and store the session.
    Login {
        #[arg(long, env = "DZ_EMAIL")]
        email: String,
        #[arg(long, env = "DZ_PASSWORD")]
        password: String,
    },
    /// Create an account and store the session.
    Register {
        #[arg(long)]
        name: String,
        #[arg(long, env = "DZ_EMAIL")]
        email: String,
        #[arg(long, env = "DZ_PASSWORD")]
        password: String,
    },
    /// End the stored session.
    Logout,
    /// Print the stored session as JSON.
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    dz_session::init_tracing(&cli.config);
    let _ = rustls::crypto::ring::default_provider().install_default();

    if let Err(e) = dispatch(cli).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config;
    match cli.command {
        Command::Run => dz_session::run(config).await,
        Command::Login { email, password } => {
            let manager = dz_session::connect(&config)?;
            let resp = manager.login(&email, &password).await?;
            print_json(&serde_json::json!({ "loggedIn": true, "user": resp.user }))
        }
        Command::Register { name, email, password } => {
            let manager = dz_session::connect(&config)?;
            let resp = manager.register(&name, &email, &password).await?;
            print_json(&serde_json::json!({ "loggedIn": true, "user": resp.user }))
        }
        Command::Logout => {
            let manager = dz_session::connect(&config)?;
            let had_session = manager.store().has_session();
            manager.logout().await;
            print_json(&serde_json::json!({ "loggedOut": had_session }))
        }
        Command::Status => {
            let store = dz_session::open_store(&config)?;
            print_json(&status(&store))
        }
    }
}

fn status(store: &dz_session::store::TokenStore) -> serde_json::Value {
    let Some(tokens) = store.tokens() else {
        return serde_json::json!({ "session": false, "user": store.user() });
    };
    let claims = codec::decode_claims(&tokens.access_token).ok();
    let expires_at = codec::decode_expiry(&tokens.access_token).ok();
    serde_json::json!({
        "session": true,
        "expiresAtMs": expires_at,
        "remainingMs": expires_at.map(|exp| exp - system_now_ms()),
        "subject": claims.as_ref().and_then(|c| c.get("sub")).cloned(),
        "role": claims.as_ref().and_then(|c| c.get("role")).cloned(),
        "user": store.user(),
    })
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
