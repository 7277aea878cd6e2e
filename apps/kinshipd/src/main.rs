use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use directories::ProjectDirs;
use kinship_initdata::InitDataVerifier;
use tracing::{info, warn};

mod app;
mod config;
mod db;
mod middleware;
mod session;

use config::{Args, Config};
use session::SessionIssuer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hyper=warn".into()),
        )
        .json()
        .init();

    let config = Config::from_args(Args::parse())?;
    info!(env = ?config.env, debug_auth = config.debug_auth, "starting kinshipd");
    if config.verifier.allow_insecure_test_bypass {
        warn!("insecure test bypass is enabled; unsigned logins will be accepted");
    }
    if config.verifier.freshness.skip {
        warn!("init data freshness check is disabled");
    }

    let data_dir = resolve_data_dir(config.data_dir.as_deref())?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("create data dir {}", data_dir.display()))?;
    let db_path = data_dir.join("kinship.sqlite");

    let state = app::AppState::init(
        &db_path,
        InitDataVerifier::new(config.verifier.clone()),
        SessionIssuer::new(&config.session_secret, config.session_ttl),
        config.debug_auth,
    )
    .await?;
    info!(path = %db_path.display(), users = state.db.count_users().await?, "user store ready");

    app::serve_tcp(config.addr, state).await?;
    Ok(())
}

fn resolve_data_dir(cli: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(p) = cli {
        return Ok(p.to_path_buf());
    }

    let proj =
        ProjectDirs::from("app", "kinship", "kinshipd").context("resolve platform data dir")?;
    Ok(proj.data_local_dir().to_path_buf())
}
