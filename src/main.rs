use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use marquee_api::cli::Args;
use marquee_api::database::{DatabaseManager, Models};
use marquee_api::mailer::LogMailer;
use marquee_api::routes::router;
use marquee_api::server::{self, shutdown_signal};
use marquee_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL and friends
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config = Args::parse().into_config();
    tracing::info!(
        environment = config.environment.as_str(),
        port = config.server.port,
        limiter_enabled = config.limiter.enabled,
        "starting Marquee API"
    );

    let pool = DatabaseManager::connect(&config.database)
        .await
        .context("failed to open database pool")?;

    let deadline = config.server.shutdown_timeout();
    let listener = server::bind(config.server.port).await?;
    let mailer = Arc::new(LogMailer::new(&config.smtp));
    let state = AppState::new(config, Models::postgres(pool.clone()), mailer);
    let background = state.background.clone();

    let served = server::serve(listener, router(state), shutdown_signal(), deadline).await;

    // Mail queued by in-flight requests still gets its chance to go out
    let abandoned = background.wait(deadline).await;
    pool.close().await;

    served?;
    if abandoned > 0 {
        anyhow::bail!("{} background tasks abandoned at shutdown", abandoned);
    }
    tracing::info!("shutdown complete");
    Ok(())
}
