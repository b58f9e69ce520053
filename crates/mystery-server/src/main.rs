mod config;

use std::sync::Arc;

use tracing::{info, warn};

use mystery_api::email::Mailer;
use mystery_api::suggest::Suggester;
use mystery_api::{AppState, AppStateInner, build_router};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mystery_server=debug,mystery_api=debug,mystery_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database
    let db = mystery_db::Database::open(&config.db_path)?;

    let mailer = Mailer::new(config.mailer.clone());
    if !mailer.is_configured() {
        warn!("RESEND_API_KEY is not set; verification emails will not be delivered");
    }
    if config.expose_code_on_email_failure {
        warn!("Verification codes are returned in sign-up responses when email fails");
    }

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        mailer,
        suggester: Suggester::new(config.suggester.clone()),
        expose_code_on_email_failure: config.expose_code_on_email_failure,
    });

    let app = build_router(state);

    info!("Mystery Message server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
