// Main application entrypoint. Sets up configuration, logging, DI wiring and starts the Axum server.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{http::HeaderValue, Router};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::{Any, CorsLayer}, compression::CompressionLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use debt_api::auth::{AuthService, JwtAuthService};
use debt_api::config::AppConfig;
use debt_api::handlers::{app, AppState};
use debt_api::posts::{HttpPostSource, PostSource};
use debt_api::repository::RepositoryFactory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,axum=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).compact().init();

    let cfg = AppConfig::from_env().context("invalid configuration")?;

    // Try to connect to Postgres; fall back to in-memory if unavailable
    let pool = match PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.url)
        .await
    {
        Ok(p) => {
            if let Err(e) = sqlx::migrate!("./migrations").run(&p).await {
                tracing::error!(error = %e, "schema setup failed; continuing without database");
                None
            } else {
                Some(p)
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Postgres not available; starting with in-memory store");
            None
        }
    };

    let repos = match pool {
        Some(ref p) => RepositoryFactory::postgres(p.clone()),
        None => RepositoryFactory::in_memory(),
    };

    let auth = Arc::new(JwtAuthService::from_config(&cfg.jwt)?) as Arc<dyn AuthService>;
    let posts = Arc::new(HttpPostSource::from_config(&cfg.upstream)?) as Arc<dyn PostSource>;

    let state = AppState::new(repos, auth, posts, cfg.max_page_size, pool);

    let router: Router = app(state)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&cfg.server.cors_origin)?);

    let host: std::net::IpAddr = cfg.server.host.parse().with_context(|| format!("invalid host {}", cfg.server.host))?;
    let addr = SocketAddr::new(host, cfg.server.port);
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let origin = HeaderValue::from_str(origin).with_context(|| format!("invalid CORS origin {origin}"))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => { term.recv().await; }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! { _ = ctrl_c => {}, _ = terminate => {}, }
    tracing::info!("shutdown signal received");
}
