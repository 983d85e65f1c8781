mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{
    Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use kitabya_api::blob::LocalBlobStore;
use kitabya_api::cleanup;
use kitabya_api::identity::JwtIdentityResolver;
use kitabya_api::push::{DisabledPushSender, HttpPushSender, PushSender};
use kitabya_api::{AppState, AppStateInner, build_router};
use kitabya_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kitabya=debug,kitabya_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("FATAL: {:#}", e);
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Arc::new(Database::open(&config.db_path)?);
    let blobs = LocalBlobStore::new(
        config.storage_dir.clone(),
        format!("{}/uploads", config.public_url),
    )
    .await?;

    let push: Arc<dyn PushSender> = match &config.push {
        Some(push) => {
            info!("Push delivery via {}", push.endpoint);
            Arc::new(HttpPushSender::new(push.endpoint.clone(), push.key.clone())?)
        }
        None => {
            warn!("KITABYA_PUSH_ENDPOINT not set, push notifications are disabled");
            Arc::new(DisabledPushSender)
        }
    };

    tokio::spawn(cleanup::run_cleanup_loop(
        db.clone(),
        config.retention_days,
        config.cleanup_interval_secs,
    ));

    let state: AppState = Arc::new(AppStateInner {
        db,
        blobs: Arc::new(blobs),
        identity: Arc::new(JwtIdentityResolver::new(&config.jwt_secret)),
        push,
        admin_emails: config.admin_emails.clone(),
    });

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(false);

    let app = build_router(state)
        .nest_service("/uploads", ServeDir::new(&config.storage_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Kitabya server listening on {}", addr);
    info!(
        "Recent searches kept for {} days, pruned every {}s",
        config.retention_days, config.cleanup_interval_secs
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
