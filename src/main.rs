use std::sync::Arc;

use axum::http::Method;
use axum::{Router, routing::get};
use clap::Parser;
use libris::auth::AuthKeys;
use libris::config::{Cli, Config, default_config_dir, default_config_path};
use libris::db::Database;
use libris::handler::{AppState, healthcheck, service_info};
use libris::{account, appointment, catalog, comment, ledger};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    dotenvy::dotenv().ok();

    // Determine config path and data directory
    // If --config is provided, use its parent directory for data (database, etc.)
    // Otherwise use ~/.libris/ for both
    let (config_path, data_dir) = match args.config_path {
        Some(path) => {
            let path = std::path::PathBuf::from(path);
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            (path, dir)
        }
        None => {
            let dir = default_config_dir();
            (default_config_path(), dir)
        }
    };

    // Ensure data directory exists
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        eprintln!("failed to create data directory {:?}: {}", data_dir, e);
        std::process::exit(1);
    }

    tracing_subscriber::fmt().json().init();
    tracing::info!("libris.svc starting");

    let cfg = Config::new(config_path.to_str().unwrap()).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });
    let db = Arc::new(Database::new(&cfg, &data_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup database");
        std::process::exit(1);
    }));
    let auth = Arc::new(AuthKeys::new(
        &cfg.app.jwt_secret,
        cfg.app.token_ttl_hours,
    ));

    let address = format!("0.0.0.0:{}", cfg.app.get_port());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(service_info))
        .route("/api/health", get(healthcheck))
        .nest("/api/users", account::routes())
        .nest("/api/books", catalog::routes())
        .nest("/api/transactions", ledger::routes())
        .nest("/api/appointments", appointment::routes())
        .nest("/api/comments", comment::routes())
        .layer(cors)
        .with_state(AppState { db, auth });

    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    tracing::info!("libris.svc running on {}", &address);
    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "server exited with error");
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("ctrl+c signal received, preparing to shutdown");
        }
    }

    tracing::info!("libris.svc going off, graceful shutdown complete");
}
