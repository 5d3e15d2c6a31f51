//! restlite HTTP server.
//!
//! A PostgREST-compatible REST API over a SQLite database, with row-level
//! security enforced in the application layer.

use anyhow::Result;
use axum::{
    http::Method,
    routing::{any, get},
    Router,
};
use restlite_auth::JwtConfig;
use restlite_core::{AppConfig, SchemaCacheRef};
use restlite_rls::PolicyStore;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod state;

use app::{handle_health, handle_request};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "restlite=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    info!("starting restlite server");
    info!("database: {}", config.db_path);

    let connect_options = SqliteConnectOptions::from_str(&config.db_path)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.db_pool_size)
        .connect_with(connect_options)
        .await?;

    info!("connected to database");

    let schema = SchemaCacheRef::new();
    schema.load(&pool).await?;
    info!("{}", schema.get().await.summary());

    let store = PolicyStore::new(&pool);
    store.ensure_schema().await?;
    info!("row-level security catalog ready");

    let state = AppState {
        pool,
        schema,
        config: config.clone(),
        jwt_config: JwtConfig {
            secret: config.jwt_secret.clone(),
            secret_is_base64: config.jwt_secret_is_base64,
            audience: config.jwt_aud.clone(),
            role_claim_key: config.jwt_role_claim_key.clone(),
            anon_role: Some(config.db_anon_role.clone()),
        },
    };

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/{table}", any(handle_request))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                    Method::HEAD,
                ])
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
