//! Application state.

use restlite_auth::JwtConfig;
use restlite_core::{AppConfig, SchemaCacheRef};
use sqlx::SqlitePool;

/// Shared application state, cloned cheaply into each request handler.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: SqlitePool,
    /// Cached schema metadata, reloadable after DDL.
    pub schema: SchemaCacheRef,
    /// Application configuration.
    pub config: AppConfig,
    /// JWT configuration.
    pub jwt_config: JwtConfig,
}

impl AppState {
    /// Reload the schema cache from the database.
    pub async fn reload_schema(&self) -> restlite_core::Result<()> {
        self.schema.load(&self.pool).await
    }
}
