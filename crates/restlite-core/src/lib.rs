//! restlite-core - the request pipeline for restlite, a PostgREST-compatible
//! REST query surface over SQLite with row-level security.
//!
//! # Architecture
//!
//! The request processing pipeline:
//!
//! 1. **URL Query Parser** (`parser`) - parse a PostgREST-shaped URL into a `QueryAST`
//! 2. **Schema Catalog** (`schema`) - SQLite metadata for validation, via `restlite_sql::SchemaView`
//! 3. **RLS Enforcer** (`restlite_rls`) - fold applicable policies into the AST's filter tree
//! 4. **SQL Compiler** (`restlite_sql`) - compile the enforced AST into a parameterized statement
//! 5. **Query Service** (`service`) - orchestrates the above and shapes the result
//!
//! # Example
//!
//! ```ignore
//! use restlite_core::{QueryService, SchemaCacheRef};
//!
//! let schema = SchemaCacheRef::new();
//! schema.load(&pool).await?;
//! let service = QueryService::new(pool, schema);
//! let result = service.select("posts", "select=id,title&published=eq.true", Cardinality::Many, false, &ctx).await?;
//! ```

pub mod config;
pub mod error;
pub mod parser;
pub mod schema;
pub mod service;

pub use config::{AppConfig, LogLevel};
pub use error::{DatabaseError, Error, Result};
pub use parser::{parse_request, range_from_header};
pub use schema::{is_hidden, SchemaCache, SchemaCacheRef, HIDDEN_TABLE_PREFIX};
pub use service::{QueryService, ServiceResult};

/// Prelude for common imports.
pub mod prelude {
    pub use super::config::AppConfig;
    pub use super::error::{Error, Result};
    pub use super::parser::parse_request;
    pub use super::schema::{SchemaCache, SchemaCacheRef};
    pub use super::service::{QueryService, ServiceResult};
    pub use restlite_sql::ast::{Cardinality, QueryAST};
}
