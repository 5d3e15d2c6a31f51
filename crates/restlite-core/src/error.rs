//! Error types for restlite.
//!
//! Provides the error taxonomy and its mapping to HTTP status codes and the
//! JSON error envelope returned to clients.

use http::StatusCode;
use thiserror::Error;

/// Result type for restlite operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for restlite.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Parse errors (400)
    // ========================================================================
    #[error("parse error: {detail}")]
    Parse {
        detail: String,
        hint: Option<String>,
        position: Option<usize>,
    },

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    // ========================================================================
    // Validation errors (422)
    // ========================================================================
    #[error("validation error: {0}")]
    Validation(String),

    // ========================================================================
    // Compilation errors (400)
    // ========================================================================
    #[error("compilation error: {0}")]
    Compilation(#[from] restlite_sql::CompileError),

    // ========================================================================
    // Auth errors (401)
    // ========================================================================
    #[error("authentication error: {0}")]
    Auth(String),

    // ========================================================================
    // Resource errors (404)
    // ========================================================================
    #[error("not found: {0}")]
    NotFound(String),

    // ========================================================================
    // Method errors (405)
    // ========================================================================
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    // ========================================================================
    // Execution errors (500/409 depending on the underlying SQLite code)
    // ========================================================================
    #[error("execution error: {0}")]
    Execution(#[from] DatabaseError),

    // ========================================================================
    // Schema cache errors (500)
    // ========================================================================
    #[error("schema cache not loaded")]
    SchemaCacheNotLoaded,

    #[error("schema cache load failed: {0}")]
    SchemaCacheLoadFailed(String),

    // ========================================================================
    // Internal errors (500)
    // ========================================================================
    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Parse { .. } | Self::UnsupportedFeature(_) | Self::Compilation(_) => {
                StatusCode::BAD_REQUEST
            }

            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,

            Self::Auth(_) => StatusCode::UNAUTHORIZED,

            Self::NotFound(_) => StatusCode::NOT_FOUND,

            Self::UnsupportedMethod(_) => StatusCode::METHOD_NOT_ALLOWED,

            Self::Execution(db_err) => db_err.status_code(),

            Self::SchemaCacheNotLoaded
            | Self::SchemaCacheLoadFailed(_)
            | Self::Internal(_)
            | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse_error",
            Self::UnsupportedFeature(_) => "unsupported_feature",
            Self::Validation(_) => "validation_error",
            Self::Compilation(_) => "compilation_error",
            Self::Auth(_) => "auth_error",
            Self::NotFound(_) => "not_found",
            Self::UnsupportedMethod(_) => "unsupported_method",
            Self::Execution(db_err) => db_err.code(),
            Self::SchemaCacheNotLoaded | Self::SchemaCacheLoadFailed(_) => "schema_cache_error",
            Self::Internal(_) => "internal_error",
            Self::Config(_) => "config_error",
        }
    }

    /// Convert to the JSON error envelope.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
            "details": self.details(),
            "hint": self.hint(),
        })
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::Execution(db_err) => db_err.details.clone(),
            _ => None,
        }
    }

    fn hint(&self) -> Option<String> {
        match self {
            Self::Parse { hint, .. } => hint.clone(),
            Self::Auth(_) => Some("provide a valid bearer token in the Authorization header".into()),
            Self::NotFound(_) => Some("check the table name".into()),
            Self::Execution(db_err) => db_err.hint.clone(),
            _ => None,
        }
    }
}

impl From<restlite_rls::EnforceError> for Error {
    fn from(err: restlite_rls::EnforceError) -> Self {
        match err {
            restlite_rls::EnforceError::Store(restlite_rls::StoreError::Database(e)) => {
                Error::Execution(DatabaseError::from_sqlx(&e))
            }
            restlite_rls::EnforceError::Compile(msg) => Error::Internal(msg),
        }
    }
}

/// Database-specific error, carrying the SQLite primary result code.
#[derive(Error, Debug)]
#[error("database error [{code}]: {message}")]
pub struct DatabaseError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub hint: Option<String>,
    pub constraint: Option<String>,
    pub table: Option<String>,
}

impl DatabaseError {
    /// Build from a `sqlx::Error`, extracting SQLite's primary result code
    /// when the error came from the database driver.
    pub fn from_sqlx(err: &sqlx::Error) -> Self {
        match err.as_database_error() {
            Some(db_err) => Self {
                code: db_err.code().map(|c| c.to_string()).unwrap_or_default(),
                message: db_err.message().to_string(),
                details: None,
                hint: None,
                constraint: db_err.constraint().map(|c| c.to_string()),
                table: db_err.table().map(|t| t.to_string()),
            },
            None => Self {
                code: String::new(),
                message: err.to_string(),
                details: None,
                hint: None,
                constraint: None,
                table: None,
            },
        }
    }

    /// Map the SQLite primary result code to an HTTP status.
    ///
    /// https://www.sqlite.org/rescode.html
    pub fn status_code(&self) -> StatusCode {
        match self.code.as_str() {
            "19" => StatusCode::CONFLICT, // SQLITE_CONSTRAINT
            "1" => StatusCode::BAD_REQUEST, // SQLITE_ERROR (syntax, unknown column, ...)
            "5" | "6" => StatusCode::SERVICE_UNAVAILABLE, // SQLITE_BUSY / SQLITE_LOCKED
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self.code.as_str() {
            "19" => "constraint_violation",
            "1" => "sql_error",
            "5" | "6" => "database_busy",
            _ => "execution_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            Error::Validation("bad range".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(Error::Auth("missing token".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::NotFound("users".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::UnsupportedMethod("TRACE".into()).status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Validation("x".into()).code(), "validation_error");
        assert_eq!(Error::Auth("x".into()).code(), "auth_error");
        assert_eq!(Error::NotFound("users".into()).code(), "not_found");
    }

    #[test]
    fn test_database_error_status() {
        let constraint_error = DatabaseError {
            code: "19".into(),
            message: "UNIQUE constraint failed: users.email".into(),
            details: None,
            hint: None,
            constraint: Some("users.email".into()),
            table: Some("users".into()),
        };
        assert_eq!(constraint_error.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_error_to_json() {
        let error = Error::Validation("bad filter".into());
        let json = error.to_json();
        assert_eq!(json["code"], "validation_error");
        assert!(json["message"].as_str().unwrap().contains("bad filter"));
    }
}
