//! RLS policy store, backed by two hidden tables in the host database:
//! `_rls_enabled` (one row per table with RLS turned on) and
//! `_rls_policies` (one row per policy). Both are created on first use and
//! are never addressable through the REST surface (any table starting with
//! `_` is rejected at the service boundary).

use serde_json::Value as JsonValue;
use sqlx::{Row, SqlitePool};

use crate::policy::{Command, Policy, PolicyRole};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Row-level security policy catalog.
pub struct PolicyStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PolicyStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the catalog tables if they don't already exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS _rls_enabled (table_name TEXT PRIMARY KEY)",
        )
        .execute(self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS _rls_policies (
                name TEXT NOT NULL,
                table_name TEXT NOT NULL,
                command TEXT NOT NULL,
                role TEXT NOT NULL,
                using_expr TEXT,
                with_check_expr TEXT,
                PRIMARY KEY (table_name, name)
            )",
        )
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn enable_rls(&self, table: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO _rls_enabled (table_name) VALUES (?1)")
            .bind(table)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn disable_rls(&self, table: &str) -> Result<()> {
        sqlx::query("DELETE FROM _rls_enabled WHERE table_name = ?1")
            .bind(table)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn is_enabled(&self, table: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM _rls_enabled WHERE table_name = ?1")
            .bind(table)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn create_policy(&self, policy: &Policy) -> Result<()> {
        let command_str = command_to_str(policy.command);
        let role_str = role_to_str(&policy.role);

        sqlx::query(
            "INSERT OR REPLACE INTO _rls_policies
                (name, table_name, command, role, using_expr, with_check_expr)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&policy.name)
        .bind(&policy.table)
        .bind(command_str)
        .bind(role_str)
        .bind(&policy.using)
        .bind(&policy.with_check)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn drop_policy(&self, table: &str, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM _rls_policies WHERE table_name = ?1 AND name = ?2")
            .bind(table)
            .bind(name)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Policies whose role matches exactly or `PUBLIC`, and whose command
    /// matches exactly or `ALL` — filtered in Rust rather than SQL since the
    /// matching rule isn't expressible as a simple equality.
    pub async fn policies_for(&self, table: &str, command: Command, role: &str) -> Result<Vec<Policy>> {
        let rows = sqlx::query(
            "SELECT name, table_name, command, role, using_expr, with_check_expr
             FROM _rls_policies WHERE table_name = ?1",
        )
        .bind(table)
        .fetch_all(self.pool)
        .await?;

        let all: Vec<Policy> = rows
            .iter()
            .filter_map(|row| {
                let command = Command::from_ddl(&row.get::<String, _>("command"))?;
                Some(Policy {
                    name: row.get("name"),
                    table: row.get("table_name"),
                    command,
                    role: PolicyRole::from_ddl(&row.get::<String, _>("role")),
                    using: row.get("using_expr"),
                    with_check: row.get("with_check_expr"),
                })
            })
            .collect();

        Ok(all.into_iter().filter(|p| p.applies_to(command, role)).collect())
    }

    /// Passthrough used by the WITH-CHECK loop: fetch a single scalar row.
    pub async fn execute_query(&self, sql: &str, params: &[JsonValue]) -> Result<Option<i64>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_json(query, param);
        }
        let row = query.fetch_optional(self.pool).await?;
        Ok(row.map(|r| r.get::<i64, _>(0)))
    }

    /// Passthrough used by the WITH-CHECK loop's compensating delete.
    pub async fn execute_modification(&self, sql: &str, params: &[JsonValue]) -> Result<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_json(query, param);
        }
        let result = query.execute(self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn command_to_str(command: Command) -> &'static str {
    match command {
        Command::Select => "SELECT",
        Command::Insert => "INSERT",
        Command::Update => "UPDATE",
        Command::Delete => "DELETE",
        Command::All => "ALL",
    }
}

fn role_to_str(role: &PolicyRole) -> String {
    match role {
        PolicyRole::Public => "PUBLIC".to_string(),
        PolicyRole::Named(name) => name.clone(),
    }
}

fn bind_json<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: &'q JsonValue,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        JsonValue::Null => query.bind(None::<i64>),
        JsonValue::Bool(b) => query.bind(*b),
        JsonValue::Number(n) if n.is_i64() => query.bind(n.as_i64()),
        JsonValue::Number(n) => query.bind(n.as_f64()),
        JsonValue::String(s) => query.bind(s.as_str()),
        other => query.bind(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_roundtrip() {
        for c in [Command::Select, Command::Insert, Command::Update, Command::Delete, Command::All] {
            assert_eq!(Command::from_ddl(command_to_str(c)), Some(c));
        }
    }

    #[test]
    fn test_role_roundtrip() {
        assert_eq!(role_to_str(&PolicyRole::Public), "PUBLIC");
        assert_eq!(role_to_str(&PolicyRole::Named("anon".into())), "anon");
    }
}
