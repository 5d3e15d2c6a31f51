//! SQLite schema introspection and caching.
//!
//! Loads table/column/foreign-key metadata via SQLite's `pragma_table_info`
//! and `pragma_foreign_key_list` table-valued functions and implements
//! `restlite_sql::SchemaView` over the result, so the compiler and the
//! embedding resolver can validate filters and resolve relationships without
//! touching the database on every request.

use std::collections::HashMap;
use std::sync::Arc;

use restlite_sql::{ColumnInfo, ForeignKey, SchemaView, TableInfo};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::error::{Error, Result};

/// Prefix reserving table names for internal use (RLS policy catalog,
/// session storage); tables with this prefix are never addressable through
/// the REST surface.
pub const HIDDEN_TABLE_PREFIX: char = '_';

/// Cached SQLite schema metadata.
#[derive(Clone, Debug, Default)]
pub struct SchemaCache {
    tables: HashMap<String, TableInfo>,
    foreign_keys: Vec<ForeignKey>,
}

impl SchemaCache {
    /// Load (or reload) the schema cache from `sqlite_master` plus PRAGMA
    /// introspection for every user table.
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let table_names = load_table_names(pool).await?;
        info!("loading schema cache for {} tables", table_names.len());

        let mut tables = HashMap::new();
        let mut foreign_keys = Vec::new();

        for name in table_names {
            let columns = load_columns(pool, &name).await?;
            let pk_columns = columns.iter().filter(|c| c.is_pk).map(|c| c.name.clone()).collect();
            foreign_keys.extend(load_foreign_keys(pool, &name).await?);
            tables.insert(name.clone(), TableInfo { name, columns, pk_columns });
        }

        info!("loaded {} tables, {} foreign keys", tables.len(), foreign_keys.len());
        Ok(Self { tables, foreign_keys })
    }

    pub fn is_loaded(&self) -> bool {
        !self.tables.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "SchemaCache: {} tables, {} foreign keys",
            self.tables.len(),
            self.foreign_keys.len()
        )
    }

    /// Tables addressable through the REST surface (excludes hidden ones).
    pub fn public_tables(&self) -> impl Iterator<Item = &TableInfo> {
        self.tables.values().filter(|t| !is_hidden(&t.name))
    }

    pub fn require_table(&self, name: &str) -> Result<&TableInfo> {
        if is_hidden(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        self.tables.get(name).ok_or_else(|| Error::NotFound(name.to_string()))
    }
}

impl SchemaView for SchemaCache {
    fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    fn foreign_keys_for(&self, table: &str) -> Vec<&ForeignKey> {
        self.foreign_keys
            .iter()
            .filter(|fk| fk.from_table == table || fk.to_table == table)
            .collect()
    }
}

pub fn is_hidden(name: &str) -> bool {
    name.starts_with(HIDDEN_TABLE_PREFIX)
}

async fn load_table_names(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| Error::SchemaCacheLoadFailed(e.to_string()))?;

    Ok(rows.iter().map(|r| r.get::<String, _>("name")).collect())
}

async fn load_columns(pool: &SqlitePool, table: &str) -> Result<Vec<ColumnInfo>> {
    let sql = "SELECT name, \"notnull\", pk FROM pragma_table_info(?1)";
    let rows = sqlx::query(sql)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::SchemaCacheLoadFailed(e.to_string()))?;

    Ok(rows
        .iter()
        .map(|r| ColumnInfo {
            name: r.get::<String, _>("name"),
            nullable: r.get::<i64, _>("notnull") == 0,
            is_pk: r.get::<i64, _>("pk") > 0,
        })
        .collect())
}

async fn load_foreign_keys(pool: &SqlitePool, table: &str) -> Result<Vec<ForeignKey>> {
    let sql = "SELECT id, \"table\" AS to_table, \"from\", \"to\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq";
    let rows = sqlx::query(sql)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::SchemaCacheLoadFailed(e.to_string()))?;

    let mut grouped: HashMap<i64, (String, Vec<String>, Vec<String>)> = HashMap::new();
    for row in rows {
        let id: i64 = row.get("id");
        let to_table: String = row.get("to_table");
        let from_col: String = row.get("from");
        let to_col: String = row.get("to");
        let entry = grouped.entry(id).or_insert_with(|| (to_table, Vec::new(), Vec::new()));
        entry.1.push(from_col);
        entry.2.push(to_col);
    }

    Ok(grouped
        .into_iter()
        .map(|(id, (to_table, from_columns, to_columns))| ForeignKey {
            constraint_name: format!("{table}_fk{id}"),
            from_table: table.to_string(),
            from_columns,
            to_table,
            to_columns,
        })
        .collect())
}

/// Thread-safe schema cache handle, reloadable after DDL.
#[derive(Clone)]
pub struct SchemaCacheRef(Arc<tokio::sync::RwLock<SchemaCache>>);

impl SchemaCacheRef {
    pub fn new() -> Self {
        Self(Arc::new(tokio::sync::RwLock::new(SchemaCache::default())))
    }

    pub async fn load(&self, pool: &SqlitePool) -> Result<()> {
        let cache = SchemaCache::load(pool).await?;
        let mut guard = self.0.write().await;
        *guard = cache;
        Ok(())
    }

    pub async fn get(&self) -> tokio::sync::RwLockReadGuard<'_, SchemaCache> {
        self.0.read().await
    }

    pub async fn is_loaded(&self) -> bool {
        self.0.read().await.is_loaded()
    }
}

impl Default for SchemaCacheRef {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_hidden() {
        assert!(is_hidden("_rls_policies"));
        assert!(!is_hidden("users"));
    }

    #[test]
    fn test_schema_cache_summary_empty() {
        let cache = SchemaCache::default();
        assert!(!cache.is_loaded());
        assert_eq!(cache.summary(), "SchemaCache: 0 tables, 0 foreign keys");
    }
}
