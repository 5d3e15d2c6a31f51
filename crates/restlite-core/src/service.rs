//! The Query Service (§4.7): a thin orchestrator wiring the URL parser, the
//! RLS enforcer, the SQL compiler, and execution together. Transport-agnostic
//! — `restlite-server` adapts HTTP requests into calls here and shapes the
//! `ServiceResult` into an HTTP response.

use restlite_rls::{apply_with_check, enforce, Command as RlsCommand, PolicyStore, RequestContext};
use restlite_sql::ast::{ActionKind, Cardinality, ColumnItem, QueryAST, RangeSpec};
use restlite_sql::{compile, compile_count, SqlFragment, SqlParam};
use serde_json::{Map as JsonMap, Value as JsonValue};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo};
use tracing::debug;

use crate::error::{DatabaseError, Error, Result};
use crate::schema::SchemaCacheRef;

/// The result of one service call, already cardinality-shaped.
#[derive(Debug, Clone, Default)]
pub struct ServiceResult {
    pub rows: Vec<JsonValue>,
    pub total_count: Option<i64>,
    pub range: RangeSpec,
}

pub struct QueryService {
    pool: SqlitePool,
    schema: SchemaCacheRef,
}

impl QueryService {
    pub fn new(pool: SqlitePool, schema: SchemaCacheRef) -> Self {
        Self { pool, schema }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn schema(&self) -> &SchemaCacheRef {
        &self.schema
    }

    /// `select(url, ctx)`: Parser -> Enforcer(SELECT) -> Compiler -> execute
    /// -> shape response per cardinality.
    pub async fn select(
        &self,
        table: &str,
        query: &str,
        cardinality: Cardinality,
        count_exact: bool,
        ctx: &RequestContext,
    ) -> Result<ServiceResult> {
        self.check_visible(table).await?;

        let ast = crate::parser::parse_request(table, query, cardinality)?;
        let store = PolicyStore::new(&self.pool);
        let ast = enforce(&store, ast, RlsCommand::Select, ctx).await?;

        let cache = self.schema.get().await;
        let frag = compile(&ast, &*cache)?;
        let count_frag = if count_exact { Some(compile_count(&ast, &*cache)?) } else { None };
        drop(cache);

        let json_columns = embedded_column_names(&ast.select);
        let rows = self.fetch_all(&frag, &json_columns).await?;
        let rows = shape_cardinality(rows, cardinality)?;

        let total_count = match count_frag {
            Some(frag) => Some(self.fetch_scalar_count(&frag).await?),
            None => None,
        };

        Ok(ServiceResult { rows, total_count, range: ast.range })
    }

    /// `insert(table, payload, ctx)`: build an INSERT directly, execute, run
    /// the WITH-CHECK pass using the INSERT policies.
    pub async fn insert(&self, table: &str, body: Vec<JsonValue>, ctx: &RequestContext) -> Result<ServiceResult> {
        self.check_visible(table).await?;

        let mut ast = QueryAST::new_select(table);
        ast.action = ActionKind::Insert;
        ast.body = body;

        let cache = self.schema.get().await;
        let frag = compile(&ast, &*cache)?;
        let pk_column = cache.require_table(table)?.pk_columns.first().cloned();
        drop(cache);

        let rows = self.fetch_all(&frag, &[]).await?;
        let rows = self.with_check_pass(table, rows, pk_column, RlsCommand::Insert, ctx).await?;

        Ok(ServiceResult { rows, total_count: None, range: RangeSpec::default() })
    }

    /// `update(url, patch, ctx)`: Parser (filters) -> Enforcer(UPDATE) ->
    /// compile -> execute -> WITH-CHECK pass.
    pub async fn update(
        &self,
        table: &str,
        query: &str,
        patch: JsonValue,
        ctx: &RequestContext,
    ) -> Result<ServiceResult> {
        self.check_visible(table).await?;

        let mut ast = crate::parser::parse_request(table, query, Cardinality::Many)?;
        ast.action = ActionKind::Update;
        ast.body = vec![patch];

        let store = PolicyStore::new(&self.pool);
        let ast = enforce(&store, ast, RlsCommand::Update, ctx).await?;

        let cache = self.schema.get().await;
        let frag = compile(&ast, &*cache)?;
        let pk_column = cache.require_table(table)?.pk_columns.first().cloned();
        drop(cache);

        let rows = self.fetch_all(&frag, &[]).await?;
        let rows = self.with_check_pass(table, rows, pk_column, RlsCommand::Update, ctx).await?;

        Ok(ServiceResult { rows, total_count: None, range: ast.range })
    }

    /// `delete(url, ctx)`: Parser (filters) -> Enforcer(DELETE) -> compile ->
    /// execute. No post-mutation WITH-CHECK: the enforced filter already
    /// constrained which rows could be deleted.
    pub async fn delete(&self, table: &str, query: &str, ctx: &RequestContext) -> Result<ServiceResult> {
        self.check_visible(table).await?;

        let mut ast = crate::parser::parse_request(table, query, Cardinality::Many)?;
        ast.action = ActionKind::Delete;

        let store = PolicyStore::new(&self.pool);
        let ast = enforce(&store, ast, RlsCommand::Delete, ctx).await?;

        let cache = self.schema.get().await;
        let frag = compile(&ast, &*cache)?;
        drop(cache);

        let rows = self.fetch_all(&frag, &[]).await?;
        Ok(ServiceResult { rows, total_count: None, range: ast.range })
    }

    async fn check_visible(&self, table: &str) -> Result<()> {
        let cache = self.schema.get().await;
        cache.require_table(table)?;
        Ok(())
    }

    async fn with_check_pass(
        &self,
        table: &str,
        rows: Vec<JsonValue>,
        pk_column: Option<String>,
        command: RlsCommand,
        ctx: &RequestContext,
    ) -> Result<Vec<JsonValue>> {
        let Some(pk_column) = pk_column else {
            debug!(table, "no primary key; skipping WITH-CHECK pass");
            return Ok(rows);
        };

        let ids: Vec<JsonValue> = rows
            .iter()
            .filter_map(|r| r.as_object().and_then(|o| o.get(&pk_column)).cloned())
            .collect();

        if ids.is_empty() {
            return Ok(rows);
        }

        let store = PolicyStore::new(&self.pool);
        let surviving = apply_with_check(&store, table, &pk_column, ids, command, ctx).await?;
        let surviving: std::collections::HashSet<String> =
            surviving.iter().map(|v| v.to_string()).collect();

        Ok(rows
            .into_iter()
            .filter(|r| {
                r.as_object()
                    .and_then(|o| o.get(&pk_column))
                    .map(|v| surviving.contains(&v.to_string()))
                    .unwrap_or(false)
            })
            .collect())
    }

    async fn fetch_all(&self, frag: &SqlFragment, json_columns: &[String]) -> Result<Vec<JsonValue>> {
        let mut query = sqlx::query(frag.sql());
        for param in frag.params() {
            query = bind_param(query, param);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(|e| Error::Execution(DatabaseError::from_sqlx(&e)))?;
        Ok(rows.iter().map(|row| row_to_json(row, json_columns)).collect())
    }

    async fn fetch_scalar_count(&self, frag: &SqlFragment) -> Result<i64> {
        let mut query = sqlx::query(frag.sql());
        for param in frag.params() {
            query = bind_param(query, param);
        }

        let row = query.fetch_one(&self.pool).await.map_err(|e| Error::Execution(DatabaseError::from_sqlx(&e)))?;
        Ok(row.try_get::<i64, _>(0).unwrap_or(0))
    }
}

/// Top-level `select=` aliases that are embedded resources, whose SQLite
/// column value is a JSON-text subquery result rather than a scalar.
fn embedded_column_names(items: &[ColumnItem]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| match item {
            ColumnItem::Embedded(embed) => Some(embed.alias.clone().unwrap_or_else(|| embed.table.clone())),
            _ => None,
        })
        .collect()
}

fn shape_cardinality(rows: Vec<JsonValue>, cardinality: Cardinality) -> Result<Vec<JsonValue>> {
    match cardinality {
        Cardinality::Many => Ok(rows),
        Cardinality::One => {
            if rows.len() == 1 {
                Ok(rows)
            } else {
                Err(Error::NotFound("expected exactly one row".into()))
            }
        }
        Cardinality::MaybeOne => {
            if rows.len() <= 1 {
                Ok(rows)
            } else {
                Err(Error::Validation("expected at most one row".into()))
            }
        }
    }
}

fn bind_param<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    param: &'q SqlParam,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match param {
        SqlParam::Null => query.bind(None::<i64>),
        SqlParam::Bool(b) => query.bind(*b),
        SqlParam::Int(i) => query.bind(*i),
        SqlParam::Float(f) => query.bind(*f),
        SqlParam::Text(s) => query.bind(s.as_str()),
        SqlParam::Bytes(b) => query.bind(b.as_slice()),
        SqlParam::Json(v) => query.bind(v.to_string()),
    }
}

/// Decode a SQLite row into a JSON object, using SQLite's dynamic column
/// typing. Columns named in `json_columns` hold pre-serialized JSON text
/// produced by an embed subquery and are parsed rather than kept as strings.
fn row_to_json(row: &SqliteRow, json_columns: &[String]) -> JsonValue {
    let mut map = JsonMap::new();

    for column in row.columns() {
        let name = column.name();
        if json_columns.iter().any(|c| c == name) {
            let text: Option<String> = row.try_get(name).ok();
            let value = text
                .as_deref()
                .and_then(|t| serde_json::from_str(t).ok())
                .unwrap_or(JsonValue::Null);
            map.insert(name.to_string(), value);
            continue;
        }

        let value = match column.type_info().name() {
            "INTEGER" | "BIGINT" | "INT" => {
                row.try_get::<i64, _>(name).ok().map(|v| JsonValue::Number(v.into()))
            }
            "REAL" | "FLOAT" | "DOUBLE" => row
                .try_get::<f64, _>(name)
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(JsonValue::Number),
            "BOOLEAN" | "BOOL" => row.try_get::<bool, _>(name).ok().map(JsonValue::Bool),
            "NULL" => Some(JsonValue::Null),
            _ => row.try_get::<String, _>(name).ok().map(JsonValue::String),
        };

        map.insert(name.to_string(), value.unwrap_or(JsonValue::Null));
    }

    JsonValue::Object(map)
}
