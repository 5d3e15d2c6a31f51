//! The RLS AST enforcer: folds applicable policies into a `QueryAST`'s
//! filter tree, and runs the post-mutation WITH-CHECK pass for INSERT and
//! UPDATE.

use restlite_sql::ast::{FilterValue, LogicOp, Operator, QueryAST, WhereNode};
use restlite_sql::{compile_where, escape_ident, SqlParam};
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::context::RequestContext;
use crate::policy::{Command, Policy};
use crate::store::{PolicyStore, StoreError};

#[derive(thiserror::Error, Debug)]
pub enum EnforceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to compile policy expression: {0}")]
    Compile(String),
}

/// `true` for the sentinel node `enforce` installs when RLS is enabled but
/// no policy grants access.
fn is_deny_all(node: &WhereNode) -> bool {
    matches!(
        node,
        WhereNode::Filter { column, op: Operator::Eq, value: FilterValue::Int(1), negated: true }
            if column == "__deny_all__"
    )
}

/// Substitute `auth.uid()` and `auth.role()` with quoted literals before the
/// expression reaches the expression parser, per the enforcer's contract.
fn substitute_auth(expr: &str, ctx: &RequestContext) -> String {
    let uid_literal = match &ctx.uid {
        Some(uid) => format!("'{}'", uid.replace('\'', "''")),
        None => "NULL".to_string(),
    };
    let role_literal = format!("'{}'", ctx.role.replace('\'', "''"));

    expr.replace("auth.uid()", &uid_literal).replace("auth.role()", &role_literal)
}

/// Build the combined policy predicate for `table`/`command`/`ctx`, selecting
/// each policy's relevant expression text via `select`.
///
/// Returns `None` when RLS isn't enabled on `table` (no restriction at all).
/// Returns `Some(deny_all)` when RLS is enabled but no policy's expression
/// survives (no applicable policy, or every applicable expression failed to
/// parse). Otherwise returns the OR-combination of the surviving nodes.
async fn build_policy_node(
    store: &PolicyStore<'_>,
    table: &str,
    command: Command,
    ctx: &RequestContext,
    select: impl Fn(&Policy) -> Option<String>,
) -> Result<Option<WhereNode>, EnforceError> {
    if !store.is_enabled(table).await? {
        return Ok(None);
    }

    let policies = store.policies_for(table, command, &ctx.role).await?;
    if policies.is_empty() {
        return Ok(Some(WhereNode::deny_all()));
    }

    let mut nodes = Vec::new();
    for policy in &policies {
        let Some(expr) = select(policy) else { continue };
        let substituted = substitute_auth(&expr, ctx);
        match crate::expr_parser::parse(&substituted) {
            Ok(node) => nodes.push(node),
            Err(err) => warn!(policy = %policy.name, table, %err, "skipping unparsable RLS policy expression"),
        }
    }

    Ok(Some(match nodes.len() {
        0 => WhereNode::deny_all(),
        1 => nodes.into_iter().next().unwrap(),
        _ => WhereNode::Logical { op: LogicOp::Or, children: nodes },
    }))
}

/// `enforceOnAST`: AND the combined policy predicate for `command` into
/// `ast.filter`. Returns `ast` unchanged when RLS isn't enabled on its table.
pub async fn enforce(
    store: &PolicyStore<'_>,
    mut ast: QueryAST,
    command: Command,
    ctx: &RequestContext,
) -> Result<QueryAST, EnforceError> {
    let node = build_policy_node(store, &ast.table, command, ctx, |p| p.expression_for(command)).await?;
    if let Some(node) = node {
        ast.filter = Some(WhereNode::and_into(ast.filter.take(), node));
    }
    Ok(ast)
}

fn sql_param_to_json(param: &SqlParam) -> JsonValue {
    match param {
        SqlParam::Null => JsonValue::Null,
        SqlParam::Bool(b) => JsonValue::Bool(*b),
        SqlParam::Int(i) => JsonValue::Number((*i).into()),
        SqlParam::Float(f) => serde_json::Number::from_f64(*f).map(JsonValue::Number).unwrap_or(JsonValue::Null),
        SqlParam::Text(s) => JsonValue::String(s.clone()),
        SqlParam::Bytes(b) => JsonValue::String(String::from_utf8_lossy(b).into_owned()),
        SqlParam::Json(v) => v.clone(),
    }
}

/// Post-mutation WITH-CHECK pass for INSERT/UPDATE (§4.5). `affected_ids`
/// are the primary key values of the rows the mutation touched, assuming a
/// single-column primary key. Rows failing the check are deleted and
/// excluded from the surviving id list.
pub async fn apply_with_check(
    store: &PolicyStore<'_>,
    table: &str,
    pk_column: &str,
    affected_ids: Vec<JsonValue>,
    command: Command,
    ctx: &RequestContext,
) -> Result<Vec<JsonValue>, EnforceError> {
    if affected_ids.is_empty() {
        return Ok(affected_ids);
    }

    let node = build_policy_node(store, table, command, ctx, |p| p.with_check.clone()).await?;

    let Some(node) = node else {
        return Ok(affected_ids);
    };

    if is_deny_all(&node) {
        delete_ids(store, table, pk_column, &affected_ids).await?;
        return Ok(Vec::new());
    }

    let frag = compile_where(&node).map_err(|e| EnforceError::Compile(e.to_string()))?;
    let mut passed = Vec::new();
    let mut failed = Vec::new();

    for id in affected_ids {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ? AND ({})",
            escape_ident(table),
            escape_ident(pk_column),
            frag.sql()
        );
        let mut params = vec![id.clone()];
        params.extend(frag.params().iter().map(sql_param_to_json));

        if store.execute_query(&sql, &params).await?.is_some() {
            passed.push(id);
        } else {
            failed.push(id);
        }
    }

    if !failed.is_empty() {
        delete_ids(store, table, pk_column, &failed).await?;
    }

    Ok(passed)
}

async fn delete_ids(
    store: &PolicyStore<'_>,
    table: &str,
    pk_column: &str,
    ids: &[JsonValue],
) -> Result<(), EnforceError> {
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "DELETE FROM {} WHERE {} IN ({})",
        escape_ident(table),
        escape_ident(pk_column),
        placeholders
    );
    store.execute_modification(&sql, ids).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_auth_with_uid() {
        let ctx = RequestContext::new("authenticated", Some("u-1".into()));
        let out = substitute_auth("owner_id = auth.uid()", &ctx);
        assert_eq!(out, "owner_id = 'u-1'");
    }

    #[test]
    fn test_substitute_auth_escapes_quotes() {
        let ctx = RequestContext::new("authenticated", Some("o'brien".into()));
        let out = substitute_auth("owner_id = auth.uid()", &ctx);
        assert_eq!(out, "owner_id = 'o''brien'");
    }

    #[test]
    fn test_substitute_auth_no_uid_is_null() {
        let ctx = RequestContext::anonymous("anon");
        let out = substitute_auth("owner_id = auth.uid()", &ctx);
        assert_eq!(out, "owner_id = NULL");
    }

    #[test]
    fn test_substitute_auth_role() {
        let ctx = RequestContext::anonymous("anon");
        let out = substitute_auth("auth.role() = 'anon'", &ctx);
        assert_eq!(out, "'anon' = 'anon'");
    }

    #[test]
    fn test_is_deny_all() {
        assert!(is_deny_all(&WhereNode::deny_all()));
        assert!(!is_deny_all(&WhereNode::Filter {
            column: "id".into(),
            op: Operator::Eq,
            value: FilterValue::Int(1),
            negated: false,
        }));
    }
}
