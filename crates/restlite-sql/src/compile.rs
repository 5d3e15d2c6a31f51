//! The compiler: `QueryAST` (already RLS-enforced) + schema catalog -> SQL.

use crate::ast::{
    ActionKind, ColumnItem, ConflictResolution, FilterValue, LogicOp, Operator, OrderTerm,
    QueryAST, WhereNode,
};
use crate::builder::SqlFragment;
use crate::delete::DeleteBuilder;
use crate::embed::compile_embed_subquery;
use crate::identifier::{escape_ident, QualifiedIdentifier};
use crate::insert::InsertBuilder;
use crate::param::SqlParam;
use crate::schema::{RelationshipError, SchemaView};
use crate::select::SelectBuilder;
use crate::update::UpdateBuilder;

#[derive(Debug)]
pub enum CompileError {
    UnknownTable(String),
    UnknownColumn { table: String, column: String },
    Relationship(RelationshipError),
    EmptyBody,
    WildcardWithAggregate,
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTable(t) => write!(f, "unknown table '{}'", t),
            Self::UnknownColumn { table, column } => {
                write!(f, "unknown column '{}' on table '{}'", column, table)
            }
            Self::Relationship(e) => write!(f, "{:?}", e),
            Self::EmptyBody => write!(f, "mutation request has no body rows"),
            Self::WildcardWithAggregate => {
                write!(f, "cannot select '*' alongside an aggregate function")
            }
        }
    }
}

impl std::error::Error for CompileError {}

fn filter_value_to_param(v: &FilterValue) -> SqlParam {
    match v {
        FilterValue::Null => SqlParam::Null,
        FilterValue::Bool(b) => SqlParam::Bool(*b),
        FilterValue::Int(i) => SqlParam::Int(*i),
        FilterValue::Float(f) => SqlParam::Float(*f),
        FilterValue::Text(s) => SqlParam::Text(s.clone()),
    }
}

/// Compile a filter tree into a parenthesized boolean SQL expression.
pub fn compile_where(node: &WhereNode) -> Result<SqlFragment, CompileError> {
    Ok(match node {
        WhereNode::Filter { column, op, value, negated } => {
            let mut frag = SqlFragment::new();
            frag.push(&escape_ident(column));
            if *negated {
                frag.push(" NOT");
            }
            frag.push(" ");
            frag.push(operator_sql(*op));
            frag.push(" ");
            frag.push_param(filter_value_to_param(value));
            frag
        }
        WhereNode::Is { column, value, negated } => {
            let mut frag = SqlFragment::new();
            frag.push(&escape_ident(column));
            frag.push(" IS ");
            if *negated {
                frag.push("NOT ");
            }
            frag.push(match value {
                crate::ast::IsValue::Null => "NULL",
                crate::ast::IsValue::True => "1",
                crate::ast::IsValue::False => "0",
            });
            frag
        }
        WhereNode::In { column, values, negated } => {
            if values.is_empty() {
                return Ok(SqlFragment::raw(if *negated { "1" } else { "0" }));
            }
            let mut frag = SqlFragment::new();
            frag.push(&escape_ident(column));
            if *negated {
                frag.push(" NOT");
            }
            frag.push(" IN (");
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    frag.push(", ");
                }
                frag.push_param(filter_value_to_param(v));
            }
            frag.push(")");
            frag
        }
        WhereNode::Logical { op, children } => {
            let sep = match op {
                LogicOp::And => " AND ",
                LogicOp::Or => " OR ",
            };
            let compiled: Result<Vec<_>, _> = children.iter().map(compile_where).collect();
            let mut combined = SqlFragment::join(sep, compiled?.into_iter().map(|f| f.parens()));
            if combined.is_empty() {
                combined = SqlFragment::raw("1");
            }
            combined
        }
    })
}

fn operator_sql(op: Operator) -> &'static str {
    match op {
        Operator::Eq => "=",
        Operator::Neq => "<>",
        Operator::Gt => ">",
        Operator::Gte => ">=",
        Operator::Lt => "<",
        Operator::Lte => "<=",
        Operator::Like => "LIKE",
        Operator::ILike => "LIKE",
    }
}

fn compile_order_term(term: &OrderTerm) -> SqlFragment {
    let mut frag = SqlFragment::new();
    frag.push(&escape_ident(&term.column));
    frag.push(match term.direction {
        crate::ast::OrderDirection::Asc => " ASC",
        crate::ast::OrderDirection::Desc => " DESC",
    });
    if let Some(nulls) = term.nulls {
        frag.push(match nulls {
            crate::ast::NullsOrder::First => " NULLS FIRST",
            crate::ast::NullsOrder::Last => " NULLS LAST",
        });
    }
    frag
}

/// Render one `select=` entry as a top-level SELECT list item.
pub fn compile_select_column(
    table: &str,
    item: &ColumnItem,
    schema: &dyn SchemaView,
) -> Result<SqlFragment, CompileError> {
    Ok(match item {
        ColumnItem::Wildcard => SqlFragment::raw(format!("{}.*", escape_ident(table))),
        ColumnItem::Simple { name, alias } => {
            let mut frag = SqlFragment::raw(escape_ident(name));
            if let Some(alias) = alias {
                frag.push(" AS ");
                frag.push(&escape_ident(alias));
            }
            frag
        }
        ColumnItem::Aggregate { func, column, alias } => {
            let mut frag = SqlFragment::new();
            frag.push(func.to_sql());
            frag.push("(");
            frag.push(&escape_ident(column));
            frag.push(")");
            frag.push(" AS ");
            match alias {
                Some(alias) => frag.push(&escape_ident(alias)),
                None => frag.push(&escape_ident(&func.to_sql().to_lowercase())),
            }
            frag
        }
        ColumnItem::Embedded(spec) => {
            let alias = spec.alias.clone().unwrap_or_else(|| spec.table.clone());
            let mut frag = compile_embed_subquery(table, spec, schema)?;
            frag.push(" AS ");
            frag.push(&escape_ident(&alias));
            frag
        }
    })
}

/// Whether a top-level select mixes aggregates with plain columns, which
/// requires inferring a `GROUP BY` over the plain columns (PostgREST's
/// auto-GROUP-BY behavior, carried over as-is).
fn infer_group_by(select: &[ColumnItem]) -> Vec<String> {
    let has_aggregate = select.iter().any(|c| matches!(c, ColumnItem::Aggregate { .. }));
    if !has_aggregate {
        return Vec::new();
    }
    select
        .iter()
        .filter_map(|c| match c {
            ColumnItem::Simple { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect()
}

pub fn compile_select(ast: &QueryAST, schema: &dyn SchemaView) -> Result<SqlFragment, CompileError> {
    schema.table(&ast.table).ok_or_else(|| CompileError::UnknownTable(ast.table.clone()))?;

    let has_aggregate = ast.select.iter().any(|c| matches!(c, ColumnItem::Aggregate { .. }));
    let has_wildcard = ast.select.iter().any(|c| matches!(c, ColumnItem::Wildcard));
    if has_aggregate && has_wildcard {
        return Err(CompileError::WildcardWithAggregate);
    }

    let qi = QualifiedIdentifier::unqualified(&ast.table);
    let mut builder = SelectBuilder::new().from_table_as(&qi, &ast.table);

    for item in &ast.select {
        builder = builder.column_raw(compile_select_column(&ast.table, item, schema)?);
    }

    if let Some(filter) = &ast.filter {
        builder = builder.where_raw(compile_where(filter)?);
    }

    for col in infer_group_by(&ast.select) {
        builder = builder.group_by(&col);
    }

    for term in &ast.order {
        builder = builder.order_by_raw(compile_order_term(term));
    }

    if let Some(limit) = ast.range.limit {
        builder = builder.limit(limit);
    }
    if ast.range.offset > 0 {
        builder = builder.offset(ast.range.offset);
    }

    Ok(builder.build())
}

pub fn compile_insert(ast: &QueryAST, schema: &dyn SchemaView) -> Result<SqlFragment, CompileError> {
    let table = schema.table(&ast.table).ok_or_else(|| CompileError::UnknownTable(ast.table.clone()))?;
    if ast.body.is_empty() {
        return Err(CompileError::EmptyBody);
    }

    let columns: Vec<String> = ast
        .body
        .first()
        .and_then(|row| row.as_object())
        .map(|obj| obj.keys().cloned().collect())
        .unwrap_or_default();

    for col in &columns {
        if !table.has_column(col) {
            return Err(CompileError::UnknownColumn { table: ast.table.clone(), column: col.clone() });
        }
    }

    let qi = QualifiedIdentifier::unqualified(&ast.table);
    let mut builder = InsertBuilder::new().into_table(&qi).columns(columns.clone());

    for row in &ast.body {
        let obj = row.as_object().ok_or(CompileError::EmptyBody)?;
        let values: Vec<SqlFragment> = columns
            .iter()
            .map(|c| {
                let val = obj.get(c).cloned().unwrap_or(serde_json::Value::Null);
                let mut frag = SqlFragment::new();
                frag.push_param(SqlParam::from_json_value(val));
                frag
            })
            .collect();
        builder = builder.values_raw(values);
    }

    if let Some((resolution, conflict_cols)) = &ast.on_conflict {
        builder = match resolution {
            ConflictResolution::IgnoreDuplicates => builder.on_conflict_do_nothing(),
            ConflictResolution::MergeDuplicates => {
                let set: Vec<(String, SqlFragment)> = columns
                    .iter()
                    .filter(|c| !conflict_cols.contains(c))
                    .map(|c| {
                        let mut frag = SqlFragment::new();
                        frag.push("excluded.");
                        frag.push(&escape_ident(c));
                        (c.clone(), frag)
                    })
                    .collect();
                builder.on_conflict_do_update(conflict_cols.clone(), set)
            }
        };
    }

    builder = builder.returning_all();
    Ok(builder.build())
}

pub fn compile_update(ast: &QueryAST, schema: &dyn SchemaView) -> Result<SqlFragment, CompileError> {
    let table = schema.table(&ast.table).ok_or_else(|| CompileError::UnknownTable(ast.table.clone()))?;
    let row = ast.body.first().ok_or(CompileError::EmptyBody)?;
    let obj = row.as_object().ok_or(CompileError::EmptyBody)?;

    let qi = QualifiedIdentifier::unqualified(&ast.table);
    let mut builder = UpdateBuilder::new().table(&qi);

    for (col, val) in obj {
        if !table.has_column(col) {
            return Err(CompileError::UnknownColumn { table: ast.table.clone(), column: col.clone() });
        }
        builder = builder.set(col, SqlParam::from_json_value(val.clone()));
    }

    if let Some(filter) = &ast.filter {
        builder = builder.where_raw(compile_where(filter)?);
    }

    builder = builder.returning_all();
    Ok(builder.build())
}

pub fn compile_delete(ast: &QueryAST, schema: &dyn SchemaView) -> Result<SqlFragment, CompileError> {
    schema.table(&ast.table).ok_or_else(|| CompileError::UnknownTable(ast.table.clone()))?;

    let qi = QualifiedIdentifier::unqualified(&ast.table);
    let mut builder = DeleteBuilder::new().from_table(&qi);

    if let Some(filter) = &ast.filter {
        builder = builder.where_raw(compile_where(filter)?);
    }

    builder = builder.returning_all();
    Ok(builder.build())
}

/// Compile a fully RLS-enforced `QueryAST` into a single parameterized
/// statement.
pub fn compile(ast: &QueryAST, schema: &dyn SchemaView) -> Result<SqlFragment, CompileError> {
    match ast.action {
        ActionKind::Select => compile_select(ast, schema),
        ActionKind::Insert => compile_insert(ast, schema),
        ActionKind::Update => compile_update(ast, schema),
        ActionKind::Delete => compile_delete(ast, schema),
    }
}

/// A second, `COUNT(*)`-only statement for `Prefer: count=exact`, sharing
/// the same WHERE clause as the main select.
pub fn compile_count(ast: &QueryAST, schema: &dyn SchemaView) -> Result<SqlFragment, CompileError> {
    schema.table(&ast.table).ok_or_else(|| CompileError::UnknownTable(ast.table.clone()))?;

    let qi = QualifiedIdentifier::unqualified(&ast.table);
    let mut builder = SelectBuilder::new()
        .column_raw(SqlFragment::raw("COUNT(*)"))
        .from_table(&qi);

    if let Some(filter) = &ast.filter {
        builder = builder.where_raw(compile_where(filter)?);
    }

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;
    use crate::schema::{ColumnInfo, ForeignKey, TableInfo};

    struct FakeSchema {
        tables: Vec<TableInfo>,
        fks: Vec<ForeignKey>,
    }

    impl SchemaView for FakeSchema {
        fn table(&self, name: &str) -> Option<&TableInfo> {
            self.tables.iter().find(|t| t.name == name)
        }
        fn foreign_keys_for(&self, table: &str) -> Vec<&ForeignKey> {
            self.fks.iter().filter(|fk| fk.from_table == table || fk.to_table == table).collect()
        }
    }

    fn fixture() -> FakeSchema {
        FakeSchema {
            tables: vec![TableInfo {
                name: "items".into(),
                columns: vec![
                    ColumnInfo { name: "id".into(), nullable: false, is_pk: true },
                    ColumnInfo { name: "qty".into(), nullable: true, is_pk: false },
                    ColumnInfo { name: "status".into(), nullable: true, is_pk: false },
                ],
                pk_columns: vec!["id".into()],
            }],
            fks: vec![],
        }
    }

    #[test]
    fn compile_where_filter_renders_operator_and_param() {
        let node = WhereNode::Filter {
            column: "qty".into(),
            op: Operator::Gte,
            value: FilterValue::Int(5),
            negated: false,
        };
        let frag = compile_where(&node).unwrap();
        assert_eq!(frag.sql(), "\"qty\" >= ?");
        assert_eq!(frag.params().len(), 1);
    }

    #[test]
    fn compile_where_logical_parenthesizes_children() {
        let node = WhereNode::Logical {
            op: LogicOp::Or,
            children: vec![
                WhereNode::Filter { column: "a".into(), op: Operator::Eq, value: FilterValue::Int(1), negated: false },
                WhereNode::Filter { column: "b".into(), op: Operator::Eq, value: FilterValue::Int(2), negated: false },
            ],
        };
        let frag = compile_where(&node).unwrap();
        assert_eq!(frag.sql(), "(\"a\" = ?) OR (\"b\" = ?)");
    }

    #[test]
    fn select_infers_group_by_when_aggregates_mixed_with_plain_columns() {
        let schema = fixture();
        let mut ast = QueryAST::new_select("items");
        ast.select = vec![
            ColumnItem::Simple { name: "status".into(), alias: None },
            ColumnItem::Aggregate { func: AggregateFunction::Count, column: "id".into(), alias: Some("n".into()) },
        ];
        let frag = compile_select(&ast, &schema).unwrap();
        assert!(frag.sql().contains("GROUP BY \"status\""));
    }

    #[test]
    fn aggregate_without_alias_defaults_to_bare_function_name() {
        let schema = fixture();
        let mut ast = QueryAST::new_select("items");
        ast.select = vec![ColumnItem::Aggregate {
            func: AggregateFunction::Sum,
            column: "qty".into(),
            alias: None,
        }];
        let frag = compile_select(&ast, &schema).unwrap();
        assert!(frag.sql().contains("AS \"sum\""));
    }

    #[test]
    fn select_rejects_wildcard_mixed_with_aggregate() {
        let schema = fixture();
        let mut ast = QueryAST::new_select("items");
        ast.select = vec![
            ColumnItem::Wildcard,
            ColumnItem::Aggregate { func: AggregateFunction::Count, column: "id".into(), alias: None },
        ];
        let err = compile_select(&ast, &schema).unwrap_err();
        assert!(matches!(err, CompileError::WildcardWithAggregate));
    }

    #[test]
    fn insert_rejects_unknown_column() {
        let schema = fixture();
        let mut ast = QueryAST::new_select("items");
        ast.action = ActionKind::Insert;
        ast.body = vec![serde_json::json!({"nope": 1})];
        let err = compile_insert(&ast, &schema).unwrap_err();
        assert!(matches!(err, CompileError::UnknownColumn { .. }));
    }

    #[test]
    fn insert_binds_one_param_per_row_value() {
        let schema = fixture();
        let mut ast = QueryAST::new_select("items");
        ast.action = ActionKind::Insert;
        ast.body = vec![serde_json::json!({"qty": 3, "status": "open"})];
        let frag = compile_insert(&ast, &schema).unwrap();
        assert_eq!(frag.params().len(), 2);
        assert!(frag.sql().contains("RETURNING"));
    }
}
