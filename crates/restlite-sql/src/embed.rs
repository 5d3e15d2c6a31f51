//! Correlated-subquery JSON aggregation for embedded resources.
//!
//! Postgres can embed a related resource with a `LEFT JOIN LATERAL` that
//! returns a single `json_build_object`/`json_agg` column. SQLite has no
//! `LATERAL`, so each embed instead becomes a scalar correlated subquery in
//! the parent's SELECT list, built from `json_object()` for the row shape
//! and `json_group_array()` to collect a one-to-many embed into an array.

use crate::ast::{AggregateFunction, ColumnItem, EmbedCardinality, EmbedSpec};
use crate::builder::SqlFragment;
use crate::compile::{compile_where, CompileError};
use crate::identifier::escape_ident;
use crate::schema::{ForeignKey, SchemaView};

fn json_key_literal(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

fn json_pair_for_item(
    parent_as: &str,
    item: &ColumnItem,
    schema: &dyn SchemaView,
) -> Result<SqlFragment, CompileError> {
    Ok(match item {
        ColumnItem::Wildcard => {
            // Expanded by the caller before reaching here.
            SqlFragment::new()
        }
        ColumnItem::Simple { name, alias } => {
            let mut frag = SqlFragment::raw(json_key_literal(alias.as_deref().unwrap_or(name)));
            frag.push(", ");
            frag.push(&escape_ident(name));
            frag
        }
        ColumnItem::Aggregate { func, column, alias } => {
            let key = alias.clone().unwrap_or_else(|| column.clone());
            let mut frag = SqlFragment::raw(json_key_literal(&key));
            frag.push(", ");
            frag.push(AggregateFunction::to_sql(*func));
            frag.push("(");
            frag.push(&escape_ident(column));
            frag.push(")");
            frag
        }
        ColumnItem::Embedded(nested) => {
            let key = nested.alias.clone().unwrap_or_else(|| nested.table.clone());
            let mut frag = SqlFragment::raw(json_key_literal(&key));
            frag.push(", ");
            frag.append(compile_embed_subquery(parent_as, nested, schema)?);
            frag
        }
    })
}

/// Build the `(select ...)` correlated subquery for one embed. The caller
/// is responsible for aliasing it (`... AS alias`) when it's a top-level
/// select item, or using it bare as a `json_object()` value when nested.
pub fn compile_embed_subquery(
    parent_table: &str,
    embed: &EmbedSpec,
    schema: &dyn SchemaView,
) -> Result<SqlFragment, CompileError> {
    let (fk, parent_is_referencing) = schema
        .find_relationship(parent_table, &embed.table, embed.hint.as_deref())
        .map_err(CompileError::Relationship)?;

    let select_items: Vec<ColumnItem> = if embed.select.iter().any(|c| matches!(c, ColumnItem::Wildcard)) {
        let table = schema
            .table(&embed.table)
            .ok_or_else(|| CompileError::UnknownTable(embed.table.clone()))?;
        table
            .columns
            .iter()
            .map(|c| ColumnItem::Simple { name: c.name.clone(), alias: None })
            .collect()
    } else {
        embed.select.clone()
    };

    let child_alias = format!("__embed_{}", embed.alias.clone().unwrap_or_else(|| embed.table.clone()));

    let mut json_fields = SqlFragment::new();
    for (i, item) in select_items.iter().enumerate() {
        if i > 0 {
            json_fields.push(", ");
        }
        json_fields.append(json_pair_for_item(&child_alias, item, schema)?);
    }

    let mut subquery = SqlFragment::new();
    let many = embed.cardinality == EmbedCardinality::Many;
    subquery.push(if many {
        "SELECT json_group_array(json_object("
    } else {
        "SELECT json_object("
    });
    subquery.append(json_fields);
    subquery.push(if many { ")) FROM " } else { ") FROM " });
    subquery.push(&escape_ident(&embed.table));
    subquery.push(" AS ");
    subquery.push(&escape_ident(&child_alias));
    subquery.push(" WHERE ");
    subquery.append(join_condition(parent_table, &child_alias, fk, parent_is_referencing));

    if let Some(filter) = &embed.filter {
        subquery.push(" AND ");
        subquery.append(compile_where(filter)?);
    }

    if many {
        if !embed.order.is_empty() {
            subquery.push(" ORDER BY ");
            for (i, term) in embed.order.iter().enumerate() {
                if i > 0 {
                    subquery.push(", ");
                }
                subquery.push(&escape_ident(&term.column));
                subquery.push(match term.direction {
                    crate::ast::OrderDirection::Asc => " ASC",
                    crate::ast::OrderDirection::Desc => " DESC",
                });
            }
        }
        if let Some(range) = &embed.range {
            if let Some(limit) = range.limit {
                subquery.push(&format!(" LIMIT {}", limit));
            }
            if range.offset > 0 {
                subquery.push(&format!(" OFFSET {}", range.offset));
            }
        }
    }

    let mut result = SqlFragment::new();
    if many {
        result.push("COALESCE((");
        result.append(subquery);
        result.push("), '[]')");
    } else {
        result.push("(");
        result.append(subquery);
        result.push(")");
    }
    Ok(result)
}

/// The FK join predicate correlating the child subquery to the parent row,
/// regardless of which side of the relationship the parent sits on.
fn join_condition(
    parent_table: &str,
    child_alias: &str,
    fk: &ForeignKey,
    parent_is_referencing: bool,
) -> SqlFragment {
    let mut frag = SqlFragment::new();
    let (child_cols, parent_cols) = if parent_is_referencing {
        (&fk.to_columns, &fk.from_columns)
    } else {
        (&fk.from_columns, &fk.to_columns)
    };
    for (i, (cc, pc)) in child_cols.iter().zip(parent_cols.iter()).enumerate() {
        if i > 0 {
            frag.push(" AND ");
        }
        frag.push(&escape_ident(child_alias));
        frag.push(".");
        frag.push(&escape_ident(cc));
        frag.push(" = ");
        frag.push(&escape_ident(parent_table));
        frag.push(".");
        frag.push(&escape_ident(pc));
    }
    frag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::EmbedCardinality;
    use crate::schema::{ColumnInfo, TableInfo};

    struct FakeSchema {
        tables: Vec<TableInfo>,
        fks: Vec<ForeignKey>,
    }

    impl SchemaView for FakeSchema {
        fn table(&self, name: &str) -> Option<&TableInfo> {
            self.tables.iter().find(|t| t.name == name)
        }
        fn foreign_keys_for(&self, table: &str) -> Vec<&ForeignKey> {
            self.fks
                .iter()
                .filter(|fk| fk.from_table == table || fk.to_table == table)
                .collect()
        }
    }

    fn fixture() -> FakeSchema {
        FakeSchema {
            tables: vec![
                TableInfo {
                    name: "posts".into(),
                    columns: vec![
                        ColumnInfo { name: "id".into(), nullable: false, is_pk: true },
                        ColumnInfo { name: "author_id".into(), nullable: true, is_pk: false },
                    ],
                    pk_columns: vec!["id".into()],
                },
                TableInfo {
                    name: "authors".into(),
                    columns: vec![
                        ColumnInfo { name: "id".into(), nullable: false, is_pk: true },
                        ColumnInfo { name: "name".into(), nullable: true, is_pk: false },
                    ],
                    pk_columns: vec!["id".into()],
                },
            ],
            fks: vec![ForeignKey {
                constraint_name: "posts_author_id_fkey".into(),
                from_table: "posts".into(),
                from_columns: vec!["author_id".into()],
                to_table: "authors".into(),
                to_columns: vec!["id".into()],
            }],
        }
    }

    #[test]
    fn embed_many_to_one_uses_json_object_not_array() {
        let schema = fixture();
        let embed = EmbedSpec {
            alias: None,
            table: "authors".into(),
            hint: None,
            cardinality: EmbedCardinality::One,
            select: vec![ColumnItem::Simple { name: "name".into(), alias: None }],
            filter: None,
            order: vec![],
            range: None,
        };
        let frag = compile_embed_subquery("posts", &embed, &schema).unwrap();
        assert!(frag.sql().contains("json_object("));
        assert!(!frag.sql().contains("json_group_array"));
        assert!(frag.sql().contains("\"__embed_authors\".\"id\" = \"posts\".\"author_id\""));
    }

    #[test]
    fn embed_one_to_many_uses_json_group_array() {
        let schema = fixture();
        let embed = EmbedSpec {
            alias: Some("posts".into()),
            table: "posts".into(),
            hint: None,
            cardinality: EmbedCardinality::Many,
            select: vec![ColumnItem::Wildcard],
            filter: None,
            order: vec![],
            range: None,
        };
        let frag = compile_embed_subquery("authors", &embed, &schema).unwrap();
        assert!(frag.sql().contains("json_group_array"));
        assert!(frag.sql().contains("\"__embed_posts\".\"author_id\" = \"authors\".\"id\""));
    }

    #[test]
    fn embed_many_wraps_in_coalesce_so_no_children_yields_empty_array() {
        let schema = fixture();
        let embed = EmbedSpec {
            alias: Some("posts".into()),
            table: "posts".into(),
            hint: None,
            cardinality: EmbedCardinality::Many,
            select: vec![ColumnItem::Wildcard],
            filter: None,
            order: vec![],
            range: None,
        };
        let frag = compile_embed_subquery("authors", &embed, &schema).unwrap();
        assert!(frag.sql().starts_with("COALESCE((SELECT json_group_array("));
        assert!(frag.sql().ends_with("), '[]')"));
    }

    #[test]
    fn embed_one_is_not_wrapped_in_coalesce() {
        let schema = fixture();
        let embed = EmbedSpec {
            alias: None,
            table: "authors".into(),
            hint: None,
            cardinality: EmbedCardinality::One,
            select: vec![ColumnItem::Simple { name: "name".into(), alias: None }],
            filter: None,
            order: vec![],
            range: None,
        };
        let frag = compile_embed_subquery("posts", &embed, &schema).unwrap();
        assert!(!frag.sql().contains("COALESCE"));
    }
}
