//! Type-safe SQL builder and AST compiler for restlite.
//!
//! Provides a safe way to construct SQL queries without string
//! concatenation, using parameterized queries to prevent SQL injection, and
//! the intermediate representation (`ast`) shared by the URL parser, the
//! RLS enforcer, and the compiler (`compile`).

pub mod ast;
mod builder;
pub mod compile;
mod delete;
pub mod embed;
mod expr;
pub mod identifier;
mod insert;
mod param;
pub mod schema;
mod select;
mod update;

pub use builder::{SqlBuilder, SqlFragment};
pub use compile::{compile, compile_count, compile_where, CompileError};
pub use delete::DeleteBuilder;
pub use expr::{Expr, OrderExpr};
pub use identifier::{escape_ident, from_qi, quote_literal, QualifiedIdentifier};
pub use insert::InsertBuilder;
pub use param::SqlParam;
pub use schema::{ColumnInfo, ForeignKey, RelationshipError, SchemaView, TableInfo};
pub use select::SelectBuilder;
pub use update::UpdateBuilder;

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        compile, compile_where, escape_ident, from_qi, quote_literal, CompileError, DeleteBuilder,
        Expr, InsertBuilder, OrderExpr, QualifiedIdentifier, SchemaView, SelectBuilder,
        SqlBuilder, SqlFragment, SqlParam, UpdateBuilder,
    };
    pub use crate::ast::*;
}
