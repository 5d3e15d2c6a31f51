//! The query intermediate representation shared by the URL parser, the RLS
//! enforcer, and the compiler.
//!
//! A single `QueryAST` is built once per request (by `restlite_core::parser`
//! from the URL, or for the RLS WITH CHECK path from a policy expression via
//! `restlite_rls::expr_parser`) and is then mutated in place by the RLS
//! enforcer before the compiler ever sees it. Living in this crate, rather
//! than in `restlite-core`, keeps both the enforcer and the compiler free to
//! depend on it without a cycle between `restlite-core` and `restlite-rls`.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Comparison and pattern operators available to a filter.
///
/// Full-text search, array containment/overlap, range types, regex
/// matching, and `IS DISTINCT FROM` are explicitly out of scope and have no
/// variant here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
}

impl Operator {
    pub fn from_alias(alias: &str) -> Option<Self> {
        Some(match alias {
            "eq" => Self::Eq,
            "neq" => Self::Neq,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "like" => Self::Like,
            "ilike" => Self::ILike,
            _ => return None,
        })
    }

    pub fn as_alias(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Like => "like",
            Self::ILike => "ilike",
        }
    }
}

/// The right-hand side of an `IS` comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsValue {
    Null,
    True,
    False,
}

/// A scalar filter value, already decoded from its URL or JSON representation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FilterValue {
    pub fn from_json(v: &JsonValue) -> Self {
        match v {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .unwrap_or_else(|| Self::Float(n.as_f64().unwrap_or(0.0))),
            JsonValue::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicOp {
    And,
    Or,
}

/// A node in the boolean filter tree.
///
/// `select=...&id=eq.1&and=(a.gt.1,b.lt.2)` parses to a `Logical` whose
/// children mix top-level `Filter`s (conjoined implicitly) with nested
/// `Logical` groups. RLS policies are ANDed or ORed into this same tree
/// rather than spliced into the SQL string, so a policy can never escape
/// its intended scope through string concatenation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WhereNode {
    Filter {
        column: String,
        op: Operator,
        value: FilterValue,
        negated: bool,
    },
    Is {
        column: String,
        value: IsValue,
        negated: bool,
    },
    In {
        column: String,
        values: Vec<FilterValue>,
        negated: bool,
    },
    Logical {
        op: LogicOp,
        children: Vec<WhereNode>,
    },
}

impl WhereNode {
    pub fn and(self, other: WhereNode) -> WhereNode {
        WhereNode::Logical {
            op: LogicOp::And,
            children: vec![self, other],
        }
    }

    pub fn or(self, other: WhereNode) -> WhereNode {
        WhereNode::Logical {
            op: LogicOp::Or,
            children: vec![self, other],
        }
    }

    /// AND this node onto an optional existing tree, producing a new tree.
    pub fn and_into(existing: Option<WhereNode>, addition: WhereNode) -> WhereNode {
        match existing {
            Some(node) => node.and(addition),
            None => addition,
        }
    }

    /// The always-false node used as the RLS deny-all sentinel.
    pub fn deny_all() -> WhereNode {
        WhereNode::Filter {
            column: "__deny_all__".into(),
            op: Operator::Eq,
            value: FilterValue::Int(1),
            negated: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderTerm {
    pub column: String,
    pub direction: OrderDirection,
    pub nulls: Option<NullsOrder>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn from_alias(s: &str) -> Option<Self> {
        Some(match s {
            "count" => Self::Count,
            "sum" => Self::Sum,
            "avg" => Self::Avg,
            "min" => Self::Min,
            "max" => Self::Max,
            _ => return None,
        })
    }

    pub fn to_sql(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

/// How a one-to-many embed should be nested in the JSON output: an array of
/// objects, or a single object for the to-one side of a relationship.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbedCardinality {
    Many,
    One,
}

/// A nested resource embed (`select=*,posts(*)` or
/// `select=*,author:profiles!author_id(*)`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbedSpec {
    pub alias: Option<String>,
    pub table: String,
    /// Disambiguating FK hint (`table!fk_column`), when more than one FK
    /// connects the parent and child tables.
    pub hint: Option<String>,
    pub cardinality: EmbedCardinality,
    pub select: Vec<ColumnItem>,
    pub filter: Option<WhereNode>,
    pub order: Vec<OrderTerm>,
    pub range: Option<RangeSpec>,
}

/// A single entry in a `select=` list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ColumnItem {
    Wildcard,
    Simple {
        name: String,
        alias: Option<String>,
    },
    Aggregate {
        func: AggregateFunction,
        column: String,
        alias: Option<String>,
    },
    Embedded(EmbedSpec),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RangeSpec {
    pub offset: i64,
    pub limit: Option<i64>,
}

impl RangeSpec {
    /// Build a range from the `Range: <unit>=<first>-<last>` header form.
    pub fn from_bounds(first: i64, last: Option<i64>) -> Self {
        let offset = first.max(0);
        let limit = last.map(|l| (l - first + 1).max(0));
        Self { offset, limit }
    }
}

/// How a mutation's affected rows should be returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    Many,
    One,
    MaybeOne,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictResolution {
    IgnoreDuplicates,
    MergeDuplicates,
}

/// The fully parsed, not-yet-compiled representation of one request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryAST {
    pub table: String,
    pub action: ActionKind,
    pub select: Vec<ColumnItem>,
    pub filter: Option<WhereNode>,
    pub order: Vec<OrderTerm>,
    pub range: RangeSpec,
    pub cardinality: Cardinality,
    /// Decoded JSON request body rows, for INSERT/UPDATE.
    pub body: Vec<JsonValue>,
    pub on_conflict: Option<(ConflictResolution, Vec<String>)>,
    pub columns: Option<Vec<String>>,
}

impl QueryAST {
    pub fn new_select(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            action: ActionKind::Select,
            select: vec![ColumnItem::Wildcard],
            filter: None,
            order: Vec::new(),
            range: RangeSpec::default(),
            cardinality: Cardinality::Many,
            body: Vec::new(),
            on_conflict: None,
            columns: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_alias_roundtrip() {
        for alias in ["eq", "neq", "gt", "gte", "lt", "lte", "like", "ilike"] {
            let op = Operator::from_alias(alias).unwrap();
            assert_eq!(op.as_alias(), alias);
        }
        assert!(Operator::from_alias("fts").is_none());
    }

    #[test]
    fn range_from_bounds() {
        let r = RangeSpec::from_bounds(0, Some(9));
        assert_eq!(r.offset, 0);
        assert_eq!(r.limit, Some(10));

        let r = RangeSpec::from_bounds(5, None);
        assert_eq!(r.offset, 5);
        assert_eq!(r.limit, None);
    }

    #[test]
    fn and_into_builds_conjunction_only_when_needed() {
        let f = WhereNode::Filter {
            column: "id".into(),
            op: Operator::Eq,
            value: FilterValue::Int(1),
            negated: false,
        };
        assert_eq!(WhereNode::and_into(None, f.clone()), f);

        let combined = WhereNode::and_into(Some(f.clone()), f.clone());
        match combined {
            WhereNode::Logical { op: LogicOp::And, children } => assert_eq!(children.len(), 2),
            _ => panic!("expected a conjunction"),
        }
    }

    #[test]
    fn deny_all_is_always_false() {
        let node = WhereNode::deny_all();
        assert!(matches!(node, WhereNode::Filter { negated: true, .. }));
    }
}
