//! SQL parameter values bound to `?` placeholders.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A single bound value for a `?` placeholder.
///
/// SQLite's type system is dynamic (a column can hold any storage class
/// regardless of its declared type), so this enum only needs to cover the
/// storage classes SQLite actually has plus a `Json` variant for values
/// that are serialized to TEXT via `json()` on the way in and parsed back
/// out on the way out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
}

impl SqlParam {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn int(n: i64) -> Self {
        Self::Int(n)
    }

    pub fn json(v: JsonValue) -> Self {
        Self::Json(v)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert from a decoded JSON scalar, as produced by the URL parser
    /// and by request-body field values. Objects and arrays are kept as
    /// `Json` and serialized to TEXT when bound.
    pub fn from_json_value(v: JsonValue) -> Self {
        match v {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => Self::Text(s),
            other => Self::Json(other),
        }
    }

    /// A short name for diagnostics; SQLite itself infers storage class.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "real",
            Self::Text(_) => "text",
            Self::Bytes(_) => "blob",
            Self::Json(_) => "json",
        }
    }
}

impl From<String> for SqlParam {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for SqlParam {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<i32> for SqlParam {
    fn from(n: i32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<i64> for SqlParam {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for SqlParam {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for SqlParam {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<JsonValue> for SqlParam {
    fn from(v: JsonValue) -> Self {
        Self::from_json_value(v)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_param_types() {
        assert_eq!(SqlParam::text("hello").type_name(), "text");
        assert_eq!(SqlParam::int(42).type_name(), "integer");
        assert_eq!(SqlParam::Bool(true).type_name(), "boolean");
        assert_eq!(SqlParam::Null.type_name(), "null");
    }

    #[test]
    fn test_sql_param_from() {
        let p: SqlParam = "hello".into();
        assert!(matches!(p, SqlParam::Text(s) if s == "hello"));

        let p: SqlParam = 42i64.into();
        assert!(matches!(p, SqlParam::Int(42)));

        let p: SqlParam = None::<String>.into();
        assert!(p.is_null());
    }

    #[test]
    fn test_from_json_value_numbers() {
        let p = SqlParam::from_json_value(serde_json::json!(42));
        assert!(matches!(p, SqlParam::Int(42)));

        let p = SqlParam::from_json_value(serde_json::json!(4.5));
        assert!(matches!(p, SqlParam::Float(f) if (f - 4.5).abs() < f64::EPSILON));
    }

    #[test]
    fn test_from_json_value_compound() {
        let p = SqlParam::from_json_value(serde_json::json!({"a": 1}));
        assert!(matches!(p, SqlParam::Json(_)));
    }
}
