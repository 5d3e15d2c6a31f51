//! JSON response body formatting.

use super::FormatError;
use bytes::Bytes;
use serde_json::Value;

/// Format rows as a JSON array.
pub fn format_json_response(rows: &[Value]) -> Result<Bytes, FormatError> {
    let json = serde_json::to_vec(rows)?;
    Ok(Bytes::from(json))
}

/// Format a cardinality-`one`/`maybeOne` result as a single JSON object
/// (or `null` for a `maybeOne` miss).
pub fn format_singular_json(rows: &[Value]) -> Result<Bytes, FormatError> {
    match rows.len() {
        0 => Ok(Bytes::from_static(b"null")),
        1 => Ok(Bytes::from(serde_json::to_vec(&rows[0])?)),
        _ => Err(FormatError::MultipleRows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_json_response() {
        let rows = vec![json!({"id": 1, "name": "Alice"}), json!({"id": 2, "name": "Bob"})];

        let result = format_json_response(&rows).unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&result).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["name"], "Alice");
    }

    #[test]
    fn test_format_empty_array() {
        let rows: Vec<Value> = vec![];
        let result = format_json_response(&rows).unwrap();
        assert_eq!(&result[..], b"[]");
    }

    #[test]
    fn test_format_singular_json_one_row() {
        let rows = vec![json!({"id": 1})];
        let result = format_singular_json(&rows).unwrap();
        let parsed: Value = serde_json::from_slice(&result).unwrap();
        assert_eq!(parsed["id"], 1);
    }

    #[test]
    fn test_format_singular_json_no_rows() {
        let rows: Vec<Value> = vec![];
        let result = format_singular_json(&rows).unwrap();
        assert_eq!(&result[..], b"null");
    }

    #[test]
    fn test_format_singular_json_multiple_rows_errors() {
        let rows = vec![json!({"id": 1}), json!({"id": 2})];
        assert!(matches!(format_singular_json(&rows), Err(FormatError::MultipleRows)));
    }
}
