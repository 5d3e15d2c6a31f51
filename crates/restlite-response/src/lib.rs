//! Response shaping for restlite: the JSON body envelope, cardinality
//! (array vs. singular object), `Content-Range`, and the error envelope.
//! Transport-agnostic — `restlite-server` converts a `Response` into an axum
//! response.

mod json;
mod headers;

pub use headers::ContentRange;
pub use json::{format_json_response, format_singular_json};

use http::{HeaderMap, HeaderValue, StatusCode};
use restlite_core::service::ServiceResult;
use restlite_core::Error;
use restlite_sql::ast::Cardinality;

/// A formatted HTTP response, independent of any particular web framework.
#[derive(Clone, Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: bytes::Bytes,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<bytes::Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, bytes::Bytes::new())
    }

    pub fn set_header(&mut self, name: &'static str, value: &str) {
        if let Ok(v) = HeaderValue::from_str(value) {
            self.headers.insert(http::header::HeaderName::from_static(name), v);
        }
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        self.set_header("content-type", content_type);
    }

    pub fn set_content_range(&mut self, range: &ContentRange) {
        self.set_header("content-range", &range.to_string());
    }

    pub fn set_location(&mut self, location: &str) {
        self.set_header("location", location);
    }
}

/// Format a service result as a response body, shaping it per `cardinality`
/// and attaching `Content-Range` when the result carries a count.
pub fn format_response(
    result: &ServiceResult,
    cardinality: Cardinality,
    status: StatusCode,
) -> Result<Response, FormatError> {
    let body = match cardinality {
        Cardinality::Many => format_json_response(&result.rows)?,
        Cardinality::One | Cardinality::MaybeOne => format_singular_json(&result.rows)?,
    };

    let mut response = Response::new(status, body);
    response.set_content_type("application/json; charset=utf-8");

    if matches!(cardinality, Cardinality::Many) {
        let range = ContentRange::from_page(
            result.range.offset,
            result.rows.len() as i64,
            result.total_count,
        );
        response.set_content_range(&range);
    }

    Ok(response)
}

/// Build the JSON error envelope response for a request that failed.
pub fn error_response(error: &Error) -> Response {
    let body = serde_json::to_vec(&error.to_json()).unwrap_or_default();
    let mut response = Response::new(error.status_code(), body);
    response.set_content_type("application/json; charset=utf-8");
    response
}

/// Response formatting error.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("multiple rows returned for a singular response")]
    MultipleRows,
}

impl FormatError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MultipleRows => StatusCode::NOT_ACCEPTABLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restlite_sql::ast::RangeSpec;
    use serde_json::json;

    fn result(rows: Vec<serde_json::Value>, total: Option<i64>) -> ServiceResult {
        ServiceResult {
            rows,
            total_count: total,
            range: RangeSpec { offset: 0, limit: None },
        }
    }

    #[test]
    fn test_format_response_many() {
        let r = result(vec![json!({"id": 1}), json!({"id": 2})], Some(2));
        let response = format_response(&r, Cardinality::Many, StatusCode::OK).unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.headers.get("content-range").unwrap().to_str().unwrap(),
            "0-1/2"
        );
    }

    #[test]
    fn test_format_response_one() {
        let r = result(vec![json!({"id": 1})], None);
        let response = format_response(&r, Cardinality::One, StatusCode::OK).unwrap();
        assert!(response.headers.get("content-range").is_none());
        let parsed: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(parsed["id"], 1);
    }

    #[test]
    fn test_format_response_maybe_one_empty() {
        let r = result(vec![], None);
        let response = format_response(&r, Cardinality::MaybeOne, StatusCode::OK).unwrap();
        assert_eq!(&response.body[..], b"null");
    }

    #[test]
    fn test_error_response_sets_status_and_envelope() {
        let err = Error::NotFound("widgets".into());
        let response = error_response(&err);
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let parsed: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(parsed["code"], "not_found");
    }
}
