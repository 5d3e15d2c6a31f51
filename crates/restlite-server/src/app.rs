//! Request handling: turns an axum request into a `QueryService` call and
//! shapes the result back into an HTTP response.

use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use restlite_auth::authenticate;
use restlite_core::Error;
use restlite_response::{error_response, format_response, Response as ServiceResponse};
use restlite_sql::ast::Cardinality;
use serde_json::Value as JsonValue;

/// Main request handler for `/{table}`.
pub async fn handle_request(
    State(state): State<AppState>,
    Path(table): Path<String>,
    request: axum::extract::Request,
) -> Response {
    let method = request.method().clone();
    let headers = request.headers().clone();
    let query = request.uri().query().unwrap_or("").to_string();

    tracing::debug!(%method, %table, "handling request");

    match process_request(&state, &table, &method, &query, &headers, request).await {
        Ok(response) => build_response(response),
        Err(e) => build_response(error_response(&e)),
    }
}

/// `GET /health`: schema-cache liveness probe.
pub async fn handle_health(State(state): State<AppState>) -> Response {
    let cache = state.schema.get().await;
    let body = serde_json::json!({
        "status": "ok",
        "schema": cache.summary(),
    });
    (StatusCode::OK, axum::Json(body)).into_response()
}

async fn process_request(
    state: &AppState,
    table: &str,
    method: &Method,
    query: &str,
    headers: &HeaderMap,
    request: axum::extract::Request,
) -> Result<ServiceResponse, Error> {
    let auth_header = headers.get("authorization").and_then(|v| v.to_str().ok());
    let auth = authenticate(auth_header, &state.jwt_config)
        .map_err(|e| Error::Auth(e.to_string()))?;
    let ctx = auth.into_context();

    let cardinality = cardinality_from_accept(headers.get(http::header::ACCEPT).and_then(|v| v.to_str().ok()));
    let prefer = headers.get("prefer").and_then(|v| v.to_str().ok()).unwrap_or("");
    let count_exact = prefer.contains("count=exact");
    let minimal = prefer.contains("return=minimal");

    let service = restlite_core::QueryService::new(state.pool.clone(), state.schema.clone());

    let (status, result) = match *method {
        Method::GET | Method::HEAD => {
            let result = service.select(table, query, cardinality, count_exact, &ctx).await?;
            (StatusCode::OK, result)
        }
        Method::POST => {
            let body = read_json_body(request).await?;
            let rows = match body {
                JsonValue::Array(items) => items,
                other => vec![other],
            };
            let result = service.insert(table, rows, &ctx).await?;
            (StatusCode::CREATED, result)
        }
        Method::PATCH => {
            let body = read_json_body(request).await?;
            let result = service.update(table, query, body, &ctx).await?;
            (StatusCode::OK, result)
        }
        Method::DELETE => {
            let result = service.delete(table, query, &ctx).await?;
            (StatusCode::OK, result)
        }
        other => return Err(Error::UnsupportedMethod(other.to_string())),
    };

    if minimal {
        return Ok(ServiceResponse::empty(no_content_status(status, method)));
    }

    format_response(&result, cardinality, status).map_err(|e| Error::Internal(e.to_string()))
}

/// `Prefer: return=minimal` drops the body; DELETE/PATCH/POST all fall back
/// to 204, GET has no minimal variant so its status is left untouched.
fn no_content_status(status: StatusCode, method: &Method) -> StatusCode {
    match *method {
        Method::GET | Method::HEAD => status,
        _ => StatusCode::NO_CONTENT,
    }
}

async fn read_json_body(request: axum::extract::Request) -> Result<JsonValue, Error> {
    let body = request.into_body();
    let bytes = axum::body::to_bytes(body, 10 * 1024 * 1024)
        .await
        .map_err(|e| Error::Validation(format!("failed to read request body: {e}")))?;

    if bytes.is_empty() {
        return Ok(JsonValue::Null);
    }

    serde_json::from_slice(&bytes).map_err(|e| Error::Parse {
        detail: format!("invalid JSON body: {e}"),
        hint: None,
        position: None,
    })
}

/// `Accept: application/vnd.pgrst.object+json[;nulls=null]` requests a
/// singular response, nullable when `nulls=null` is present.
fn cardinality_from_accept(accept: Option<&str>) -> Cardinality {
    match accept {
        Some(value) if value.contains("vnd.pgrst.object") && value.contains("nulls=null") => {
            Cardinality::MaybeOne
        }
        Some(value) if value.contains("vnd.pgrst.object") => Cardinality::One,
        _ => Cardinality::Many,
    }
}

fn build_response(response: ServiceResponse) -> Response {
    let mut builder = Response::builder().status(response.status);

    for (key, value) in response.headers.iter() {
        builder = builder.header(key, value);
    }

    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}
