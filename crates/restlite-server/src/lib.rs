//! HTTP transport for restlite: an axum server wiring request parsing,
//! authentication, and the query service into `/{table}` routes.

pub mod app;
pub mod state;

pub use app::{handle_health, handle_request};
pub use state::AppState;
