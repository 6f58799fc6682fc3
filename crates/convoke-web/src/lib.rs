//! convoke-web — the HTTP surface of the convoke core.
//!
//! `POST /chat` for requests, `GET /logs/stream` for the SSE audit feed,
//! `GET /health` for breaker and store status, and `GET /tools`,
//! `/agents`, `/providers` for registry introspection.

pub mod api;
pub mod server;
pub mod sse;
pub mod state;

pub use server::{WebConfig, WebServer};
pub use state::AppState;
