//! Operator-facing HTTP API and WebSocket observer feed.
//!
//! Thin shell over the engine: handlers validate, take a mutation guard so
//! the tick loop stays out of the way, and delegate to the registry. The
//! WebSocket side just forwards the scheduler's per-tick broadcast.

pub mod routes;
pub mod server;
pub mod ws;

pub use server::{build_router, start, AppState};
