//! Append-only audit log of authentication and authorization events.

mod handlers;
pub mod repo;
pub mod repo_types;

use crate::state::AppState;
use axum::Router;

pub use repo::{count_recent, record};

pub fn router() -> Router<AppState> {
    handlers::routes()
}
