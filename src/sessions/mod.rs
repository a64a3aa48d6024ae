//! Login sessions: concurrent limits, validation, revocation and lockout.

mod dto;
mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use repo_types::Session;
pub use services::{SessionCheck, SessionMeta};

pub fn router() -> Router<AppState> {
    handlers::routes()
}
