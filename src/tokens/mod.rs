//! Refresh-token rotation and API access tokens. Secrets are random hex;
//! only their SHA-256 digests are stored.

mod dto;
mod handlers;
pub mod repo;
pub mod repo_types;
pub mod secret;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use services::TokenPair;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
