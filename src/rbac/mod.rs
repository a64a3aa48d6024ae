//! Roles, permissions and the per-request permission check.

mod dto;
mod handlers;
pub mod repo;
pub mod repo_types;
pub mod seed;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use services::{has_permission, require, RbacError};

pub fn router() -> Router<AppState> {
    handlers::routes()
}
