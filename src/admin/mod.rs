//! Admin API exposing circuit state.
//!
//! All routes require `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::resilience::CircuitRegistry;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<CircuitRegistry>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/circuits", get(get_circuits))
        .route("/admin/circuits/{identifier}", get(get_circuit))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
