use axum::{Router, routing::get};

pub mod balances;
pub mod expenses;
pub mod groups;
pub mod system;

/// Router for all identity-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/expenses", expenses::router())
        .nest("/groups", groups::router())
        .nest("/balances", balances::router())
}
