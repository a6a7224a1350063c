use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use crate::app::dto;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/with/:user_id", get(pairwise_balance))
}

/// Net balance between the caller and another user, per currency.
///
/// Positive = the counterpart owes the caller. An empty map means settled up.
pub async fn pairwise_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Path(user_id): Path<String>,
) -> axum::response::Response {
    let counterpart = match dto::parse_user_id(&user_id, "counterpart id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let balances = services.pairwise_balance(caller.user_id(), counterpart);
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "subject": caller.user_id().to_string(),
            "counterpart": counterpart.to_string(),
            "balances": dto::balances_to_json(&balances),
        })),
    )
        .into_response()
}
