use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use fairshare_core::DomainError;
use fairshare_expenses::ExpenseCategory;
use fairshare_infra::command_dispatcher::DispatchError;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Domain(e) => domain_error_to_response(e),
        DispatchError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            format!("{e:?}"),
        ),
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let (status, code) = match &err {
        DomainError::InvalidSplitSum { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invalid_split_sum")
        }
        DomainError::EmptySplitSet => (StatusCode::BAD_REQUEST, "empty_split_set"),
        DomainError::DuplicateParticipant(_) => (StatusCode::BAD_REQUEST, "duplicate_participant"),
        DomainError::NonPositiveAmount => (StatusCode::BAD_REQUEST, "non_positive_amount"),
        DomainError::CurrencyMismatch { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "currency_mismatch")
        }
        DomainError::NotAuthorized => (StatusCode::FORBIDDEN, "not_authorized"),
        DomainError::ExpenseNotFound => (StatusCode::NOT_FOUND, "expense_not_found"),
        DomainError::GroupNotFound => (StatusCode::NOT_FOUND, "group_not_found"),
        DomainError::ParticipantNotFound => (StatusCode::NOT_FOUND, "participant_not_found"),
        DomainError::AlreadyMember => (StatusCode::CONFLICT, "already_member"),
        DomainError::NotAMember => (StatusCode::CONFLICT, "not_a_member"),
        DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        DomainError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        DomainError::InvalidId(_) => (StatusCode::BAD_REQUEST, "invalid_id"),
    };
    json_error(status, code, err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_category(s: &str) -> Result<ExpenseCategory, axum::response::Response> {
    match s.to_lowercase().as_str() {
        "general" => Ok(ExpenseCategory::General),
        "food" => Ok(ExpenseCategory::Food),
        "rent" => Ok(ExpenseCategory::Rent),
        "transport" => Ok(ExpenseCategory::Transport),
        "utilities" => Ok(ExpenseCategory::Utilities),
        "entertainment" => Ok(ExpenseCategory::Entertainment),
        "trip" => Ok(ExpenseCategory::Trip),
        _ => Err(json_error(
            StatusCode::BAD_REQUEST,
            "invalid_category",
            "category must be one of: general, food, rent, transport, utilities, entertainment, trip",
        )),
    }
}
