use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use fairshare_core::{AggregateId, Money};
use fairshare_expenses::{
    Expense, ExpenseCommand, ExpenseId, RecordExpense, RemoveExpense, ReviseExpense, SettleSplit,
};
use fairshare_groups::GroupId;
use fairshare_infra::projections::expenses::{EXPENSE_AGGREGATE_TYPE, ExpenseFilter};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(record_expense).get(list_expenses))
        .route(
            "/:id",
            get(get_expense).patch(revise_expense).delete(remove_expense),
        )
        .route("/:id/splits/:user_id/settle", post(settle_split))
}

fn parse_expense_id(id: &str) -> Result<ExpenseId, axum::response::Response> {
    id.parse::<AggregateId>().map(ExpenseId::new).map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid expense id")
    })
}

/// Respond with the authoritative post-mutation expense record.
fn snapshot_response(
    services: &AppServices,
    expense_id: ExpenseId,
    status: StatusCode,
) -> axum::response::Response {
    match services.expense_snapshot(expense_id) {
        Ok(Some(rm)) => (status, Json(dto::expense_to_json(rm))).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "expense_not_found", "expense not found"),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn record_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Json(body): Json<dto::RecordExpenseRequest>,
) -> axum::response::Response {
    let currency = match dto::parse_currency(&body.currency) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let category = match errors::parse_category(&body.category) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let incurred_on = match dto::parse_rfc3339(&body.incurred_on, "incurred_on") {
        Ok(dt) => dt,
        Err(resp) => return resp,
    };
    let group_id = match body.group_id {
        Some(raw) => match raw.parse::<AggregateId>() {
            Ok(id) => Some(GroupId::new(id)),
            Err(_) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid group id");
            }
        },
        None => None,
    };
    let splits = match dto::to_split_inputs(body.splits, currency) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let aggregate_id = AggregateId::new();
    let expense_id = ExpenseId::new(aggregate_id);

    let cmd = ExpenseCommand::RecordExpense(RecordExpense {
        expense_id,
        payer: caller.user_id(),
        description: body.description,
        amount: Money::new(body.amount, currency),
        category,
        incurred_on,
        group_id,
        splits,
        occurred_at: Utc::now(),
    });

    if let Err(e) = services.dispatch::<Expense>(aggregate_id, EXPENSE_AGGREGATE_TYPE, cmd, |id| {
        Expense::empty(ExpenseId::new(id))
    }) {
        return errors::dispatch_error_to_response(e);
    }

    snapshot_response(&services, expense_id, StatusCode::CREATED)
}

pub async fn revise_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReviseExpenseRequest>,
) -> axum::response::Response {
    let expense_id = match parse_expense_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let category = match body.category.as_deref() {
        Some(raw) => match errors::parse_category(raw) {
            Ok(c) => Some(c),
            Err(resp) => return resp,
        },
        None => None,
    };
    let incurred_on = match body.incurred_on.as_deref() {
        Some(raw) => match dto::parse_rfc3339(raw, "incurred_on") {
            Ok(dt) => Some(dt),
            Err(resp) => return resp,
        },
        None => None,
    };

    // Amount/split changes need an explicit currency; the engine never
    // guesses one.
    let (amount, splits) = if body.amount.is_some() || body.splits.is_some() {
        let currency = match body.currency.as_deref() {
            Some(raw) => match dto::parse_currency(raw) {
                Ok(c) => c,
                Err(resp) => return resp,
            },
            None => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "missing_currency",
                    "currency is required when amount or splits change",
                );
            }
        };
        let amount = body.amount.map(|minor| Money::new(minor, currency));
        let splits = match body.splits {
            Some(req_splits) => match dto::to_split_inputs(req_splits, currency) {
                Ok(s) => Some(s),
                Err(resp) => return resp,
            },
            None => None,
        };
        (amount, splits)
    } else {
        (None, None)
    };

    let cmd = ExpenseCommand::ReviseExpense(ReviseExpense {
        expense_id,
        requester: caller.user_id(),
        description: body.description,
        category,
        incurred_on,
        amount,
        splits,
        occurred_at: Utc::now(),
    });

    if let Err(e) =
        services.dispatch::<Expense>(expense_id.0, EXPENSE_AGGREGATE_TYPE, cmd, |id| {
            Expense::empty(ExpenseId::new(id))
        })
    {
        return errors::dispatch_error_to_response(e);
    }

    snapshot_response(&services, expense_id, StatusCode::OK)
}

pub async fn remove_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let expense_id = match parse_expense_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let cmd = ExpenseCommand::RemoveExpense(RemoveExpense {
        expense_id,
        requester: caller.user_id(),
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Expense>(expense_id.0, EXPENSE_AGGREGATE_TYPE, cmd, |id| {
        Expense::empty(ExpenseId::new(id))
    }) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn settle_split(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Path((id, user_id)): Path<(String, String)>,
) -> axum::response::Response {
    let expense_id = match parse_expense_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let participant = match dto::parse_user_id(&user_id, "participant id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let cmd = ExpenseCommand::SettleSplit(SettleSplit {
        expense_id,
        participant,
        requester: caller.user_id(),
        occurred_at: Utc::now(),
    });

    // An already-settled split dispatches to zero events; the response is
    // the unchanged expense either way (retry-safe).
    if let Err(e) =
        services.dispatch::<Expense>(expense_id.0, EXPENSE_AGGREGATE_TYPE, cmd, |id| {
            Expense::empty(ExpenseId::new(id))
        })
    {
        return errors::dispatch_error_to_response(e);
    }

    snapshot_response(&services, expense_id, StatusCode::OK)
}

pub async fn get_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let expense_id = match parse_expense_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.expenses_get(&expense_id) {
        Some(rm) => (StatusCode::OK, Json(dto::expense_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "expense_not_found", "expense not found"),
    }
}

pub async fn list_expenses(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListExpensesQuery>,
) -> axum::response::Response {
    let group_id = match query.group_id.as_deref() {
        Some(raw) => match raw.parse::<AggregateId>() {
            Ok(id) => Some(GroupId::new(id)),
            Err(_) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid group id");
            }
        },
        None => None,
    };
    let counterpart = match query.counterpart.as_deref() {
        Some(raw) => match dto::parse_user_id(raw, "counterpart id") {
            Ok(id) => Some(id),
            Err(resp) => return resp,
        },
        None => None,
    };

    let filter = ExpenseFilter {
        group_id,
        counterpart,
        settled: query.settled,
    };

    let items = services
        .expenses_list(&filter)
        .into_iter()
        .map(dto::expense_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
