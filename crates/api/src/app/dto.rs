use axum::http::StatusCode;
use serde::Deserialize;
use std::collections::BTreeMap;

use fairshare_core::{Currency, Money, UserId};
use fairshare_expenses::SplitInput;
use fairshare_infra::projections::balances::GroupBalanceReport;
use fairshare_infra::projections::expenses::ExpenseRecord;
use fairshare_infra::projections::groups::GroupRecord;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SplitRequest {
    pub user_id: String,
    /// Minor units (e.g. cents) in the expense's currency.
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct RecordExpenseRequest {
    pub description: String,
    /// Minor units.
    pub amount: i64,
    pub currency: String,
    pub category: String,
    /// RFC3339.
    pub incurred_on: String,
    pub group_id: Option<String>,
    pub splits: Vec<SplitRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ReviseExpenseRequest {
    pub description: Option<String>,
    pub category: Option<String>,
    /// RFC3339.
    pub incurred_on: Option<String>,
    /// Minor units. Requires `currency` alongside.
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub splits: Option<Vec<SplitRequest>>,
}

#[derive(Debug, Deserialize)]
pub struct ListExpensesQuery {
    pub group_id: Option<String>,
    pub counterpart: Option<String>,
    pub settled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
}

// -------------------------
// Request parsing helpers
// -------------------------

pub fn parse_user_id(s: &str, what: &'static str) -> Result<UserId, axum::response::Response> {
    s.parse::<UserId>().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what}"),
        )
    })
}

pub fn parse_currency(s: &str) -> Result<Currency, axum::response::Response> {
    Currency::new(s).map_err(|e| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_currency", e.to_string())
    })
}

pub fn parse_rfc3339(
    s: &str,
    what: &'static str,
) -> Result<chrono::DateTime<chrono::Utc>, axum::response::Response> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|_| {
            errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_date",
                format!("{what} must be RFC3339"),
            )
        })
}

pub fn to_split_inputs(
    req_splits: Vec<SplitRequest>,
    currency: Currency,
) -> Result<Vec<SplitInput>, axum::response::Response> {
    let mut splits = Vec::with_capacity(req_splits.len());
    for s in req_splits {
        let user_id = parse_user_id(&s.user_id, "split user_id")?;
        splits.push(SplitInput {
            user_id,
            amount: Money::new(s.amount, currency),
        });
    }
    Ok(splits)
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn money_to_json(m: Money) -> serde_json::Value {
    serde_json::json!({
        "minor_units": m.minor_units(),
        "currency": m.currency().as_str(),
    })
}

pub fn expense_to_json(rm: ExpenseRecord) -> serde_json::Value {
    serde_json::json!({
        "id": rm.expense_id.0.to_string(),
        "payer": rm.payer.to_string(),
        "description": rm.description,
        "amount": money_to_json(rm.amount),
        "category": format!("{:?}", rm.category).to_lowercase(),
        "incurred_on": rm.incurred_on.to_rfc3339(),
        "group_id": rm.group_id.map(|g| g.0.to_string()),
        "settled": rm.settled,
        "created_at": rm.created_at.to_rfc3339(),
        "updated_at": rm.updated_at.to_rfc3339(),
        "splits": rm.splits.into_iter().map(|s| serde_json::json!({
            "user_id": s.user_id.to_string(),
            "amount": money_to_json(s.amount),
            "settled": s.settled,
        })).collect::<Vec<_>>(),
    })
}

pub fn group_to_json(rm: GroupRecord) -> serde_json::Value {
    serde_json::json!({
        "id": rm.group_id.0.to_string(),
        "name": rm.name,
        "description": rm.description,
        "created_by": rm.created_by.to_string(),
        "members": rm.members.into_iter().map(|m| serde_json::json!({
            "user_id": m.user_id.to_string(),
            "role": format!("{:?}", m.role).to_lowercase(),
            "added_at": m.added_at.to_rfc3339(),
        })).collect::<Vec<_>>(),
    })
}

pub fn balances_to_json(balances: &BTreeMap<Currency, i64>) -> serde_json::Value {
    serde_json::Value::Object(
        balances
            .iter()
            .map(|(currency, minor)| {
                (
                    currency.as_str().to_string(),
                    serde_json::Value::from(*minor),
                )
            })
            .collect(),
    )
}

pub fn group_report_to_json(report: GroupBalanceReport) -> serde_json::Value {
    serde_json::json!({
        "group_id": report.group_id.0.to_string(),
        "totals_by_currency": balances_to_json(&report.totals_by_currency),
        "members": report.members.into_iter().map(|m| serde_json::json!({
            "user_id": m.user_id.to_string(),
            "stale": m.stale,
            "net": balances_to_json(&m.net),
        })).collect::<Vec<_>>(),
    })
}
