use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use chrono::Utc;

use fairshare_core::AggregateId;
use fairshare_groups::{
    AddMember, CreateGroup, Group, GroupCommand, GroupId, JoinGroup, LeaveGroup, RemoveMember,
};
use fairshare_infra::projections::groups::GROUP_AGGREGATE_TYPE;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_group))
        .route("/:id", get(get_group))
        .route("/:id/join", post(join_group))
        .route("/:id/leave", post(leave_group))
        .route("/:id/members", post(add_member))
        .route("/:id/members/:user_id", delete(remove_member))
        .route("/:id/balance", get(group_balance))
}

fn parse_group_id(id: &str) -> Result<GroupId, axum::response::Response> {
    id.parse::<AggregateId>().map(GroupId::new).map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid group id")
    })
}

pub async fn create_group(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Json(body): Json<dto::CreateGroupRequest>,
) -> axum::response::Response {
    let mut initial_member_ids = Vec::with_capacity(body.member_ids.len());
    for raw in &body.member_ids {
        match dto::parse_user_id(raw, "member id") {
            Ok(id) => initial_member_ids.push(id),
            Err(resp) => return resp,
        }
    }

    let aggregate_id = AggregateId::new();
    let group_id = GroupId::new(aggregate_id);

    let cmd = GroupCommand::CreateGroup(CreateGroup {
        group_id,
        creator: caller.user_id(),
        name: body.name,
        description: body.description,
        initial_member_ids,
        occurred_at: Utc::now(),
    });

    if let Err(e) = services.dispatch::<Group>(aggregate_id, GROUP_AGGREGATE_TYPE, cmd, |id| {
        Group::empty(GroupId::new(id))
    }) {
        return errors::dispatch_error_to_response(e);
    }

    match services.group_snapshot(group_id) {
        Ok(Some(rm)) => (StatusCode::CREATED, Json(dto::group_to_json(rm))).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "group_not_found", "group not found"),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_group(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let group_id = match parse_group_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.groups_get(&group_id) {
        Some(rm) => (StatusCode::OK, Json(dto::group_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "group_not_found", "group not found"),
    }
}

pub async fn join_group(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let group_id = match parse_group_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let cmd = GroupCommand::JoinGroup(JoinGroup {
        group_id,
        user_id: caller.user_id(),
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Group>(group_id.0, GROUP_AGGREGATE_TYPE, cmd, |id| {
        Group::empty(GroupId::new(id))
    }) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn leave_group(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let group_id = match parse_group_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let cmd = GroupCommand::LeaveGroup(LeaveGroup {
        group_id,
        user_id: caller.user_id(),
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Group>(group_id.0, GROUP_AGGREGATE_TYPE, cmd, |id| {
        Group::empty(GroupId::new(id))
    }) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn add_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddMemberRequest>,
) -> axum::response::Response {
    let group_id = match parse_group_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let member_id = match dto::parse_user_id(&body.user_id, "member id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let cmd = GroupCommand::AddMember(AddMember {
        group_id,
        requester: caller.user_id(),
        member_id,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Group>(group_id.0, GROUP_AGGREGATE_TYPE, cmd, |id| {
        Group::empty(GroupId::new(id))
    }) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn remove_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Path((id, user_id)): Path<(String, String)>,
) -> axum::response::Response {
    let group_id = match parse_group_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let member_id = match dto::parse_user_id(&user_id, "member id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let cmd = GroupCommand::RemoveMember(RemoveMember {
        group_id,
        requester: caller.user_id(),
        member_id,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Group>(group_id.0, GROUP_AGGREGATE_TYPE, cmd, |id| {
        Group::empty(GroupId::new(id))
    }) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn group_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let group_id = match parse_group_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.group_balance(group_id) {
        Ok(report) => (StatusCode::OK, Json(dto::group_report_to_json(report))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
