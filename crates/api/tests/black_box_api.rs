use reqwest::StatusCode;
use serde_json::json;

use fairshare_core::UserId;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Serve the production router on an ephemeral local port.
    async fn spawn() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("ephemeral port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            axum::serve(listener, fairshare_api::app::build_app())
                .await
                .unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn as_user(user_id: UserId) -> String {
    user_id.to_string()
}

async fn get_expense_eventually(
    client: &reqwest::Client,
    base_url: &str,
    caller: &str,
    id: &str,
    predicate: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    // The API is intentionally eventual-consistent (command path vs projection
    // update). Poll briefly until the projection catches up.
    for _ in 0..50 {
        let res = client
            .get(format!("{}/expenses/{}", base_url, id))
            .header("x-user-id", caller)
            .send()
            .await
            .unwrap();

        if res.status() == StatusCode::OK {
            let body: serde_json::Value = res.json().await.unwrap();
            if predicate(&body) {
                return body;
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    panic!("expense did not become visible in projection within timeout");
}

async fn pairwise_balances(
    client: &reqwest::Client,
    base_url: &str,
    caller: &str,
    counterpart: &str,
) -> serde_json::Value {
    let res = client
        .get(format!("{}/balances/with/{}", base_url, counterpart))
        .header("x-user-id", caller)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    body["balances"].clone()
}

fn even_split_body(users: &[UserId], share: i64) -> serde_json::Value {
    json!({
        "description": "Team dinner",
        "amount": share * users.len() as i64,
        "currency": "USD",
        "category": "food",
        "incurred_on": "2026-08-01T19:30:00Z",
        "splits": users.iter().map(|u| json!({
            "user_id": u.to_string(),
            "amount": share,
        })).collect::<Vec<_>>(),
    })
}

#[tokio::test]
async fn identity_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_is_open_and_whoami_echoes_caller() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let caller = UserId::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .header("x-user-id", as_user(caller))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["user_id"].as_str().unwrap(), caller.to_string());
}

#[tokio::test]
async fn expense_lifecycle_record_settle_and_balances() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let payer = UserId::new();
    let a = UserId::new();
    let b = UserId::new();

    // Payer records 12000 cents split 4000/4000/4000 among payer, A, B.
    let res = client
        .post(format!("{}/expenses", srv.base_url))
        .header("x-user-id", as_user(payer))
        .json(&even_split_body(&[payer, a, b], 4_000))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    // The payer's own split is pre-settled in the mutation response.
    let payer_split = created["splits"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["user_id"] == payer.to_string())
        .unwrap();
    assert_eq!(payer_split["settled"], json!(true));
    assert_eq!(created["settled"], json!(false));

    // Wait for the read model, then check pairwise balances both ways.
    get_expense_eventually(&client, &srv.base_url, &as_user(payer), &id, |_| true).await;

    let balances = pairwise_balances(&client, &srv.base_url, &as_user(a), &payer.to_string()).await;
    assert_eq!(balances["USD"], json!(-4_000));
    let balances = pairwise_balances(&client, &srv.base_url, &as_user(payer), &a.to_string()).await;
    assert_eq!(balances["USD"], json!(4_000));

    // Payer settles A's split.
    let res = client
        .post(format!(
            "{}/expenses/{}/splits/{}/settle",
            srv.base_url, id, a
        ))
        .header("x-user-id", as_user(payer))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let settled: serde_json::Value = res.json().await.unwrap();
    let a_split = settled["splits"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["user_id"] == a.to_string())
        .unwrap();
    assert_eq!(a_split["settled"], json!(true));

    get_expense_eventually(&client, &srv.base_url, &as_user(payer), &id, |body| {
        body["splits"]
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s["user_id"] == a.to_string() && s["settled"] == json!(true))
    })
    .await;

    // A is settled up; B is untouched.
    let balances = pairwise_balances(&client, &srv.base_url, &as_user(a), &payer.to_string()).await;
    assert!(balances.as_object().unwrap().is_empty());
    let balances = pairwise_balances(&client, &srv.base_url, &as_user(b), &payer.to_string()).await;
    assert_eq!(balances["USD"], json!(-4_000));

    // Settling the same split again succeeds with identical state.
    let res = client
        .post(format!(
            "{}/expenses/{}/splits/{}/settle",
            srv.base_url, id, a
        ))
        .header("x-user-id", as_user(payer))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let retried: serde_json::Value = res.json().await.unwrap();
    assert_eq!(retried["splits"], settled["splits"]);
}

#[tokio::test]
async fn non_payer_cannot_settle() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let payer = UserId::new();
    let a = UserId::new();
    let b = UserId::new();

    let res = client
        .post(format!("{}/expenses", srv.base_url))
        .header("x-user-id", as_user(payer))
        .json(&even_split_body(&[a, b], 2_000))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!(
            "{}/expenses/{}/splits/{}/settle",
            srv.base_url, id, a
        ))
        .header("x-user-id", as_user(b))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], json!("not_authorized"));

    // State unchanged.
    get_expense_eventually(&client, &srv.base_url, &as_user(payer), &id, |body| {
        body["splits"]
            .as_array()
            .unwrap()
            .iter()
            .all(|s| s["settled"] == json!(false))
    })
    .await;
}

#[tokio::test]
async fn invalid_split_sum_is_rejected_and_nothing_persists() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let payer = UserId::new();
    let a = UserId::new();

    let res = client
        .post(format!("{}/expenses", srv.base_url))
        .header("x-user-id", as_user(payer))
        .json(&json!({
            "description": "Off by one",
            "amount": 12_000,
            "currency": "USD",
            "category": "general",
            "incurred_on": "2026-08-01T12:00:00Z",
            "splits": [
                { "user_id": payer.to_string(), "amount": 4_000 },
                { "user_id": a.to_string(), "amount": 7_999 },
            ],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], json!("invalid_split_sum"));

    // No expense was persisted.
    let res = client
        .get(format!(
            "{}/expenses?counterpart={}",
            srv.base_url, payer
        ))
        .header("x-user-id", as_user(payer))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let listing: serde_json::Value = res.json().await.unwrap();
    assert!(listing["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn group_roles_and_membership_rules() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let creator = UserId::new();
    let member = UserId::new();
    let outsider = UserId::new();

    let res = client
        .post(format!("{}/groups", srv.base_url))
        .header("x-user-id", as_user(creator))
        .json(&json!({
            "name": "Flat 4B",
            "member_ids": [member.to_string()],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let group: serde_json::Value = res.json().await.unwrap();
    let group_id = group["id"].as_str().unwrap().to_string();
    assert_eq!(group["created_by"], json!(creator.to_string()));

    let roster = group["members"].as_array().unwrap();
    assert_eq!(roster.len(), 2);
    assert_eq!(roster[0]["user_id"], json!(creator.to_string()));
    assert_eq!(roster[0]["role"], json!("admin"));
    assert_eq!(roster[1]["role"], json!("member"));

    // A plain member may not add others.
    let res = client
        .post(format!("{}/groups/{}/members", srv.base_url, group_id))
        .header("x-user-id", as_user(member))
        .json(&json!({ "user_id": outsider.to_string() }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // The creator may.
    let res = client
        .post(format!("{}/groups/{}/members", srv.base_url, group_id))
        .header("x-user-id", as_user(creator))
        .json(&json!({ "user_id": outsider.to_string() }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // Joining twice is an explicit conflict.
    let res = client
        .post(format!("{}/groups/{}/join", srv.base_url, group_id))
        .header("x-user-id", as_user(outsider))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], json!("already_member"));
}

#[tokio::test]
async fn group_balance_reports_member_nets() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let creator = UserId::new();
    let member = UserId::new();

    let res = client
        .post(format!("{}/groups", srv.base_url))
        .header("x-user-id", as_user(creator))
        .json(&json!({
            "name": "Road trip",
            "member_ids": [member.to_string()],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let group: serde_json::Value = res.json().await.unwrap();
    let group_id = group["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/expenses", srv.base_url))
        .header("x-user-id", as_user(creator))
        .json(&json!({
            "description": "Fuel",
            "amount": 6_000,
            "currency": "USD",
            "category": "transport",
            "incurred_on": "2026-08-02T09:00:00Z",
            "group_id": group_id,
            "splits": [
                { "user_id": creator.to_string(), "amount": 3_000 },
                { "user_id": member.to_string(), "amount": 3_000 },
            ],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let expense_id = created["id"].as_str().unwrap().to_string();

    get_expense_eventually(&client, &srv.base_url, &as_user(creator), &expense_id, |_| true).await;

    let res = client
        .get(format!("{}/groups/{}/balance", srv.base_url, group_id))
        .header("x-user-id", as_user(creator))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["totals_by_currency"]["USD"], json!(6_000));

    let members = report["members"].as_array().unwrap();
    let find = |user: &UserId| {
        members
            .iter()
            .find(|m| m["user_id"] == user.to_string())
            .unwrap()
    };
    assert_eq!(find(&creator)["net"]["USD"], json!(3_000));
    assert_eq!(find(&member)["net"]["USD"], json!(-3_000));
    assert_eq!(find(&member)["stale"], json!(false));
}

#[tokio::test]
async fn deleting_an_expense_reverts_balances() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let payer = UserId::new();
    let a = UserId::new();

    let res = client
        .post(format!("{}/expenses", srv.base_url))
        .header("x-user-id", as_user(payer))
        .json(&even_split_body(&[a], 2_500))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    get_expense_eventually(&client, &srv.base_url, &as_user(payer), &id, |_| true).await;
    let balances = pairwise_balances(&client, &srv.base_url, &as_user(a), &payer.to_string()).await;
    assert_eq!(balances["USD"], json!(-2_500));

    // Only the payer may delete.
    let res = client
        .delete(format!("{}/expenses/{}", srv.base_url, id))
        .header("x-user-id", as_user(a))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .delete(format!("{}/expenses/{}", srv.base_url, id))
        .header("x-user-id", as_user(payer))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // The balance reverts once the projection drops the record.
    for _ in 0..50 {
        let balances =
            pairwise_balances(&client, &srv.base_url, &as_user(a), &payer.to_string()).await;
        if balances.as_object().unwrap().is_empty() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("balance did not revert after expense deletion");
}
