//! Round trips against a real PostgreSQL. Each test returns early when
//! `DATABASE_URL` is unset.

use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use teller_api::auth::Role;

mod common;
use common::{get, live_db, request, seed_rep, send, LiveDb};

/// Customer plus an account of `account_type` owned by an admin rep. Returns
/// the admin token and the account JSON.
async fn open_account(db: &LiveDb, account_type: &str, target: f64) -> Result<(String, Value)> {
    let (_, admin) = seed_rep(&db.pool, &[Role::Admin]).await?;

    let body = json!({"name": "Ada Obi", "phone_number": "08031234567", "email": "ada@example.com"});
    let (status, _, customer) = send(&db.app, request(Method::POST, "/v1/customers", Some(&admin), Some(body))).await?;
    assert_eq!(status, StatusCode::CREATED, "{}", customer);
    let customer_id = customer["data"]["id"].as_str().unwrap_or_default().to_string();

    let body = json!({"customer_id": customer_id, "type": account_type, "target": target});
    let (status, _, account) = send(&db.app, request(Method::POST, "/v1/accounts", Some(&admin), Some(body))).await?;
    assert_eq!(status, StatusCode::CREATED, "{}", account);
    assert_eq!(account["data"]["balance"], 0.0);
    assert!(account["data"]["number"].as_str().unwrap_or_default().starts_with(account_type));

    Ok((admin, account["data"].clone()))
}

#[tokio::test]
async fn deposit_lifecycle() -> Result<()> {
    let Some(db) = live_db().await? else { return Ok(()) };
    let (admin, account) = open_account(&db, "SB", 5000.0).await?;
    let number = account["number"].as_str().unwrap_or_default();
    let account_id = account["id"].as_str().unwrap_or_default();

    let body = json!({"account_number": number, "amount": 1500.0, "narration": "cash"});
    let (status, _, created) = send(&db.app, request(Method::POST, "/v1/deposits", Some(&admin), Some(body))).await?;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    let id = created["data"]["id"].as_str().unwrap_or_default().to_string();
    assert_eq!(created["data"]["account_number"], number);
    assert_eq!(created["data"]["created_at"]["value"], created["data"]["updated_at"]["value"]);

    let body = json!({"account_number": number, "amount": 200.0});
    let (status, _, _) = send(&db.app, request(Method::POST, "/v1/deposits", Some(&admin), Some(body))).await?;
    assert_eq!(status, StatusCode::CREATED);

    let large = "/v1/deposits?where=amount%20%3E%201000&limit=10&offset=0";
    let (status, _, found) = send(&db.app, get(large, Some(&admin))).await?;
    assert_eq!(status, StatusCode::OK);
    let items = found["data"]["items"].as_array().cloned().unwrap_or_default();
    assert!(!items.is_empty() && items.len() <= 10);
    assert!(items.iter().all(|d| d["amount"].as_f64().unwrap_or_default() > 1000.0 && d["archived_at"].is_null()));

    let (status, _, read) = send(&db.app, get(&format!("/v1/deposits/{}", id), Some(&admin))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["data"]["amount"], 1500.0);

    let filter = format!("/v1/deposits?where=account_id%20%3D%20%27{}%27&limit=10", account_id);
    let (status, _, found) = send(&db.app, get(&filter, Some(&admin))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["data"]["total_count"], 2);

    let (status, _, found) = send(&db.app, get(&format!("{}%20and%20amount%20like%20%2715%25%27", filter), Some(&admin))).await?;
    assert_eq!(status, StatusCode::OK, "{}", found);
    assert_eq!(found["data"]["total_count"], 1);

    let body = json!({"id": id, "narration": "cash at branch"});
    let (status, _, _) = send(&db.app, request(Method::PATCH, "/v1/deposits", Some(&admin), Some(body))).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let stored = |pool: sqlx::PgPool, id: uuid::Uuid| async move {
        sqlx::query_as::<_, (f64, String, chrono::DateTime<chrono::Utc>)>(
            "SELECT amount, narration, updated_at FROM deposits WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&pool)
        .await
    };
    let deposit_id: uuid::Uuid = id.parse()?;
    let before = stored(db.pool.clone(), deposit_id).await?;
    assert_eq!(before.1, "cash at branch");
    let (status, _, _) = send(&db.app, request(Method::PATCH, "/v1/deposits", Some(&admin), Some(json!({"id": id})))).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(stored(db.pool.clone(), deposit_id).await?, before);

    for _ in 0..2 {
        let body = json!({"id": id});
        let (status, _, _) = send(&db.app, request(Method::PATCH, "/v1/deposits/archive", Some(&admin), Some(body))).await?;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (_, _, found) = send(&db.app, get(&filter, Some(&admin))).await?;
    assert_eq!(found["data"]["total_count"], 1);
    assert_ne!(found["data"]["items"][0]["id"], id.as_str());

    let (_, _, found) = send(&db.app, get(&format!("{}&include-archived=true", filter), Some(&admin))).await?;
    assert_eq!(found["data"]["total_count"], 2);
    let items = found["data"]["items"].as_array().cloned().unwrap_or_default();
    let archived = items.iter().find(|d| d["id"] == id.as_str()).cloned().unwrap_or_default();
    assert!(archived["archived_at"].is_object());

    let body = json!({"id": uuid::Uuid::new_v4(), "amount": 10.0});
    let (status, _, _) = send(&db.app, request(Method::PATCH, "/v1/deposits", Some(&admin), Some(body))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let body = json!({"account_number": "SB00000000", "amount": 10.0});
    let (status, _, json) = send(&db.app, request(Method::POST, "/v1/deposits", Some(&admin), Some(body))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "invalid account number 'SB00000000'");
    Ok(())
}

#[tokio::test]
async fn transactions_keep_the_balance_consistent() -> Result<()> {
    let Some(db) = live_db().await? else { return Ok(()) };
    let (admin, account) = open_account(&db, "SB", 5000.0).await?;
    let number = account["number"].as_str().unwrap_or_default().to_string();
    let account_path = format!("/v1/accounts/{}", account["id"].as_str().unwrap_or_default());

    let (_, rep) = seed_rep(&db.pool, &[Role::User]).await?;
    let post = |body: Value| request(Method::POST, "/v1/transactions", Some(&rep), Some(body));

    let (status, _, deposit) = send(&db.app, post(json!({"type": "deposit", "account_number": number, "amount": 1000.0}))).await?;
    assert_eq!(status, StatusCode::CREATED, "{}", deposit);
    assert_eq!(deposit["data"]["opening_balance"], 0.0);
    assert_eq!(deposit["data"]["closing_balance"], 1000.0);

    let (status, _, withdrawal) =
        send(&db.app, post(json!({"type": "withdrawal", "account_number": number, "amount": 300.0}))).await?;
    assert_eq!(status, StatusCode::CREATED, "{}", withdrawal);
    assert_eq!(withdrawal["data"]["opening_balance"], 1000.0);

    let (status, _, json) = send(&db.app, post(json!({"type": "withdrawal", "account_number": number, "amount": 5000.0}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "insufficient funds");

    let (_, _, acct) = send(&db.app, get(&account_path, Some(&admin))).await?;
    assert_eq!(acct["data"]["balance"], 700.0);

    // another plain rep sees none of these
    let (_, stranger) = seed_rep(&db.pool, &[Role::User]).await?;
    let withdrawal_path = format!("/v1/transactions/{}", withdrawal["data"]["id"].as_str().unwrap_or_default());
    let (status, _, _) = send(&db.app, get(&withdrawal_path, Some(&stranger))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let body = json!({"id": withdrawal["data"]["id"], "amount": 400.0});
    let (status, _, _) = send(&db.app, request(Method::PATCH, "/v1/transactions", Some(&admin), Some(body))).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, _, acct) = send(&db.app, get(&account_path, Some(&admin))).await?;
    assert_eq!(acct["data"]["balance"], 600.0);

    let body = json!({"id": withdrawal["data"]["id"]});
    let (status, _, _) = send(&db.app, request(Method::PATCH, "/v1/transactions/archive", Some(&admin), Some(body))).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, _, acct) = send(&db.app, get(&account_path, Some(&admin))).await?;
    assert_eq!(acct["data"]["balance"], 1000.0);

    // the deposit funds nothing else now, so removing it empties the account
    let deposit_path = format!("/v1/transactions/{}", deposit["data"]["id"].as_str().unwrap_or_default());
    let (status, _, _) = send(&db.app, request(Method::DELETE, &deposit_path, Some(&admin), None)).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, _, acct) = send(&db.app, get(&account_path, Some(&admin))).await?;
    assert_eq!(acct["data"]["balance"], 0.0);
    Ok(())
}

#[tokio::test]
async fn daily_savings_deposits_post_one_row_per_day() -> Result<()> {
    let Some(db) = live_db().await? else { return Ok(()) };
    let (admin, account) = open_account(&db, "DS", 100.0).await?;
    let number = account["number"].as_str().unwrap_or_default().to_string();
    let account_id = account["id"].as_str().unwrap_or_default().to_string();

    let (_, rep) = seed_rep(&db.pool, &[Role::User]).await?;
    let deposit = |amount: f64| {
        let body = json!({"type": "deposit", "account_number": number, "amount": amount});
        request(Method::POST, "/v1/transactions", Some(&rep), Some(body))
    };

    let (status, _, json) = send(&db.app, deposit(150.0)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "amount must be a multiple of 100.00");

    let (status, _, json) = send(&db.app, deposit(5100.0)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "pay for at most 50 days at a time, one day is 100.00");

    let (status, _, last) = send(&db.app, deposit(300.0)).await?;
    assert_eq!(status, StatusCode::CREATED, "{}", last);
    assert_eq!(last["data"]["amount"], 100.0);
    assert_eq!(last["data"]["opening_balance"], 200.0);
    assert_eq!(last["data"]["closing_balance"], 300.0);

    // the next deposit continues the day after the last one paid for
    let (status, _, _) = send(&db.app, deposit(200.0)).await?;
    assert_eq!(status, StatusCode::CREATED);

    let rows = format!("/v1/transactions?where=account_id%20%3D%20%27{}%27&limit=50", account_id);
    let (status, _, found) = send(&db.app, get(&rows, Some(&rep))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["data"]["total_count"], 5);
    let items = found["data"]["items"].as_array().cloned().unwrap_or_default();
    assert!(items.iter().all(|t| t["amount"] == 100.0));
    let mut days: Vec<i64> = items.iter().filter_map(|t| t["effective_date"]["unix_ms"].as_i64()).collect();
    days.sort_unstable();
    assert_eq!(days.len(), 5);
    assert!(days.windows(2).all(|w| w[1] - w[0] == 86_400_000));
    assert_eq!(days[2], last["data"]["effective_date"]["unix_ms"].as_i64().unwrap_or_default());

    let (_, _, acct) = send(&db.app, get(&format!("/v1/accounts/{}", account_id), Some(&admin))).await?;
    assert_eq!(acct["data"]["balance"], 500.0);

    let (status, _, totals) = send(&db.app, get("/v1/transactions/totals", Some(&rep))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(totals["data"]["today"], 500.0);
    assert_eq!(totals["data"]["this_week"], 500.0);
    assert_eq!(totals["data"]["this_month"], 500.0);

    let (_, other) = seed_rep(&db.pool, &[Role::User]).await?;
    let (_, _, totals) = send(&db.app, get("/v1/transactions/totals", Some(&other))).await?;
    assert_eq!(totals["data"]["today"], 0.0);
    Ok(())
}

#[tokio::test]
async fn accounts_resolve_by_number_and_users_are_listed() -> Result<()> {
    let Some(db) = live_db().await? else { return Ok(()) };
    let (admin, account) = open_account(&db, "SB", 5000.0).await?;
    let number = account["number"].as_str().unwrap_or_default();

    let (status, _, by_number) = send(&db.app, get(&format!("/v1/accounts/{}", number), Some(&admin))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_number["data"]["id"], account["id"]);

    let (status, _, users) = send(&db.app, get("/v1/users?limit=5", Some(&admin))).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(users["data"]["total_count"].as_i64().unwrap_or_default() >= 1);

    let (status, _, _) = send(&db.app, get("/v1/health", None)).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}
