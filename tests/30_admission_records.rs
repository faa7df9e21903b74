mod common;

use anyhow::Result;
use axum::http::StatusCode;
use placement_crm_api::auth::{BranchRole, RoleTier};
use placement_crm_api::database::MemoryStore;
use serde_json::json;

use common::{admin_oracle, admin_token, rows, token_for, TestApp};

async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .seed(
            "deals",
            rows(vec![
                json!({"id": 1, "name": "Smith", "branch_id": 12, "brand_id": 3, "region_id": 2,
                       "assigned_to": 9, "intake_month": "September", "intake_year": "2025",
                       "pipeline_id": 1, "stage_id": 1}),
                json!({"id": 2, "name": "Jones", "branch_id": 7, "brand_id": 3, "region_id": 2,
                       "assigned_to": 9, "stage_id": 2}),
            ]),
        )
        .await;
    store
        .seed("users", rows(vec![json!({"id": 9, "name": "Case Officer"}), json!({"id": 1, "name": "Admin"})]))
        .await;
    store
        .seed("stages", rows(vec![json!({"id": 1, "name": "New"}), json!({"id": 2, "name": "Applied"})]))
        .await;
    store
        .seed(
            "stage_histories",
            rows(vec![json!({"type": "deal", "type_id": 1, "stage_id": 1})]),
        )
        .await;
    store
        .seed("deal_applications", rows(vec![json!({"id": 30, "deal_id": 2, "university_id": 4})]))
        .await;
    store
}

async fn fixture() -> TestApp {
    let oracle = admin_oracle()
        .with_tier(40, RoleTier::Branch(BranchRole::BranchManager))
        .grant(40, "view deal");
    TestApp::new(seeded_store().await, oracle)
}

fn update_body() -> serde_json::Value {
    json!({
        "name": "Smith Jr",
        "intake_month": "January",
        "intake_year": "2026",
        "brand_id": 3,
        "region_id": 2,
        "lead_branch": 12,
        "assigned_to": 9,
        "pipeline_id": 1,
        "gender": "male",
        "nationality": "British",
        "date_of_birth": "2001-04-02",
        "nickname": "SJ"
    })
}

#[tokio::test]
async fn detail_includes_related_records() -> Result<()> {
    let app = fixture().await;
    let res = app.get("/api/admissions/1", &admin_token()).await?;
    assert_eq!(res.status, StatusCode::OK, "body: {}", res.text);

    let body = res.json();
    assert_eq!(body["data"]["name"], json!("Smith"));
    assert_eq!(body["stageHistories"], json!([1]));
    assert_eq!(body["stages"]["2"], json!("Applied"));
    assert_eq!(body["applications"], json!([]));
    Ok(())
}

#[tokio::test]
async fn detail_outside_scope_is_not_found() -> Result<()> {
    let app = fixture().await;
    let token = token_for(40, "Branch Manager").branch(12).sign();

    assert_eq!(app.get("/api/admissions/1", &token).await?.status, StatusCode::OK);
    let res = app.get("/api/admissions/2", &token).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND, "body: {}", res.text);
    Ok(())
}

#[tokio::test]
async fn update_requires_the_editable_fields() -> Result<()> {
    let app = fixture().await;
    let res = app.put("/api/admissions/1", &admin_token(), json!({"name": "Smith Jr"})).await?;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY, "body: {}", res.text);

    let errors = &res.json()["errors"];
    assert!(errors.get("intake_month").is_some());
    assert!(errors.get("pipeline_id").is_some());
    assert!(errors.get("gender").is_some());
    assert!(errors.get("date_of_birth").is_some());
    assert!(errors.get("name").is_none());
    Ok(())
}

#[tokio::test]
async fn update_rejects_unknown_assignee() -> Result<()> {
    let app = fixture().await;
    let mut body = update_body();
    body["assigned_to"] = json!(777);
    let res = app.put("/api/admissions/1", &admin_token(), body).await?;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(res.json()["errors"].get("assigned_to").is_some());
    Ok(())
}

#[tokio::test]
async fn update_logs_changed_fields() -> Result<()> {
    let app = fixture().await;
    let res = app.put("/api/admissions/1", &admin_token(), update_body()).await?;
    assert_eq!(res.status, StatusCode::OK, "body: {}", res.text);

    let body = res.json();
    assert_eq!(body["message"], json!("Deal successfully updated!"));
    assert_eq!(body["deal"]["name"], json!("Smith Jr"));
    assert_eq!(body["ignored_fields"], json!(["nickname"]));

    let activity = app.activity().await;
    assert_eq!(activity.len(), 1);
    let (kind, note) = &activity[0];
    assert_eq!(kind, "Deal Updated");
    assert_eq!(note["changes"]["name"]["old"], json!("Smith"));
    assert_eq!(note["changes"]["name"]["new"], json!("Smith Jr"));
    assert!(note["changes"].get("brand_id").is_none());
    Ok(())
}

#[tokio::test]
async fn update_of_missing_deal_is_not_found() -> Result<()> {
    let app = fixture().await;
    let res = app.put("/api/admissions/99", &admin_token(), update_body()).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert!(app.activity().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn delete_refuses_admissions_with_applications() -> Result<()> {
    let app = fixture().await;
    let res = app.delete("/api/admissions/2", &admin_token()).await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN, "body: {}", res.text);
    assert_eq!(app.store.rows("deals").await.len(), 2);

    let res = app.delete("/api/admissions/1", &admin_token()).await?;
    assert_eq!(res.status, StatusCode::OK, "body: {}", res.text);
    assert_eq!(app.store.rows("deals").await.len(), 1);

    let activity = app.activity().await;
    assert_eq!(activity[0].0, "deal Deleted");
    Ok(())
}

#[tokio::test]
async fn stage_history_requires_type() -> Result<()> {
    let app = fixture().await;
    let res = app.get("/api/admissions/1/stage-history", &admin_token()).await?;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);

    let res = app.get("/api/admissions/1/stage-history?type=deal", &admin_token()).await?;
    assert_eq!(res.json()["data"], json!([1]));
    Ok(())
}

#[tokio::test]
async fn mutations_outside_scope_are_not_found() -> Result<()> {
    let store = seeded_store().await;
    store
        .seed(
            "deals",
            rows(vec![json!({"id": 3, "name": "Brown", "branch_id": 99, "brand_id": 3, "region_id": 2,
                             "assigned_to": 9, "stage_id": 1})]),
        )
        .await;
    let oracle = admin_oracle()
        .with_tier(40, RoleTier::Branch(BranchRole::BranchManager))
        .grant(40, "view deal")
        .grant(40, "edit deal")
        .grant(40, "delete deal");
    let app = TestApp::new(store, oracle);
    let token = token_for(40, "Branch Manager").branch(12).sign();

    let res = app.get("/api/admissions/3/stage-history?type=deal", &token).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND, "body: {}", res.text);

    let res = app.put("/api/admissions/3", &token, update_body()).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND, "body: {}", res.text);

    let res = app.delete("/api/admissions/3", &token).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND, "body: {}", res.text);

    let deals = app.store.rows("deals").await;
    assert_eq!(deals.len(), 3);
    let brown = deals.iter().find(|d| d["id"] == json!(3)).expect("deal 3 kept");
    assert_eq!(brown["name"], json!("Brown"));
    assert!(app.activity().await.is_empty());

    // the same actor can still edit a deal in its own branch
    let res = app.put("/api/admissions/1", &token, update_body()).await?;
    assert_eq!(res.status, StatusCode::OK, "body: {}", res.text);
    Ok(())
}

async fn with_client() -> TestApp {
    let store = seeded_store().await;
    store
        .seed("client_deals", rows(vec![json!({"deal_id": 1, "client_id": 50})]))
        .await;
    store
        .seed(
            "users",
            rows(vec![
                json!({"id": 50, "name": "Sam Smith", "passport_number": "P1"}),
                json!({"id": 51, "name": "Other Client", "passport_number": "P2"}),
            ]),
        )
        .await;
    TestApp::new(store, admin_oracle())
}

#[tokio::test]
async fn update_requires_a_free_client_passport() -> Result<()> {
    let app = with_client().await;

    let res = app.put("/api/admissions/1", &admin_token(), update_body()).await?;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY, "body: {}", res.text);
    assert!(res.json()["errors"].get("passport_number").is_some());

    let mut body = update_body();
    body["passport_number"] = json!("P2");
    let res = app.put("/api/admissions/1", &admin_token(), body).await?;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY, "body: {}", res.text);
    assert!(res.json()["errors"].get("passport_number").is_some());

    let deals = app.store.rows("deals").await;
    assert_eq!(deals[0]["name"], json!("Smith"));
    Ok(())
}

#[tokio::test]
async fn update_writes_the_client_profile() -> Result<()> {
    let app = with_client().await;
    let mut body = update_body();
    body["passport_number"] = json!("P1");
    let res = app.put("/api/admissions/1", &admin_token(), body).await?;
    assert_eq!(res.status, StatusCode::OK, "body: {}", res.text);
    assert_eq!(res.json()["ignored_fields"], json!(["nickname"]));

    let users = app.store.rows("users").await;
    let client = users.iter().find(|u| u["id"] == json!(50)).expect("client kept");
    assert_eq!(client["passport_number"], json!("P1"));
    assert_eq!(client["gender"], json!("male"));
    assert_eq!(client["nationality"], json!("British"));
    assert_eq!(client["date_of_birth"], json!("2001-04-02"));
    assert_eq!(client["name"], json!("Sam Smith"));

    let other = users.iter().find(|u| u["id"] == json!(51)).expect("other kept");
    assert!(other.get("gender").is_none());
    Ok(())
}

#[tokio::test]
async fn failed_delete_is_not_logged() -> Result<()> {
    let app = TestApp::refusing_deletes(seeded_store().await, admin_oracle());
    let res = app.delete("/api/admissions/1", &admin_token()).await?;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR, "body: {}", res.text);
    assert_eq!(app.store.rows("deals").await.len(), 2);
    assert!(app.activity().await.is_empty());
    Ok(())
}
