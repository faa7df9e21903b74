mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use placement_crm_api::database::MemoryStore;
use serde_json::{json, Value};

use common::{admin_oracle, admin_token, rows, TestApp};

async fn app_with(seed: &[(&str, Vec<Value>)]) -> TestApp {
    let store = MemoryStore::new();
    for (table, fixture) in seed {
        store.seed(table, rows(fixture.clone())).await;
    }
    TestApp::new(store, admin_oracle())
}

fn destinations() -> Vec<Value> {
    vec![
        json!({"id": 1, "name": "Canada", "official_name": "Canada", "continent": "Canada", "status": "active",
               "popular_study_cities": "Toronto,Vancouver", "flag": "CA"}),
        json!({"id": 2, "name": "Germany", "continent": "Europe", "status": "active",
               "popular_study_cities": "Berlin", "flag": "DE"}),
        json!({"id": 3, "name": "France", "continent": "Europe", "status": "paused", "flag": "FR"}),
    ]
}

#[tokio::test]
async fn agencies_create_and_reject_duplicates() -> Result<()> {
    let app = app_with(&[]).await;
    let body = json!({
        "organization_name": "Global Ed",
        "organization_email": "hello@globaled.test",
        "phone": "0123",
        "id": 99,
        "favourite_colour": "blue"
    });

    let res = app.post("/api/agencies", &admin_token(), body.clone()).await?;
    assert_eq!(res.status, StatusCode::CREATED, "body: {}", res.text);
    let created = res.json();
    assert_eq!(created["data"]["type"], json!("Agency"));
    assert_eq!(created["data"]["billing_country"], json!(""));
    assert_eq!(created["ignored_fields"], json!(["favourite_colour", "id"]));
    assert_ne!(created["data"]["id"], json!(99));

    let res = app.post("/api/agencies", &admin_token(), body).await?;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(res.json()["errors"].get("organization_name").is_some());

    assert_eq!(app.activity().await[0].0, "Agency Created");
    Ok(())
}

#[tokio::test]
async fn agencies_bulk_delete_removes_login_users() -> Result<()> {
    let app = app_with(&[
        (
            "agencies",
            vec![
                json!({"id": 1, "organization_name": "A", "user_id": 50}),
                json!({"id": 2, "organization_name": "B", "user_id": 51}),
                json!({"id": 3, "organization_name": "C", "user_id": 52}),
            ],
        ),
        (
            "users",
            vec![
                json!({"id": 50, "type": "agency"}),
                json!({"id": 51, "type": "agency"}),
                json!({"id": 52, "type": "agency"}),
            ],
        ),
    ])
    .await;

    let res = app
        .send(
            axum::http::Method::DELETE,
            "/api/agencies",
            Some(&admin_token()),
            Some(json!({"ids": "1,2"})),
        )
        .await?;
    assert_eq!(res.status, StatusCode::OK, "body: {}", res.text);
    assert_eq!(res.json()["deleted"], json!(2));
    assert_eq!(app.store.rows("agencies").await.len(), 1);
    assert_eq!(app.store.rows("users").await.len(), 1);

    let kinds: Vec<String> = app.activity().await.into_iter().map(|(k, _)| k).collect();
    assert_eq!(kinds, vec!["Agency Deleted", "Agency Deleted"]);
    Ok(())
}

#[tokio::test]
async fn organizations_create_a_login_user() -> Result<()> {
    let app = app_with(&[("users", vec![json!({"id": 5, "email": "taken@uni.test"})])]).await;
    let body = json!({
        "organization_name": "North University",
        "organization_type": "University",
        "organization_email": "admissions@north.test",
        "organization_phone": "555-0100",
        "organization_billing_country": "UK"
    });

    let res = app.post("/api/organizations", &admin_token(), body.clone()).await?;
    assert_eq!(res.status, StatusCode::CREATED, "body: {}", res.text);
    let data = &res.json()["data"];
    assert_eq!(data["type"], json!("University"));
    assert_eq!(data["billing_country"], json!("UK"));
    assert_eq!(data["user"]["type"], json!("organization"));
    assert_eq!(data["user"]["email"], json!("admissions@north.test"));
    assert_eq!(data["user_id"], data["user"]["id"]);

    let mut taken = body;
    taken["organization_email"] = json!("taken@uni.test");
    let res = app.post("/api/organizations", &admin_token(), taken).await?;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.store.rows("organizations").await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn organizations_delete_removes_both_rows() -> Result<()> {
    let app = app_with(&[
        ("organizations", vec![json!({"id": 8, "user_id": 60, "type": "University"})]),
        ("users", vec![json!({"id": 60, "name": "North University", "type": "organization"})]),
    ])
    .await;

    let res = app.delete("/api/organizations/8", &admin_token()).await?;
    assert_eq!(res.status, StatusCode::OK, "body: {}", res.text);
    assert!(app.store.rows("organizations").await.is_empty());
    assert!(app.store.rows("users").await.is_empty());
    assert_eq!(app.activity().await[0].0, "Organization Deleted");

    let res = app.delete("/api/organizations/8", &admin_token()).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn destination_list_counts_active_tiles() -> Result<()> {
    let app = app_with(&[("destinations", destinations())]).await;
    let res = app.get("/api/destinations?continent=Europe", &admin_token()).await?;
    assert_eq!(res.status, StatusCode::OK, "body: {}", res.text);

    let data = &res.json()["data"];
    assert_eq!(data["number_of_tiles"], json!(5));
    assert_eq!(data["statuses"]["Europe"]["count"], json!(1));
    assert_eq!(data["statuses"]["Canada"]["count"], json!(1));
    assert_eq!(data["statuses"]["UK"]["count"], json!(0));
    let names: Vec<&str> = data["destinations"]
        .as_array()
        .map(|d| d.iter().filter_map(|r| r["name"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(names, vec!["France", "Germany"]);
    Ok(())
}

#[tokio::test]
async fn destination_create_joins_lists_and_show_expands_them() -> Result<()> {
    let app = app_with(&[]).await;
    let res = app
        .post(
            "/api/destinations",
            &admin_token(),
            json!({
                "name": "Australia",
                "continent": "Australia",
                "currency": "AUD",
                "language": "English",
                "popular_study_cities": ["Sydney", "Melbourne"],
                "success_rate": "80"
            }),
        )
        .await?;
    assert_eq!(res.status, StatusCode::CREATED, "body: {}", res.text);
    let data = &res.json()["data"];
    assert_eq!(data["popular_study_cities"], json!("Sydney,Melbourne"));
    assert_eq!(data["status"], json!("active"));
    assert_eq!(data["english_proficiency_required"], json!(false));
    assert_eq!(data["success_rate"], json!(80));

    let id = data["id"].as_i64().unwrap_or_default();
    let res = app.get(&format!("/api/destinations/{}", id), &admin_token()).await?;
    assert_eq!(
        res.json()["destination"]["popular_study_cities"],
        json!(["Sydney", "Melbourne"])
    );
    Ok(())
}

#[tokio::test]
async fn destination_create_validates_lists_and_ranges() -> Result<()> {
    let app = app_with(&[]).await;
    let res = app
        .post(
            "/api/destinations",
            &admin_token(),
            json!({
                "name": "Nowhere",
                "continent": "Europe",
                "currency": "EUR",
                "language": "None",
                "popular_study_cities": "Paris",
                "success_rate": 140
            }),
        )
        .await?;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    let errors = &res.json()["errors"];
    assert!(errors.get("popular_study_cities").is_some());
    assert!(errors.get("success_rate").is_some());
    Ok(())
}

#[tokio::test]
async fn destination_patch_only_touches_sent_keys() -> Result<()> {
    let app = app_with(&[("destinations", destinations())]).await;
    let res = app
        .patch(
            "/api/destinations/2",
            &admin_token(),
            json!({"currency": "EUR", "mascot": "eagle"}),
        )
        .await?;
    assert_eq!(res.status, StatusCode::OK, "body: {}", res.text);

    let body = res.json();
    assert_eq!(body["data"]["currency"], json!("EUR"));
    assert_eq!(body["data"]["popular_study_cities"], json!("Berlin"));
    assert_eq!(body["ignored_fields"], json!(["mascot"]));

    let activity = app.activity().await;
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].0, "Destination Updated");
    assert_eq!(activity[0].1["changes"]["currency"]["new"], json!("EUR"));
    Ok(())
}

#[tokio::test]
async fn destination_status_must_be_known() -> Result<()> {
    let app = app_with(&[("destinations", destinations())]).await;
    let res = app
        .put("/api/destinations/3/status", &admin_token(), json!({"status": "closed"}))
        .await?;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);

    let res = app
        .put("/api/destinations/3/status", &admin_token(), json!({"status": "high_risk"}))
        .await?;
    assert_eq!(res.status, StatusCode::OK, "body: {}", res.text);
    let stored = app.store.rows("destinations").await;
    let france = stored.iter().find(|d| d["id"] == json!(3));
    assert_eq!(france.map(|d| d["status"].clone()), Some(json!("high_risk")));
    Ok(())
}

#[tokio::test]
async fn rules_are_listed_by_position_with_creator() -> Result<()> {
    let app = app_with(&[
        ("destinations", destinations()),
        ("users", vec![json!({"id": 1, "name": "Admin"})]),
    ])
    .await;

    for (name, position) in [("Proof of funds", 2), ("Valid passport", 1)] {
        let res = app
            .post(
                "/api/destinations/1/rules",
                &admin_token(),
                json!({"name": name, "position": position, "type": 1, "rule_type": "requirement"}),
            )
            .await?;
        assert_eq!(res.status, StatusCode::CREATED, "body: {}", res.text);
    }

    let res = app
        .get("/api/destinations/1/rules?type=1&rule_type=requirement", &admin_token())
        .await?;
    assert_eq!(res.status, StatusCode::OK, "body: {}", res.text);
    let rules = res.json()["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0]["name"], json!("Valid passport"));
    assert_eq!(rules[0]["creator"], json!({"id": 1, "name": "Admin"}));

    let res = app
        .get("/api/destinations/1/rules?type=3&rule_type=requirement", &admin_token())
        .await?;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}

#[tokio::test]
async fn rule_for_missing_home_destination_is_not_found() -> Result<()> {
    let app = app_with(&[("destinations", destinations())]).await;
    let res = app
        .post(
            "/api/destinations/1/rules",
            &admin_token(),
            json!({"name": "Local rule", "position": 1, "type": 2, "rule_type": "restriction"}),
        )
        .await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND, "body: {}", res.text);
    Ok(())
}

#[tokio::test]
async fn meta_upserts_by_key() -> Result<()> {
    let app = app_with(&[("destinations", destinations())]).await;

    let res = app
        .put(
            "/api/destinations/1/meta",
            &admin_token(),
            json!({"type": 1, "visa_fee": 490, "embassy": "Ottawa"}),
        )
        .await?;
    assert_eq!(res.status, StatusCode::OK, "body: {}", res.text);

    app.put(
        "/api/destinations/1/meta",
        &admin_token(),
        json!({"type": 1, "visa_fee": 500}),
    )
    .await?;
    assert_eq!(app.store.rows("destination_metas").await.len(), 2);

    let res = app.get("/api/destinations/1/meta?type=1", &admin_token()).await?;
    let data = &res.json()["data"];
    assert_eq!(data["visa_fee"], json!(500));
    assert_eq!(data["embassy"], json!("Ottawa"));

    let activity = app.activity().await;
    assert_eq!(activity.len(), 2);
    assert_eq!(activity[1].1["changes"]["visa_fee"]["old"], json!("490"));
    Ok(())
}

#[tokio::test]
async fn elt_requirements_pluck_names() -> Result<()> {
    let app = app_with(&[]).await;
    for name in ["IELTS", "TOEFL"] {
        let res = app
            .post("/api/elt-requirements", &admin_token(), json!({"name": name}))
            .await?;
        assert_eq!(res.status, StatusCode::CREATED, "body: {}", res.text);
    }

    let res = app.get("/api/elt-requirements/pluck", &admin_token()).await?;
    assert_eq!(res.status, StatusCode::OK, "body: {}", res.text);
    let names = res.json()["data"].clone();
    assert_eq!(names.as_object().map(|m| m.len()), Some(2));
    assert!(names.as_object().map(|m| m.values().any(|v| v == "TOEFL")).unwrap_or(false));

    let res = app.post("/api/elt-requirements", &admin_token(), json!({"name": ""})).await?;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}

#[tokio::test]
async fn failed_agency_delete_is_not_logged() -> Result<()> {
    let store = MemoryStore::new();
    store
        .seed("agencies", rows(vec![json!({"id": 1, "organization_name": "Acme Study"})]))
        .await;
    let app = TestApp::refusing_deletes(store, admin_oracle());

    let res = app.delete("/api/agencies/1", &admin_token()).await?;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR, "body: {}", res.text);
    assert_eq!(app.store.rows("agencies").await.len(), 1);
    assert!(app.activity().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn non_numeric_ids_use_the_error_envelope() -> Result<()> {
    let app = app_with(&[]).await;
    for (method, uri) in [
        (Method::GET, "/api/agencies/abc"),
        (Method::DELETE, "/api/agencies/1/notes/first"),
        (Method::GET, "/api/destinations/x/meta?type=1"),
    ] {
        let res = app.send(method, uri, Some(&admin_token()), None).await?;
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "{}: {}", uri, res.text);
        let body = res.json();
        assert_eq!(body["status"], json!("error"), "{}: {}", uri, res.text);
        assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
    }
    Ok(())
}
