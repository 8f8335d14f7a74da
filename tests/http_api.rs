use actix_web::test::TestRequest;
use actix_web::{test, web, App};
use serde_json::{json, Value};
use uuid::Uuid;

use clip_ledger::api;
use clip_ledger::api::auth::Role;
use clip_ledger::store::LedgerStore;

mod support;

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(|cfg| api::configure(cfg, support::JWT_SECRET)),
        )
        .await
    };
}

#[actix_web::test]
async fn api_requires_a_valid_token() {
    let h = support::harness();
    let app = app!(h.state);

    let req = TestRequest::get().uri("/api/wallet").to_request();
    let err = test::try_call_service(&app, req).await.unwrap_err();
    assert_eq!(err.as_response_error().status_code(), 401);

    let req = TestRequest::get()
        .uri("/api/wallet")
        .insert_header(("Authorization", "Bearer not-a-jwt"))
        .to_request();
    let err = test::try_call_service(&app, req).await.unwrap_err();
    assert_eq!(err.as_response_error().status_code(), 401);

    let resp = err.error_response();
    let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["kind"], "unauthorized");
    assert_eq!(body["retry"], false);
}

#[actix_web::test]
async fn malformed_input_is_a_validation_error() {
    let h = support::harness();
    let clipper = Uuid::new_v4();
    let app = app!(h.state);

    let req = TestRequest::post()
        .uri("/api/declarations")
        .insert_header(support::bearer(clipper, Role::Clipper))
        .set_json(json!({
            "clip_url": "https://clips.example/c/lots",
            "declared_views": "lots",
            "rate_cpm": 3000
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["kind"], "validation");
    assert_eq!(body["retry"], false);

    let req = TestRequest::get()
        .uri("/api/declarations")
        .insert_header(support::bearer(clipper, Role::Clipper))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["kind"], "validation");

    let req = TestRequest::get()
        .uri("/api/declarations/not-a-uuid")
        .insert_header(support::bearer(clipper, Role::Clipper))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["kind"], "validation");
}

#[actix_web::test]
async fn clipper_declares_views_and_admin_pays() {
    let h = support::harness();
    let clipper = Uuid::new_v4();
    let admin = Uuid::new_v4();
    h.store.insert_user(clipper, Some("acct_clipper")).await;
    let app = app!(h.state);

    let req = TestRequest::post()
        .uri("/api/declarations")
        .insert_header(support::bearer(clipper, Role::Clipper))
        .set_json(json!({
            "clip_url": "https://clips.example/c/1",
            "declared_views": 5000,
            "rate_cpm": 3000
        }))
        .to_request();
    let declaration: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(declaration["earnings"], 15000);
    assert_eq!(declaration["status"], "pending");
    let id = declaration["id"].as_str().unwrap().to_string();

    // clippers cannot moderate
    let req = TestRequest::post()
        .uri(&format!("/api/admin/declarations/{id}/approve"))
        .insert_header(support::bearer(clipper, Role::Clipper))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let req = TestRequest::post()
        .uri(&format!("/api/admin/declarations/{id}/approve"))
        .insert_header(support::bearer(admin, Role::Admin))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["outcome"], "applied");
    assert_eq!(body["record"]["status"], "approved");

    let req = TestRequest::post()
        .uri(&format!("/api/admin/declarations/{id}/pay"))
        .insert_header(support::bearer(admin, Role::Admin))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["outcome"], "applied");
    assert_eq!(body["record"]["status"], "paid");

    let req = TestRequest::post()
        .uri(&format!("/api/admin/declarations/{id}/pay"))
        .insert_header(support::bearer(admin, Role::Admin))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["outcome"], "already_processed");

    assert_eq!(h.payments.calls().await.len(), 1);
}

#[actix_web::test]
async fn errors_carry_kind_and_status() {
    let h = support::harness();
    let clipper = Uuid::new_v4();
    let admin = Uuid::new_v4();
    let app = app!(h.state);

    let req = TestRequest::post()
        .uri("/api/declarations")
        .insert_header(support::bearer(clipper, Role::Clipper))
        .set_json(json!({
            "clip_url": "https://clips.example/c/2",
            "declared_views": -5,
            "rate_cpm": 3000
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["kind"], "validation");

    let req = TestRequest::post()
        .uri(&format!("/api/admin/declarations/{}/approve", Uuid::new_v4()))
        .insert_header(support::bearer(admin, Role::Admin))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let req = TestRequest::post()
        .uri("/api/declarations")
        .insert_header(support::bearer(clipper, Role::Clipper))
        .set_json(json!({
            "clip_url": "https://clips.example/c/3",
            "declared_views": 10,
            "rate_cpm": 3000
        }))
        .to_request();
    let declaration: Value = test::call_and_read_body_json(&app, req).await;
    let id = declaration["id"].as_str().unwrap().to_string();

    let req = TestRequest::post()
        .uri(&format!("/api/admin/declarations/{id}/pay"))
        .insert_header(support::bearer(admin, Role::Admin))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["kind"], "invalid_transition");
}

#[actix_web::test]
async fn clippers_only_read_their_own_declarations() {
    let h = support::harness();
    let owner = Uuid::new_v4();
    let other = Uuid::new_v4();
    let streamer = Uuid::new_v4();
    let app = app!(h.state);

    let req = TestRequest::post()
        .uri("/api/declarations")
        .insert_header(support::bearer(owner, Role::Clipper))
        .set_json(json!({
            "clip_url": "https://clips.example/c/mine",
            "declared_views": 100,
            "rate_cpm": 1000
        }))
        .to_request();
    let declaration: Value = test::call_and_read_body_json(&app, req).await;
    let id = declaration["id"].as_str().unwrap().to_string();

    let req = TestRequest::post()
        .uri("/api/declarations")
        .insert_header(support::bearer(other, Role::Clipper))
        .set_json(json!({
            "clip_url": "https://clips.example/c/mine",
            "declared_views": 300,
            "rate_cpm": 1000,
            "verification_code": "CLIP-OTHER"
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = TestRequest::get()
        .uri(&format!("/api/declarations/{id}"))
        .insert_header(support::bearer(other, Role::Clipper))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = TestRequest::get()
        .uri(&format!("/api/declarations/{id}"))
        .insert_header(support::bearer(streamer, Role::Streamer))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = TestRequest::get()
        .uri("/api/declarations?clip_url=https%3A%2F%2Fclips.example%2Fc%2Fmine")
        .insert_header(support::bearer(streamer, Role::Streamer))
        .to_request();
    let rows: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(rows.as_array().unwrap().len(), 2);

    // a clipper listing a shared clip only gets its own row back
    let req = TestRequest::get()
        .uri("/api/declarations?clip_url=https%3A%2F%2Fclips.example%2Fc%2Fmine")
        .insert_header(support::bearer(owner, Role::Clipper))
        .to_request();
    let rows: Value = test::call_and_read_body_json(&app, req).await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["clipper_id"], owner.to_string());

    let req = TestRequest::get()
        .uri(&format!("/api/clippers/{owner}/declarations"))
        .insert_header(support::bearer(owner, Role::Clipper))
        .to_request();
    let rows: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(rows.as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn withdrawal_flow_over_http() {
    let h = support::harness();
    let user = Uuid::new_v4();
    let admin = Uuid::new_v4();
    h.store.insert_user(user, Some("acct_user")).await;
    h.store.credit_wallet(user, 10_000).await.unwrap();
    let app = app!(h.state);

    let req = TestRequest::post()
        .uri("/api/withdrawals")
        .insert_header(support::bearer(user, Role::Clipper))
        .set_json(json!({ "amount": 20000, "method": "bank_transfer" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = TestRequest::post()
        .uri("/api/withdrawals")
        .insert_header(support::bearer(user, Role::Clipper))
        .set_json(json!({ "amount": 4000, "method": "debit_card" }))
        .to_request();
    let withdrawal: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(withdrawal["status"], "pending");
    let id = withdrawal["id"].as_str().unwrap().to_string();

    let req = TestRequest::get()
        .uri("/api/wallet")
        .insert_header(support::bearer(user, Role::Clipper))
        .to_request();
    let wallet: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(wallet["balance"], 6000);

    let req = TestRequest::post()
        .uri(&format!("/api/admin/withdrawals/{id}/process"))
        .insert_header(support::bearer(admin, Role::Admin))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["outcome"], "applied");
    assert_eq!(body["record"]["status"], "completed");

    let req = TestRequest::get()
        .uri("/api/withdrawals")
        .insert_header(support::bearer(user, Role::Clipper))
        .to_request();
    let rows: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(rows.as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn top_up_creates_a_checkout_session() {
    let h = support::harness();
    let user = Uuid::new_v4();
    let app = app!(h.state);

    let req = TestRequest::post()
        .uri("/api/top-ups")
        .insert_header(support::bearer(user, Role::Streamer))
        .set_json(json!({ "amount": 5000 }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["session_id"], "cs_test_1");
    assert!(body["session_url"].as_str().unwrap().starts_with("https://"));
    assert_eq!(h.payments.sessions().await, vec![(5000, user)]);

    // crediting waits for the webhook
    assert_eq!(h.store.get_or_create_wallet(user).await.unwrap().balance, 0);

    let req = TestRequest::post()
        .uri("/api/top-ups")
        .insert_header(support::bearer(user, Role::Streamer))
        .set_json(json!({ "amount": 0 }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}
