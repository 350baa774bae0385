#[macro_use]
mod common;

use actix_web::http::{StatusCode, header};
use actix_web::test::{self, TestRequest};
use serde_json::{Value, json};

fn get(uri: &str) -> TestRequest {
    TestRequest::get().uri(uri).peer_addr(common::peer())
}

fn post(uri: &str) -> TestRequest {
    TestRequest::post().uri(uri).peer_addr(common::peer())
}

fn put(uri: &str) -> TestRequest {
    TestRequest::put().uri(uri).peer_addr(common::peer())
}

fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {token}"))
}

#[actix_web::test]
async fn health_is_public() {
    let app = init_app!();

    let resp = test::call_service(&app, get("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
}

#[actix_web::test]
async fn protected_routes_need_a_token() {
    let app = init_app!();

    let resp = test::call_service(&app, get("/api/me").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Missing Authorization header");
}

#[actix_web::test]
async fn malformed_tokens_are_rejected() {
    let app = init_app!();

    let req = get("/api/users")
        .insert_header(bearer("not-a-jwt"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = get("/api/users")
        .insert_header((header::AUTHORIZATION, "Token abc"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn refresh_token_cannot_call_the_api() {
    let app = init_app!();
    let token = common::refresh_token(&common::subject(5, "owner", Some(1)));

    let req = get("/api/me").insert_header(bearer(&token)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn me_returns_the_token_identity() {
    let app = init_app!();
    let token = common::access_token(&common::subject(5, "owner", Some(3)));

    let req = get("/api/me").insert_header(bearer(&token)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["user_id"], 5);
    assert_eq!(body["email"], "owner@acme.test");
    assert_eq!(body["roles"], json!(["owner"]));
    assert_eq!(body["business_id"], 3);
}

#[actix_web::test]
async fn role_management_is_superadmin_only() {
    let app = init_app!();
    let token = common::access_token(&common::subject(5, "owner", Some(3)));

    let req = get("/api/roles").insert_header(bearer(&token)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = get("/api/businesses").insert_header(bearer(&token)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn invalid_user_payload_lists_field_errors() {
    let app = init_app!();
    let token = common::access_token(&common::subject(1, "superadmin", None));

    let req = post("/api/users")
        .insert_header(bearer(&token))
        .set_json(json!({
            "name": "",
            "email": "not-an-email",
            "password": "short"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "The given data was invalid");
    assert_eq!(body["errors"]["email"][0], "email must be a valid address");
    assert_eq!(body["errors"]["name"][0], "name is required");
    assert!(body["errors"]["password"].is_array());
}

#[actix_web::test]
async fn malformed_json_is_a_bad_request() {
    let app = init_app!();
    let token = common::access_token(&common::subject(1, "superadmin", None));

    let req = post("/api/users")
        .insert_header(bearer(&token))
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload("{ not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["message"].is_string());
}

#[actix_web::test]
async fn clock_in_requires_a_business() {
    let app = init_app!();
    let token = common::access_token(&common::subject(1, "superadmin", None));

    let req = post("/api/attendance/clock-in")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn money_requests_reject_bad_amounts_before_lookup() {
    let app = init_app!();
    let token = common::access_token(&common::subject(9, "employee", Some(3)));

    let req = post("/api/advances")
        .insert_header(bearer(&token))
        .set_json(json!({ "amount": -10.0 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["errors"]["amount"].is_array());
}

#[actix_web::test]
async fn claims_without_a_business_are_forbidden() {
    let app = init_app!();
    let token = common::access_token(&common::subject(1, "superadmin", None));

    let req = post("/api/claims")
        .insert_header(bearer(&token))
        .set_json(json!({
            "title": "Taxi",
            "expense_date": "2026-02-03",
            "amount": 12.5
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn non_numeric_ids_are_not_found() {
    let app = init_app!();
    let token = common::access_token(&common::subject(1, "superadmin", None));

    let req = get("/api/advances/latest")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn logout_without_a_token_is_a_no_op() {
    let app = init_app!();

    let resp = test::call_service(&app, post("/auth/logout").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn refresh_rejects_access_tokens() {
    let app = init_app!();
    let token = common::access_token(&common::subject(5, "owner", Some(1)));

    let req = post("/auth/refresh").insert_header(bearer(&token)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Refresh token required");
}

#[actix_web::test]
async fn malformed_payment_bodies_never_settle_the_balance() {
    let app = init_app!();
    let token = common::access_token(&common::subject(5, "owner", Some(3)));

    for uri in ["/api/advances/1/pay", "/api/claims/1/pay"] {
        for body in [r#"{"amount":"40"}"#, r#"{"amount":40,}"#, "{ not json"] {
            let req = put(uri)
                .insert_header(bearer(&token))
                .insert_header((header::CONTENT_TYPE, "application/json"))
                .set_payload(body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri} {body}");

            let body: Value = test::read_body_json(resp).await;
            assert!(body["message"].is_string());
        }
    }
}

#[actix_web::test]
async fn malformed_clock_in_body_is_a_bad_request() {
    let app = init_app!();
    let token = common::access_token(&common::subject(9, "employee", Some(3)));

    let req = post("/api/attendance/clock-in")
        .insert_header(bearer(&token))
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload(r#"{"notes": 5}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
