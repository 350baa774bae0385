//! Runs against a real MySQL schema. Point `TEST_DATABASE_URL` at a
//! scratch database and run with `cargo test -- --ignored`.

#[macro_use]
mod common;

use actix_web::http::{StatusCode, header};
use actix_web::test::{self, TestRequest};
use serde_json::{Value, json};
use sqlx::MySqlPool;

async fn migrated_pool() -> MySqlPool {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let pool = MySqlPool::connect(&url).await.expect("connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("apply migrations");
    pool
}

macro_rules! init_db_app {
    ($pool:expr) => {{
        let config = common::config();
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($pool.clone()))
                .app_data(actix_web::web::Data::new(config.clone()))
                .configure(move |cfg| biz_portal::routes::configure(cfg, config)),
        )
        .await
    }};
}

fn create_business(token: &str, body: Value) -> TestRequest {
    TestRequest::post()
        .uri("/api/businesses")
        .peer_addr(common::peer())
        .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
        .set_json(body)
}

#[actix_web::test]
#[ignore = "needs TEST_DATABASE_URL"]
async fn new_business_starts_with_every_feature_enabled() {
    let pool = migrated_pool().await;
    let app = init_db_app!(pool);
    let token = common::access_token(&common::subject(1, "superadmin", None));
    let name = format!("Bakery {}", uuid::Uuid::new_v4());

    let req = create_business(&token, json!({ "name": name })).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let business: Value = test::read_body_json(resp).await;
    let business_id = business["id"].as_u64().expect("business id");

    let catalogue: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM features")
        .fetch_one(&pool)
        .await
        .unwrap();
    let enabled: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM business_features WHERE business_id = ? AND enabled = TRUE",
    )
    .bind(business_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(enabled, catalogue);
}

#[actix_web::test]
#[ignore = "needs TEST_DATABASE_URL"]
async fn unknown_owner_leaves_no_business_behind() {
    let pool = migrated_pool().await;
    let app = init_db_app!(pool);
    let token = common::access_token(&common::subject(1, "superadmin", None));
    let name = format!("Orphan {}", uuid::Uuid::new_v4());

    let req = create_business(&token, json!({ "name": name, "owner_id": 4_000_000_000u64 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["errors"]["owner_id"][0], "owner_id does not match any user");

    let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM businesses WHERE name = ?")
        .bind(&name)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(left, 0);
}
