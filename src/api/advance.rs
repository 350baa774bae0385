use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    api::{
        lifecycle::{self, MoneyRequest, PaymentRequest, RequestQuery},
        optional_json,
    },
    auth::auth::AuthUser,
    error::ApiError,
    model::{
        advance::Advance,
        request_status::{RequestStatus, normalize_amount},
    },
    utils::{db_utils::AdvancePage, feature_cache::require_feature},
};

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateAdvance {
    #[schema(example = 500.0)]
    pub amount: f64,
    #[schema(example = "Medical bills")]
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
    /// Defaults to today
    #[schema(example = "2026-02-01", value_type = Option<String>, format = "date")]
    pub request_date: Option<NaiveDate>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct UpdateAdvance {
    pub amount: Option<f64>,
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
    #[schema(value_type = Option<String>, format = "date")]
    pub request_date: Option<NaiveDate>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/advances",
    params(RequestQuery),
    responses((status = 200, description = "Paginated advances", body = AdvancePage)),
    security(("bearer_auth" = [])),
    tag = "Advances"
)]
pub async fn list_advances(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RequestQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = lifecycle::list::<Advance>(pool.get_ref(), &auth, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/advances/{advance_id}",
    params(("advance_id" = u64, Path, description = "Advance ID")),
    responses(
        (status = 200, body = Advance),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Advance not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Advances"
)]
pub async fn get_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let advance =
        lifecycle::fetch_visible::<Advance>(pool.get_ref(), &auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(advance))
}

#[utoipa::path(
    post,
    path = "/api/advances",
    request_body = CreateAdvance,
    responses(
        (status = 201, description = "Advance requested", body = Advance),
        (status = 403, description = "No business profile or advances disabled"),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Advances"
)]
pub async fn create_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateAdvance>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;
    let amount = normalize_amount(payload.amount)?;

    let business_id = auth.require_business()?;
    require_feature(pool.get_ref(), &auth, business_id, Advance::FEATURE).await?;

    let request_date = payload
        .request_date
        .unwrap_or_else(|| Local::now().date_naive());

    let result = sqlx::query(
        r#"
        INSERT INTO advances
        (user_id, business_id, amount, remaining_amount, reason, request_date, status, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(business_id)
    .bind(amount)
    .bind(amount)
    .bind(&payload.reason)
    .bind(request_date)
    .bind(RequestStatus::Pending.as_ref())
    .bind(&payload.notes)
    .execute(pool.get_ref())
    .await?;

    info!(user_id = auth.user_id, business_id, amount, "Advance requested");
    let advance = lifecycle::fetch::<Advance>(pool.get_ref(), result.last_insert_id()).await?;
    Ok(HttpResponse::Created().json(advance))
}

#[utoipa::path(
    put,
    path = "/api/advances/{advance_id}",
    params(("advance_id" = u64, Path, description = "Advance ID")),
    request_body = UpdateAdvance,
    responses(
        (status = 200, description = "Advance updated", body = Advance),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "No longer pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Advances"
)]
pub async fn update_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateAdvance>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;
    let current =
        lifecycle::fetch_editable::<Advance>(pool.get_ref(), &auth, path.into_inner()).await?;

    let amount = match payload.amount {
        Some(amount) => normalize_amount(amount)?,
        None => current.amount,
    };
    let reason = payload.reason.clone().or(current.reason);
    let request_date = payload.request_date.unwrap_or(current.request_date);
    let notes = payload.notes.clone().or(current.notes);

    let result = sqlx::query(
        r#"
        UPDATE advances
        SET amount = ?, remaining_amount = ?, reason = ?, request_date = ?, notes = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(amount)
    .bind(amount)
    .bind(&reason)
    .bind(request_date)
    .bind(&notes)
    .bind(current.id)
    .bind(RequestStatus::Pending.as_ref())
    .execute(pool.get_ref())
    .await?;

    let advance = lifecycle::fetch::<Advance>(pool.get_ref(), current.id).await?;
    if result.rows_affected() == 0 {
        // unchanged values also report zero rows
        RequestStatus::parse(&advance.status)?.ensure_editable()?;
    }

    Ok(HttpResponse::Ok().json(advance))
}

#[utoipa::path(
    delete,
    path = "/api/advances/{advance_id}",
    params(("advance_id" = u64, Path, description = "Advance ID")),
    responses(
        (status = 200, description = "Advance deleted"),
        (status = 404, description = "Advance not found"),
        (status = 409, description = "No longer pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Advances"
)]
pub async fn delete_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    lifecycle::delete::<Advance>(pool.get_ref(), &auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Advance deleted" })))
}

#[utoipa::path(
    put,
    path = "/api/advances/{advance_id}/approve",
    params(("advance_id" = u64, Path, description = "Advance ID")),
    responses(
        (status = 200, description = "Advance approved", body = Advance),
        (status = 409, description = "Not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Advances"
)]
pub async fn approve_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let advance = lifecycle::decide::<Advance>(
        pool.get_ref(),
        &auth,
        path.into_inner(),
        RequestStatus::Approved,
    )
    .await?;
    Ok(HttpResponse::Ok().json(advance))
}

#[utoipa::path(
    put,
    path = "/api/advances/{advance_id}/reject",
    params(("advance_id" = u64, Path, description = "Advance ID")),
    responses(
        (status = 200, description = "Advance rejected", body = Advance),
        (status = 409, description = "Not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Advances"
)]
pub async fn reject_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let advance = lifecycle::decide::<Advance>(
        pool.get_ref(),
        &auth,
        path.into_inner(),
        RequestStatus::Rejected,
    )
    .await?;
    Ok(HttpResponse::Ok().json(advance))
}

#[utoipa::path(
    put,
    path = "/api/advances/{advance_id}/pay",
    params(("advance_id" = u64, Path, description = "Advance ID")),
    request_body = PaymentRequest,
    responses(
        (status = 200, description = "Payment recorded", body = Advance),
        (status = 409, description = "Not approved"),
        (status = 422, description = "Amount exceeds the remaining balance")
    ),
    security(("bearer_auth" = [])),
    tag = "Advances"
)]
pub async fn pay_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let PaymentRequest { amount } = optional_json(&body)?;
    let advance =
        lifecycle::pay::<Advance>(pool.get_ref(), &auth, path.into_inner(), amount).await?;
    Ok(HttpResponse::Ok().json(advance))
}
