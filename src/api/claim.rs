use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
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
        claim::Claim,
        request_status::{RequestStatus, normalize_amount},
    },
    utils::{db_utils::ClaimPage, feature_cache::require_feature},
};

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateClaim {
    #[schema(example = "Client lunch")]
    #[validate(length(min = 1, max = 255, message = "title is required"))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[schema(example = "meals")]
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[schema(example = "2026-02-03", value_type = String, format = "date")]
    pub expense_date: NaiveDate,
    #[schema(example = 82.5)]
    pub amount: f64,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct UpdateClaim {
    #[validate(length(min = 1, max = 255, message = "title is required"))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[schema(value_type = Option<String>, format = "date")]
    pub expense_date: Option<NaiveDate>,
    pub amount: Option<f64>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/claims",
    params(RequestQuery),
    responses((status = 200, description = "Paginated claims", body = ClaimPage)),
    security(("bearer_auth" = [])),
    tag = "Claims"
)]
pub async fn list_claims(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RequestQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = lifecycle::list::<Claim>(pool.get_ref(), &auth, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/claims/{claim_id}",
    params(("claim_id" = u64, Path, description = "Claim ID")),
    responses(
        (status = 200, body = Claim),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Claim not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Claims"
)]
pub async fn get_claim(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let claim = lifecycle::fetch_visible::<Claim>(pool.get_ref(), &auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(claim))
}

#[utoipa::path(
    post,
    path = "/api/claims",
    request_body = CreateClaim,
    responses(
        (status = 201, description = "Claim submitted", body = Claim),
        (status = 403, description = "No business profile or claims disabled"),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Claims"
)]
pub async fn create_claim(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateClaim>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;
    let amount = normalize_amount(payload.amount)?;

    let business_id = auth.require_business()?;
    require_feature(pool.get_ref(), &auth, business_id, Claim::FEATURE).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO claims
        (user_id, business_id, title, description, category, expense_date,
         amount, remaining_amount, status, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(business_id)
    .bind(payload.title.trim())
    .bind(&payload.description)
    .bind(&payload.category)
    .bind(payload.expense_date)
    .bind(amount)
    .bind(amount)
    .bind(RequestStatus::Pending.as_ref())
    .bind(&payload.notes)
    .execute(pool.get_ref())
    .await?;

    info!(user_id = auth.user_id, business_id, amount, "Claim submitted");
    let claim = lifecycle::fetch::<Claim>(pool.get_ref(), result.last_insert_id()).await?;
    Ok(HttpResponse::Created().json(claim))
}

#[utoipa::path(
    put,
    path = "/api/claims/{claim_id}",
    params(("claim_id" = u64, Path, description = "Claim ID")),
    request_body = UpdateClaim,
    responses(
        (status = 200, description = "Claim updated", body = Claim),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "No longer pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Claims"
)]
pub async fn update_claim(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateClaim>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;
    let current =
        lifecycle::fetch_editable::<Claim>(pool.get_ref(), &auth, path.into_inner()).await?;

    let amount = match payload.amount {
        Some(amount) => normalize_amount(amount)?,
        None => current.amount,
    };
    let title = payload
        .title
        .as_deref()
        .map(|t| t.trim().to_string())
        .unwrap_or(current.title);
    let description = payload.description.clone().or(current.description);
    let category = payload.category.clone().or(current.category);
    let expense_date = payload.expense_date.unwrap_or(current.expense_date);
    let notes = payload.notes.clone().or(current.notes);

    let result = sqlx::query(
        r#"
        UPDATE claims
        SET title = ?, description = ?, category = ?, expense_date = ?,
            amount = ?, remaining_amount = ?, notes = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(&title)
    .bind(&description)
    .bind(&category)
    .bind(expense_date)
    .bind(amount)
    .bind(amount)
    .bind(&notes)
    .bind(current.id)
    .bind(RequestStatus::Pending.as_ref())
    .execute(pool.get_ref())
    .await?;

    let claim = lifecycle::fetch::<Claim>(pool.get_ref(), current.id).await?;
    if result.rows_affected() == 0 {
        RequestStatus::parse(&claim.status)?.ensure_editable()?;
    }

    Ok(HttpResponse::Ok().json(claim))
}

#[utoipa::path(
    delete,
    path = "/api/claims/{claim_id}",
    params(("claim_id" = u64, Path, description = "Claim ID")),
    responses(
        (status = 200, description = "Claim deleted"),
        (status = 404, description = "Claim not found"),
        (status = 409, description = "No longer pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Claims"
)]
pub async fn delete_claim(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    lifecycle::delete::<Claim>(pool.get_ref(), &auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Claim deleted" })))
}

#[utoipa::path(
    put,
    path = "/api/claims/{claim_id}/approve",
    params(("claim_id" = u64, Path, description = "Claim ID")),
    responses(
        (status = 200, description = "Claim approved", body = Claim),
        (status = 409, description = "Not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Claims"
)]
pub async fn approve_claim(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let claim =
        lifecycle::decide::<Claim>(pool.get_ref(), &auth, path.into_inner(), RequestStatus::Approved)
            .await?;
    Ok(HttpResponse::Ok().json(claim))
}

#[utoipa::path(
    put,
    path = "/api/claims/{claim_id}/reject",
    params(("claim_id" = u64, Path, description = "Claim ID")),
    responses(
        (status = 200, description = "Claim rejected", body = Claim),
        (status = 409, description = "Not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Claims"
)]
pub async fn reject_claim(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let claim =
        lifecycle::decide::<Claim>(pool.get_ref(), &auth, path.into_inner(), RequestStatus::Rejected)
            .await?;
    Ok(HttpResponse::Ok().json(claim))
}

#[utoipa::path(
    put,
    path = "/api/claims/{claim_id}/pay",
    params(("claim_id" = u64, Path, description = "Claim ID")),
    request_body = PaymentRequest,
    responses(
        (status = 200, description = "Reimbursement recorded", body = Claim),
        (status = 409, description = "Not approved"),
        (status = 422, description = "Amount exceeds the remaining balance")
    ),
    security(("bearer_auth" = [])),
    tag = "Claims"
)]
pub async fn pay_claim(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let PaymentRequest { amount } = optional_json(&body)?;
    let claim = lifecycle::pay::<Claim>(pool.get_ref(), &auth, path.into_inner(), amount).await?;
    Ok(HttpResponse::Ok().json(claim))
}
