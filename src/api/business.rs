use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    api::feature::enable_all_for_business,
    auth::auth::AuthUser,
    error::ApiError,
    model::{business::Business, role::perm},
    utils::db_utils::{
        BusinessPage, Filters, Paginated, Pagination, bind_query_as, bind_scalar, build_update_sql,
        execute_update,
    },
};

const BUSINESS_COLUMNS: &str =
    "id, name, email, phone, address, owner_id, is_active, created_at, updated_at";

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateBusiness {
    #[schema(example = "Acme Bakery")]
    #[validate(length(min = 1, max = 255, message = "name is required"))]
    pub name: String,
    #[schema(example = "hello@acme.test", format = "email")]
    #[validate(email(message = "email must be a valid address"))]
    pub email: Option<String>,
    #[schema(example = "+8801712345678")]
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    /// Existing user who owns the business
    pub owner_id: Option<u64>,
}

/// Only present fields are written.
#[derive(Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateBusiness {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 255, message = "name is required"))]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "email must be a valid address"))]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500))]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// Columns an owner may change; superadmins may also reassign and deactivate.
const OWNER_EDITABLE: &[&str] = &["name", "email", "phone", "address"];
const SUPERADMIN_EDITABLE: &[&str] = &["name", "email", "phone", "address", "owner_id", "is_active"];

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct BusinessQuery {
    /// Page number (starts at 1)
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Matches name or email
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

pub(crate) async fn fetch_business(pool: &MySqlPool, id: u64) -> Result<Business, ApiError> {
    let sql = format!("SELECT {BUSINESS_COLUMNS} FROM businesses WHERE id = ?");
    sqlx::query_as::<_, Business>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Business"))
}

#[utoipa::path(
    get,
    path = "/api/businesses",
    params(BusinessQuery),
    responses(
        (status = 200, description = "Paginated business list", body = BusinessPage),
        (status = 403, description = "Superadmin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Businesses"
)]
pub async fn list_businesses(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<BusinessQuery>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;

    let pagination = Pagination::new(query.page, query.per_page);

    let mut filters = Filters::new();
    filters
        .eq("is_active", query.is_active)
        .search(&["name", "email"], query.search.as_deref());
    let where_clause = filters.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM businesses{where_clause}");
    debug!(sql = %count_sql, "Counting businesses");
    let total = bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql), filters.values())
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, sql = %count_sql, "Failed to count businesses");
            ApiError::Internal
        })?;

    let data_sql = format!(
        "SELECT {BUSINESS_COLUMNS} FROM businesses{where_clause} ORDER BY id DESC LIMIT ? OFFSET ?"
    );
    let businesses = bind_query_as(sqlx::query_as::<_, Business>(&data_sql), filters.values())
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, sql = %data_sql, "Failed to fetch businesses");
            ApiError::Internal
        })?;

    Ok(HttpResponse::Ok().json(Paginated::new(businesses, pagination, total)))
}

#[utoipa::path(
    get,
    path = "/api/businesses/{business_id}",
    params(("business_id" = u64, Path, description = "Business ID")),
    responses(
        (status = 200, body = Business),
        (status = 403, description = "Not a member of this business"),
        (status = 404, description = "Business not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Businesses"
)]
pub async fn get_business(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let business_id = path.into_inner();
    auth.require_business_access(business_id)?;

    let business = fetch_business(pool.get_ref(), business_id).await?;
    Ok(HttpResponse::Ok().json(business))
}

#[utoipa::path(
    post,
    path = "/api/businesses",
    request_body = CreateBusiness,
    responses(
        (status = 201, description = "Business created", body = Business),
        (status = 403, description = "Superadmin only"),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Businesses"
)]
pub async fn create_business(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateBusiness>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;
    payload.validate()?;

    let mut tx = pool.begin().await?;

    if let Some(owner_id) = payload.owner_id {
        let known: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(owner_id)
            .fetch_one(&mut *tx)
            .await?;
        if known == 0 {
            return Err(ApiError::invalid("owner_id", "owner_id does not match any user"));
        }
    }

    let result = sqlx::query(
        r#"
        INSERT INTO businesses (name, email, phone, address, owner_id)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&payload.address)
    .bind(payload.owner_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to create business");
        ApiError::from(e)
    })?;
    let business_id = result.last_insert_id();

    // the owner joins the business they own
    if let Some(owner_id) = payload.owner_id {
        sqlx::query("UPDATE users SET business_id = ? WHERE id = ?")
            .bind(business_id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
    }

    enable_all_for_business(&mut *tx, business_id).await?;
    tx.commit().await?;
    info!(business_id, by = auth.user_id, "Business created");

    let business = fetch_business(pool.get_ref(), business_id).await?;
    Ok(HttpResponse::Created().json(business))
}

#[utoipa::path(
    put,
    path = "/api/businesses/{business_id}",
    params(("business_id" = u64, Path, description = "Business ID")),
    request_body = UpdateBusiness,
    responses(
        (status = 200, description = "Business updated", body = Business),
        (status = 400, description = "Field not editable by caller"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Business not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Businesses"
)]
pub async fn update_business(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateBusiness>,
) -> Result<HttpResponse, ApiError> {
    let business_id = path.into_inner();
    auth.require_business_access(business_id)?;
    auth.require_permission(pool.get_ref(), perm::BUSINESSES_MANAGE).await?;
    payload.validate()?;

    let allowed = if auth.is_superadmin() {
        SUPERADMIN_EDITABLE
    } else {
        OWNER_EDITABLE
    };

    let body = serde_json::to_value(&*payload).map_err(|e| {
        error!(error = %e, "Failed to serialise business update");
        ApiError::Internal
    })?;
    let update = build_update_sql("businesses", &body, allowed, "id", business_id)?;

    // zero rows also means unchanged values; the fetch below settles existence
    execute_update(pool.get_ref(), update).await?;
    info!(business_id, by = auth.user_id, "Business updated");

    let business = fetch_business(pool.get_ref(), business_id).await?;
    Ok(HttpResponse::Ok().json(business))
}

#[utoipa::path(
    delete,
    path = "/api/businesses/{business_id}",
    params(("business_id" = u64, Path, description = "Business ID")),
    responses(
        (status = 200, description = "Business deleted"),
        (status = 404, description = "Business not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Businesses"
)]
pub async fn delete_business(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;

    let business_id = path.into_inner();
    let result = sqlx::query("DELETE FROM businesses WHERE id = ?")
        .bind(business_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Business"));
    }

    info!(business_id, by = auth.user_id, "Business deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Business deleted" })))
}
