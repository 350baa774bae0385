use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::auth::AuthUser,
    error::ApiError,
    model::feature::{BusinessFeature, Feature},
    utils::feature_cache,
};

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateFeature {
    #[schema(example = "payslips")]
    #[validate(length(min = 1, max = 100, message = "feature_key must be 1-100 characters"))]
    pub feature_key: String,
    #[schema(example = "Payslips")]
    #[validate(length(min = 1, max = 255, message = "name is required"))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct UpdateFeature {
    #[validate(length(min = 1, max = 255, message = "name is required"))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ToggleFeature {
    #[schema(example = false)]
    pub enabled: bool,
}

async fn fetch_feature(pool: &MySqlPool, id: u64) -> Result<Feature, ApiError> {
    sqlx::query_as::<_, Feature>(
        "SELECT id, feature_key, name, description, created_at FROM features WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound("Feature"))
}

#[utoipa::path(
    get,
    path = "/api/features",
    responses((status = 200, description = "Feature catalogue", body = [Feature])),
    security(("bearer_auth" = [])),
    tag = "Features"
)]
pub async fn list_features(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;

    let features = sqlx::query_as::<_, Feature>(
        "SELECT id, feature_key, name, description, created_at FROM features ORDER BY id",
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(features))
}

#[utoipa::path(
    post,
    path = "/api/features",
    request_body = CreateFeature,
    responses(
        (status = 201, body = Feature),
        (status = 409, description = "Key already taken")
    ),
    security(("bearer_auth" = [])),
    tag = "Features"
)]
pub async fn create_feature(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateFeature>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;
    payload.validate()?;

    let key = payload.feature_key.trim().to_lowercase();
    let result =
        sqlx::query("INSERT INTO features (feature_key, name, description) VALUES (?, ?, ?)")
            .bind(&key)
            .bind(payload.name.trim())
            .bind(&payload.description)
            .execute(pool.get_ref())
            .await?;

    info!(feature = %key, "Feature created");
    let feature = fetch_feature(pool.get_ref(), result.last_insert_id()).await?;
    Ok(HttpResponse::Created().json(feature))
}

#[utoipa::path(
    put,
    path = "/api/features/{feature_id}",
    params(("feature_id" = u64, Path, description = "Feature ID")),
    request_body = UpdateFeature,
    responses(
        (status = 200, body = Feature),
        (status = 404, description = "Feature not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Features"
)]
pub async fn update_feature(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateFeature>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;
    payload.validate()?;

    let id = path.into_inner();
    let current = fetch_feature(pool.get_ref(), id).await?;
    let name = payload.name.clone().unwrap_or(current.name);
    let description = payload.description.clone().or(current.description);

    sqlx::query("UPDATE features SET name = ?, description = ? WHERE id = ?")
        .bind(&name)
        .bind(&description)
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    let feature = fetch_feature(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(feature))
}

#[utoipa::path(
    delete,
    path = "/api/features/{feature_id}",
    params(("feature_id" = u64, Path, description = "Feature ID")),
    responses(
        (status = 200, description = "Feature deleted"),
        (status = 404, description = "Feature not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Features"
)]
pub async fn delete_feature(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;

    let result = sqlx::query("DELETE FROM features WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Feature"));
    }

    feature_cache::invalidate_all();
    Ok(HttpResponse::Ok().json(json!({ "message": "Feature deleted" })))
}

#[utoipa::path(
    get,
    path = "/api/businesses/{business_id}/features",
    params(("business_id" = u64, Path, description = "Business ID")),
    responses(
        (status = 200, description = "Every feature with its toggle", body = [BusinessFeature]),
        (status = 403, description = "Not a member of this business")
    ),
    security(("bearer_auth" = [])),
    tag = "Features"
)]
pub async fn list_business_features(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let business_id = path.into_inner();
    auth.require_business_access(business_id)?;

    // features never toggled for this business read as disabled
    let rows = sqlx::query_as::<_, (u64, String, String, i64)>(
        r#"
        SELECT f.id, f.feature_key, f.name,
               CAST(COALESCE(bf.enabled, 0) AS SIGNED)
        FROM features f
        LEFT JOIN business_features bf
               ON bf.feature_id = f.id AND bf.business_id = ?
        ORDER BY f.id
        "#,
    )
    .bind(business_id)
    .fetch_all(pool.get_ref())
    .await?;

    let features: Vec<BusinessFeature> = rows
        .into_iter()
        .map(|(feature_id, feature_key, name, enabled)| BusinessFeature {
            feature_id,
            feature_key,
            name,
            enabled: enabled != 0,
        })
        .collect();

    Ok(HttpResponse::Ok().json(features))
}

#[utoipa::path(
    put,
    path = "/api/businesses/{business_id}/features/{feature_id}",
    params(
        ("business_id" = u64, Path, description = "Business ID"),
        ("feature_id" = u64, Path, description = "Feature ID")
    ),
    request_body = ToggleFeature,
    responses(
        (status = 200, description = "Toggle stored"),
        (status = 404, description = "Business or feature not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Features"
)]
pub async fn toggle_business_feature(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<(u64, u64)>,
    payload: web::Json<ToggleFeature>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;

    let (business_id, feature_id) = path.into_inner();

    let business_exists =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM businesses WHERE id = ?")
            .bind(business_id)
            .fetch_one(pool.get_ref())
            .await?;
    if business_exists == 0 {
        return Err(ApiError::NotFound("Business"));
    }
    fetch_feature(pool.get_ref(), feature_id).await?;

    sqlx::query(
        r#"
        INSERT INTO business_features (business_id, feature_id, enabled)
        VALUES (?, ?, ?)
        ON DUPLICATE KEY UPDATE enabled = VALUES(enabled)
        "#,
    )
    .bind(business_id)
    .bind(feature_id)
    .bind(payload.enabled)
    .execute(pool.get_ref())
    .await?;

    feature_cache::invalidate_all();
    info!(business_id, feature_id, enabled = payload.enabled, "Business feature toggled");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Feature updated",
        "enabled": payload.enabled
    })))
}

/// Turns every catalogue feature on for a freshly created business.
/// Runs on the caller's executor so it can share the creating transaction.
pub async fn enable_all_for_business<'e, E>(executor: E, business_id: u64) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::MySql>,
{
    sqlx::query(
        r#"
        INSERT INTO business_features (business_id, feature_id, enabled)
        SELECT ?, id, TRUE FROM features
        "#,
    )
    .bind(business_id)
    .execute(executor)
    .await?;
    Ok(())
}
