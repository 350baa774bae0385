use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::auth::AuthUser, error::ApiError, model::role::Permission,
    utils::permission_cache,
};

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreatePermission {
    #[schema(example = "reports.export")]
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 255))]
    pub description: Option<String>,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct UpdatePermission {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 255))]
    pub description: Option<String>,
}

async fn fetch_permission(pool: &MySqlPool, id: u64) -> Result<Permission, ApiError> {
    sqlx::query_as::<_, Permission>(
        "SELECT id, name, description, created_at FROM permissions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound("Permission"))
}

#[utoipa::path(
    get,
    path = "/api/permissions",
    responses((status = 200, description = "All permissions", body = [Permission])),
    security(("bearer_auth" = [])),
    tag = "Permissions"
)]
pub async fn list_permissions(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;

    let permissions = sqlx::query_as::<_, Permission>(
        "SELECT id, name, description, created_at FROM permissions ORDER BY name",
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(permissions))
}

#[utoipa::path(
    get,
    path = "/api/permissions/{permission_id}",
    params(("permission_id" = u64, Path, description = "Permission ID")),
    responses(
        (status = 200, body = Permission),
        (status = 404, description = "Permission not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Permissions"
)]
pub async fn get_permission(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;
    let permission = fetch_permission(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(permission))
}

#[utoipa::path(
    post,
    path = "/api/permissions",
    request_body = CreatePermission,
    responses(
        (status = 201, body = Permission),
        (status = 409, description = "Name already taken"),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Permissions"
)]
pub async fn create_permission(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePermission>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;
    payload.validate()?;

    let result = sqlx::query("INSERT INTO permissions (name, description) VALUES (?, ?)")
        .bind(payload.name.trim())
        .bind(&payload.description)
        .execute(pool.get_ref())
        .await?;

    let permission = fetch_permission(pool.get_ref(), result.last_insert_id()).await?;
    Ok(HttpResponse::Created().json(permission))
}

#[utoipa::path(
    put,
    path = "/api/permissions/{permission_id}",
    params(("permission_id" = u64, Path, description = "Permission ID")),
    request_body = UpdatePermission,
    responses(
        (status = 200, body = Permission),
        (status = 404, description = "Permission not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Permissions"
)]
pub async fn update_permission(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdatePermission>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;
    payload.validate()?;

    let id = path.into_inner();
    let current = fetch_permission(pool.get_ref(), id).await?;

    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .unwrap_or(&current.name)
        .to_string();
    let description = payload.description.clone().or(current.description);

    sqlx::query("UPDATE permissions SET name = ?, description = ? WHERE id = ?")
        .bind(&name)
        .bind(&description)
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    permission_cache::invalidate_all();
    let permission = fetch_permission(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(permission))
}

#[utoipa::path(
    delete,
    path = "/api/permissions/{permission_id}",
    params(("permission_id" = u64, Path, description = "Permission ID")),
    responses(
        (status = 200, description = "Permission deleted"),
        (status = 404, description = "Permission not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Permissions"
)]
pub async fn delete_permission(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;

    let result = sqlx::query("DELETE FROM permissions WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Permission"));
    }

    permission_cache::invalidate_all();
    Ok(HttpResponse::Ok().json(json!({ "message": "Permission deleted" })))
}
