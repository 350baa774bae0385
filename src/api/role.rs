use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::auth::AuthUser,
    error::ApiError,
    model::role::{Role, SystemRole},
    utils::{db_utils::in_placeholders, permission_cache},
};

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateRole {
    #[schema(example = "auditor")]
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    #[schema(example = "Read-only access to finances")]
    #[validate(length(max = 255))]
    pub description: Option<String>,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct UpdateRole {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 255))]
    pub description: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct SyncPermissions {
    #[schema(example = json!(["claims.view", "advances.view"]))]
    pub permissions: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct RoleDetail {
    #[serde(flatten)]
    pub role: Role,
    #[schema(example = json!(["claims.view"]))]
    pub permissions: Vec<String>,
}

// -------------------- helpers shared with users/auth --------------------

pub async fn load_user_roles(pool: &MySqlPool, user_id: u64) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT r.name
        FROM roles r
        JOIN user_roles ur ON ur.role_id = r.id
        WHERE ur.user_id = ?
        ORDER BY r.name
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Names from `names` with no matching role row.
pub async fn missing_roles(pool: &MySqlPool, names: &[String]) -> Result<Vec<String>, sqlx::Error> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT name FROM roles WHERE name IN ({})",
        in_placeholders(names.len())
    );
    let mut q = sqlx::query_scalar::<_, String>(&sql);
    for name in names {
        q = q.bind(name);
    }
    let found = q.fetch_all(pool).await?;

    Ok(names
        .iter()
        .filter(|n| !found.contains(n))
        .cloned()
        .collect())
}

/// Replaces the role set of a user. Unknown names are ignored.
pub async fn assign_roles(
    pool: &MySqlPool,
    user_id: u64,
    names: &[String],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    if !names.is_empty() {
        let sql = format!(
            "INSERT INTO user_roles (user_id, role_id) SELECT ?, id FROM roles WHERE name IN ({})",
            in_placeholders(names.len())
        );
        let mut q = sqlx::query(&sql).bind(user_id);
        for name in names {
            q = q.bind(name);
        }
        q.execute(&mut *tx).await?;
    }

    tx.commit().await
}

async fn fetch_role(pool: &MySqlPool, role_id: u64) -> Result<Role, ApiError> {
    sqlx::query_as::<_, Role>("SELECT id, name, description, created_at FROM roles WHERE id = ?")
        .bind(role_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Role"))
}

async fn role_permissions(pool: &MySqlPool, role_id: u64) -> Result<Vec<String>, ApiError> {
    Ok(sqlx::query_scalar::<_, String>(
        r#"
        SELECT p.name
        FROM permissions p
        JOIN role_permissions rp ON rp.permission_id = p.id
        WHERE rp.role_id = ?
        ORDER BY p.name
        "#,
    )
    .bind(role_id)
    .fetch_all(pool)
    .await?)
}

// -------------------- handlers --------------------

#[utoipa::path(
    get,
    path = "/api/roles",
    responses(
        (status = 200, description = "All roles", body = [Role]),
        (status = 403, description = "Superadmin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn list_roles(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;

    let roles = sqlx::query_as::<_, Role>(
        "SELECT id, name, description, created_at FROM roles ORDER BY id",
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(roles))
}

#[utoipa::path(
    get,
    path = "/api/roles/{role_id}",
    params(("role_id" = u64, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Role with its permissions", body = RoleDetail),
        (status = 404, description = "Role not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn get_role(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;

    let role_id = path.into_inner();
    let role = fetch_role(pool.get_ref(), role_id).await?;
    let permissions = role_permissions(pool.get_ref(), role_id).await?;

    Ok(HttpResponse::Ok().json(RoleDetail { role, permissions }))
}

#[utoipa::path(
    post,
    path = "/api/roles",
    request_body = CreateRole,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 409, description = "Name already taken"),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn create_role(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateRole>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;
    payload.validate()?;

    let name = payload.name.trim().to_lowercase();
    let result = sqlx::query("INSERT INTO roles (name, description) VALUES (?, ?)")
        .bind(&name)
        .bind(&payload.description)
        .execute(pool.get_ref())
        .await?;

    info!(role = %name, by = auth.user_id, "Role created");
    let role = fetch_role(pool.get_ref(), result.last_insert_id()).await?;
    Ok(HttpResponse::Created().json(role))
}

#[utoipa::path(
    put,
    path = "/api/roles/{role_id}",
    params(("role_id" = u64, Path, description = "Role ID")),
    request_body = UpdateRole,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 404, description = "Role not found"),
        (status = 409, description = "System roles cannot be renamed")
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn update_role(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateRole>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;
    payload.validate()?;

    let role_id = path.into_inner();
    let current = fetch_role(pool.get_ref(), role_id).await?;

    let name = match &payload.name {
        Some(n) => n.trim().to_lowercase(),
        None => current.name.clone(),
    };
    if name != current.name && SystemRole::is_system_name(&current.name) {
        return Err(ApiError::conflict("System roles cannot be renamed"));
    }
    let description = payload.description.clone().or(current.description);

    sqlx::query("UPDATE roles SET name = ?, description = ? WHERE id = ?")
        .bind(&name)
        .bind(&description)
        .bind(role_id)
        .execute(pool.get_ref())
        .await?;

    permission_cache::invalidate_all();
    let role = fetch_role(pool.get_ref(), role_id).await?;
    Ok(HttpResponse::Ok().json(role))
}

#[utoipa::path(
    delete,
    path = "/api/roles/{role_id}",
    params(("role_id" = u64, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Role deleted"),
        (status = 404, description = "Role not found"),
        (status = 409, description = "System roles cannot be deleted")
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn delete_role(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;

    let role_id = path.into_inner();
    let role = fetch_role(pool.get_ref(), role_id).await?;
    if SystemRole::is_system_name(&role.name) {
        return Err(ApiError::conflict("System roles cannot be deleted"));
    }

    sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(role_id)
        .execute(pool.get_ref())
        .await?;

    permission_cache::invalidate_all();
    info!(role = %role.name, by = auth.user_id, "Role deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Role deleted" })))
}

#[utoipa::path(
    put,
    path = "/api/roles/{role_id}/permissions",
    params(("role_id" = u64, Path, description = "Role ID")),
    request_body = SyncPermissions,
    responses(
        (status = 200, description = "Permissions replaced", body = RoleDetail),
        (status = 404, description = "Role not found"),
        (status = 422, description = "Unknown permission names")
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn sync_role_permissions(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<SyncPermissions>,
) -> Result<HttpResponse, ApiError> {
    auth.require_superadmin()?;

    let role_id = path.into_inner();
    let role = fetch_role(pool.get_ref(), role_id).await?;

    let mut names: Vec<String> = payload.permissions.iter().map(|p| p.trim().to_string()).collect();
    names.sort();
    names.dedup();

    if !names.is_empty() {
        let sql = format!(
            "SELECT name FROM permissions WHERE name IN ({})",
            in_placeholders(names.len())
        );
        let mut q = sqlx::query_scalar::<_, String>(&sql);
        for name in &names {
            q = q.bind(name);
        }
        let found = q.fetch_all(pool.get_ref()).await?;
        let unknown: Vec<_> = names.iter().filter(|n| !found.contains(n)).cloned().collect();
        if !unknown.is_empty() {
            return Err(ApiError::invalid(
                "permissions",
                format!("Unknown permissions: {}", unknown.join(", ")),
            ));
        }
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
        .bind(role_id)
        .execute(&mut *tx)
        .await?;
    if !names.is_empty() {
        let sql = format!(
            "INSERT INTO role_permissions (role_id, permission_id) SELECT ?, id FROM permissions WHERE name IN ({})",
            in_placeholders(names.len())
        );
        let mut q = sqlx::query(&sql).bind(role_id);
        for name in &names {
            q = q.bind(name);
        }
        q.execute(&mut *tx).await?;
    }
    tx.commit().await?;

    permission_cache::invalidate_all();
    info!(role = %role.name, count = names.len(), "Role permissions synced");

    Ok(HttpResponse::Ok().json(RoleDetail {
        role,
        permissions: names,
    }))
}
