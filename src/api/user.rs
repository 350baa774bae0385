use std::collections::HashMap;

use actix_web::{HttpResponse, web};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    api::role::{assign_roles, load_user_roles, missing_roles},
    auth::{auth::AuthUser, password::hash_password},
    error::ApiError,
    model::{
        role::{SystemRole, perm},
        user::User,
    },
    utils::{
        db_utils::{
            Filters, Paginated, Pagination, SqlValue, UserPage, bind_query_as, bind_scalar,
            build_update_sql, execute_update, in_placeholders,
        },
        email_cache, email_filter,
    },
};

const USER_COLUMNS: &str = "id, business_id, name, email, phone, position, password, is_active, \
                            last_login_at, created_at, updated_at";

/// Columns a user may change on their own profile.
const SELF_EDITABLE: &[&str] = &["name", "email", "phone", "position", "password"];
const MANAGER_EDITABLE: &[&str] = &["name", "email", "phone", "position", "password", "is_active"];

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: u64,
    pub business_id: Option<u64>,
    #[schema(example = "Rahim Uddin")]
    pub name: String,
    #[schema(example = "rahim@acme.test", format = "email")]
    pub email: String,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub is_active: bool,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_login_at: Option<NaiveDateTime>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: NaiveDateTime,
    #[schema(example = json!(["employee"]))]
    pub roles: Vec<String>,
}

impl UserResponse {
    fn new(user: User, roles: Vec<String>) -> Self {
        Self {
            id: user.id,
            business_id: user.business_id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            position: user.position,
            is_active: user.is_active,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
            updated_at: user.updated_at,
            roles,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct UserQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Superadmins only; everyone else sees their own business
    pub business_id: Option<u64>,
    /// Role name
    pub role: Option<String>,
    pub is_active: Option<bool>,
    /// Matches name or email
    pub search: Option<String>,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    #[schema(example = "Rahim Uddin")]
    #[validate(length(min = 1, max = 255, message = "name is required"))]
    pub name: String,
    #[schema(example = "rahim@acme.test", format = "email")]
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    #[schema(example = "s3cret-pass", format = "password")]
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(length(max = 100))]
    pub position: Option<String>,
    /// Defaults to the caller's business; only superadmins may pick another
    pub business_id: Option<u64>,
    /// Defaults to `employee`
    #[schema(example = json!(["employee"]))]
    pub roles: Option<Vec<String>>,
}

#[derive(Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateUser {
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
    #[validate(length(max = 100))]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct SyncRoles {
    #[schema(example = json!(["manager"]))]
    pub roles: Vec<String>,
}

// -------------------- helpers --------------------

pub(crate) async fn fetch_user(pool: &MySqlPool, id: u64) -> Result<User, ApiError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("User"))
}

async fn user_response(pool: &MySqlPool, id: u64) -> Result<UserResponse, ApiError> {
    let user = fetch_user(pool, id).await?;
    let roles = load_user_roles(pool, id).await?;
    Ok(UserResponse::new(user, roles))
}

/// Users without a business are only reachable by superadmins.
fn ensure_same_business(auth: &AuthUser, target: Option<u64>) -> Result<(), ApiError> {
    match target {
        Some(business_id) => auth.require_business_access(business_id),
        None => auth.require_superadmin(),
    }
}

/// Cuckoo filter first (a miss means free), then the taken-cache, then MySQL.
async fn ensure_email_available(pool: &MySqlPool, email: &str) -> Result<(), ApiError> {
    let taken = ApiError::invalid("email", "The email has already been taken");

    if !email_filter::might_exist(email) {
        return Ok(());
    }
    if email_cache::owner_of(email).await.is_some() {
        return Err(taken);
    }

    let owner = sqlx::query_scalar::<_, u64>("SELECT id FROM users WHERE email = ? LIMIT 1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    if let Some(owner) = owner {
        email_cache::remember(email, owner).await;
        return Err(taken);
    }
    Ok(())
}

/// Deduplicated role names; unknown names and forbidden grants are rejected.
async fn checked_roles(
    pool: &MySqlPool,
    auth: &AuthUser,
    requested: &[String],
) -> Result<Vec<String>, ApiError> {
    let mut names: Vec<String> = requested
        .iter()
        .map(|r| r.trim().to_lowercase())
        .filter(|r| !r.is_empty())
        .collect();
    names.sort();
    names.dedup();

    if !auth.is_superadmin() && names.iter().any(|r| r == SystemRole::Superadmin.as_ref()) {
        return Err(ApiError::forbidden("Only a superadmin may grant superadmin"));
    }

    let unknown = missing_roles(pool, &names).await?;
    if !unknown.is_empty() {
        return Err(ApiError::invalid(
            "roles",
            format!("Unknown roles: {}", unknown.join(", ")),
        ));
    }
    Ok(names)
}

async fn roles_by_user(
    pool: &MySqlPool,
    user_ids: &[u64],
) -> Result<HashMap<u64, Vec<String>>, sqlx::Error> {
    let mut roles: HashMap<u64, Vec<String>> = HashMap::new();
    if user_ids.is_empty() {
        return Ok(roles);
    }

    let sql = format!(
        r#"
        SELECT ur.user_id, r.name
        FROM user_roles ur
        JOIN roles r ON r.id = ur.role_id
        WHERE ur.user_id IN ({})
        ORDER BY r.name
        "#,
        in_placeholders(user_ids.len())
    );
    let mut q = sqlx::query_as::<_, (u64, String)>(&sql);
    for id in user_ids {
        q = q.bind(*id);
    }
    for (user_id, role) in q.fetch_all(pool).await? {
        roles.entry(user_id).or_default().push(role);
    }
    Ok(roles)
}

// -------------------- handlers --------------------

#[utoipa::path(
    get,
    path = "/api/users",
    params(UserQuery),
    responses(
        (status = 200, description = "Paginated user list", body = UserPage),
        (status = 403, description = "Missing users.view")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse, ApiError> {
    let business_id = auth.scope_business(query.business_id)?;
    auth.require_permission(pool.get_ref(), perm::USERS_VIEW).await?;

    let pagination = Pagination::new(query.page, query.per_page);

    let mut filters = Filters::new();
    filters
        .eq("business_id", business_id)
        .eq("is_active", query.is_active)
        .search(&["name", "email"], query.search.as_deref());
    if let Some(role) = query.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        filters.raw(
            "id IN (SELECT ur.user_id FROM user_roles ur JOIN roles r ON r.id = ur.role_id WHERE r.name = ?)",
            vec![SqlValue::from(role)],
        );
    }
    let where_clause = filters.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM users{where_clause}");
    debug!(sql = %count_sql, "Counting users");
    let total = bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql), filters.values())
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, sql = %count_sql, "Failed to count users");
            ApiError::Internal
        })?;

    let data_sql =
        format!("SELECT {USER_COLUMNS} FROM users{where_clause} ORDER BY id DESC LIMIT ? OFFSET ?");
    let users = bind_query_as(sqlx::query_as::<_, User>(&data_sql), filters.values())
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, sql = %data_sql, "Failed to fetch users");
            ApiError::Internal
        })?;

    let ids: Vec<u64> = users.iter().map(|u| u.id).collect();
    let mut roles = roles_by_user(pool.get_ref(), &ids).await?;

    let data = users
        .into_iter()
        .map(|u| {
            let user_roles = roles.remove(&u.id).unwrap_or_default();
            UserResponse::new(u, user_roles)
        })
        .collect();

    Ok(HttpResponse::Ok().json(Paginated::new(data, pagination, total)))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    responses(
        (status = 200, body = UserResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let user = fetch_user(pool.get_ref(), user_id).await?;

    if user.id != auth.user_id {
        ensure_same_business(&auth, user.business_id)?;
        auth.require_permission(pool.get_ref(), perm::USERS_VIEW).await?;
    }

    let roles = load_user_roles(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Ok().json(UserResponse::new(user, roles)))
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 403, description = "Forbidden"),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn create_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateUser>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;

    let business_id = auth.scope_business(payload.business_id)?;
    auth.require_permission(pool.get_ref(), perm::USERS_MANAGE).await?;

    let requested = payload
        .roles
        .clone()
        .unwrap_or_else(|| vec![SystemRole::Employee.to_string()]);
    let roles = checked_roles(pool.get_ref(), &auth, &requested).await?;

    let email = email_filter::normalize(&payload.email);
    ensure_email_available(pool.get_ref(), &email).await?;

    let hashed = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        ApiError::Internal
    })?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (business_id, name, email, phone, position, password)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(business_id)
    .bind(payload.name.trim())
    .bind(&email)
    .bind(&payload.phone)
    .bind(&payload.position)
    .bind(&hashed)
    .execute(pool.get_ref())
    .await?;
    let user_id = result.last_insert_id();

    assign_roles(pool.get_ref(), user_id, &roles).await?;

    email_filter::insert(&email);
    email_cache::remember(&email, user_id).await;
    info!(user_id, business_id = ?business_id, by = auth.user_id, "User created");

    let user = user_response(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Created().json(user))
}

#[utoipa::path(
    put,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Field not editable by caller"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateUser>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;

    let user_id = path.into_inner();
    let current = fetch_user(pool.get_ref(), user_id).await?;

    let allowed = if auth.can(pool.get_ref(), perm::USERS_MANAGE).await?
        && ensure_same_business(&auth, current.business_id).is_ok()
    {
        MANAGER_EDITABLE
    } else if current.id == auth.user_id {
        SELF_EDITABLE
    } else {
        return Err(ApiError::forbidden("Cannot edit this user"));
    };

    let mut body = serde_json::to_value(&*payload).map_err(|e| {
        error!(error = %e, "Failed to serialise user update");
        ApiError::Internal
    })?;

    let mut new_email = None;
    if let Some(fields) = body.as_object_mut() {
        if let Some(email) = payload.email.as_deref().map(email_filter::normalize) {
            if email != current.email {
                ensure_email_available(pool.get_ref(), &email).await?;
                new_email = Some(email.clone());
            }
            fields.insert("email".into(), Value::String(email));
        }
        if let Some(password) = payload.password.as_deref() {
            let hashed = hash_password(password).map_err(|e| {
                error!(error = %e, "Password hashing failed");
                ApiError::Internal
            })?;
            fields.insert("password".into(), Value::String(hashed));
        }
    }

    let update = build_update_sql("users", &body, allowed, "id", user_id)?;
    execute_update(pool.get_ref(), update).await?;

    if let Some(email) = new_email {
        email_filter::remove(&current.email);
        email_cache::forget(&current.email).await;
        email_filter::insert(&email);
        email_cache::remember(&email, user_id).await;
    }

    info!(user_id, by = auth.user_id, "User updated");
    let user = user_response(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    delete,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Cannot delete yourself")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn delete_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    if user_id == auth.user_id {
        return Err(ApiError::conflict("You cannot delete your own account"));
    }

    let user = fetch_user(pool.get_ref(), user_id).await?;
    ensure_same_business(&auth, user.business_id)?;
    auth.require_permission(pool.get_ref(), perm::USERS_MANAGE).await?;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;

    email_filter::remove(&user.email);
    email_cache::forget(&user.email).await;
    info!(user_id, by = auth.user_id, "User deleted");

    Ok(HttpResponse::Ok().json(json!({ "message": "User deleted" })))
}

#[utoipa::path(
    put,
    path = "/api/users/{user_id}/roles",
    params(("user_id" = u64, Path, description = "User ID")),
    request_body = SyncRoles,
    responses(
        (status = 200, description = "Roles replaced", body = UserResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
        (status = 422, description = "Unknown role names")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn sync_user_roles(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<SyncRoles>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let user = fetch_user(pool.get_ref(), user_id).await?;
    ensure_same_business(&auth, user.business_id)?;
    auth.require_permission(pool.get_ref(), perm::USERS_MANAGE).await?;

    let roles = checked_roles(pool.get_ref(), &auth, &payload.roles).await?;
    assign_roles(pool.get_ref(), user_id, &roles).await?;
    info!(user_id, roles = ?roles, by = auth.user_id, "User roles synced");

    let current_roles = load_user_roles(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Ok().json(UserResponse::new(user, current_roles)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(roles: &[&str], business_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 10,
            email: "caller@acme.test".into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            business_id,
        }
    }

    #[test]
    fn businessless_users_are_superadmin_territory() {
        let owner = caller(&["owner"], Some(2));
        assert!(ensure_same_business(&owner, Some(2)).is_ok());
        assert!(ensure_same_business(&owner, Some(3)).is_err());
        assert!(ensure_same_business(&owner, None).is_err());

        let root = caller(&["superadmin"], None);
        assert!(ensure_same_business(&root, None).is_ok());
        assert!(ensure_same_business(&root, Some(3)).is_ok());
    }

    #[test]
    fn update_payload_serialises_only_present_fields() {
        let update = UpdateUser {
            name: Some("New Name".into()),
            email: None,
            phone: None,
            position: None,
            is_active: Some(false),
            password: None,
        };
        let value = serde_json::to_value(&update).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["is_active".to_string(), "name".to_string()]);

        // is_active is not in the self-service whitelist
        assert!(build_update_sql("users", &value, SELF_EDITABLE, "id", 1).is_err());
        assert!(build_update_sql("users", &value, MANAGER_EDITABLE, "id", 1).is_ok());
    }

    #[test]
    fn short_passwords_fail_validation() {
        let payload = CreateUser {
            name: "Ann".into(),
            email: "not-an-email".into(),
            password: "short".into(),
            phone: None,
            position: None,
            business_id: None,
            roles: None,
        };
        let errors = payload.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
        assert!(!fields.contains_key("name"));
    }
}
