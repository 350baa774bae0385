use crate::{
    api::role::load_user_roles,
    auth::{
        auth::AuthUser,
        jwt::{TokenSubject, generate_access_token, generate_refresh_token, verify_token},
        password::verify_password,
    },
    config::Config,
    error::ApiError,
    models::{LoginReqDto, LoginResponse, TokenType, UserSql},
    utils::{
        db_utils::{SqlValue, bind_query_as},
        email_filter::normalize,
    },
};
use actix_web::{HttpRequest, HttpResponse, web};
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};
use validator::Validate;

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

async fn find_user(
    pool: &MySqlPool,
    column: &str,
    value: impl Into<SqlValue>,
) -> Result<Option<UserSql>, ApiError> {
    let sql =
        format!("SELECT id, email, password, business_id, is_active FROM users WHERE {column} = ?");
    bind_query_as(sqlx::query_as::<_, UserSql>(&sql), vec![value.into()])
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Database error while fetching user");
            ApiError::Internal
        })
}

/// Signs an access/refresh pair and records the refresh token's jti.
async fn issue_tokens(
    pool: &MySqlPool,
    config: &Config,
    user: &UserSql,
) -> Result<LoginResponse, ApiError> {
    let roles = load_user_roles(pool, user.id).await?;
    let subject = TokenSubject {
        user_id: user.id,
        email: user.email.clone(),
        roles,
        business_id: user.business_id,
    };

    let signing_failed = |e: jsonwebtoken::errors::Error| {
        error!(error = %e, user_id = user.id, "Failed to sign token");
        ApiError::Internal
    };
    let access_token = generate_access_token(&subject, &config.jwt_secret, config.access_token_ttl)
        .map_err(signing_failed)?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(&subject, &config.jwt_secret, config.refresh_token_ttl)
            .map_err(signing_failed)?;

    debug!(user_id = user.id, jti = %refresh_claims.jti, "Storing refresh token");
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(user.id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to store refresh token");
        ApiError::Internal
    })?;

    Ok(LoginResponse {
        access_token,
        refresh_token,
    })
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair", body = LoginResponse),
        (status = 401, description = "Invalid credentials or inactive account"),
        (status = 422, description = "Validation failed")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, payload),
    fields(email = %payload.email)
)]
pub async fn login(
    payload: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    info!("Login request received");
    payload.validate()?;

    let email = normalize(&payload.email);
    let invalid = || ApiError::Unauthorized("Invalid credentials".into());

    let Some(user) = find_user(pool.get_ref(), "email", email.as_str()).await? else {
        info!("Invalid credentials: user not found");
        return Err(invalid());
    };

    if let Err(e) = verify_password(&payload.password, &user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(invalid());
    }

    if !user.is_active {
        info!(user_id = user.id, "Login refused: account inactive");
        return Err(ApiError::Unauthorized("Account is inactive".into()));
    }

    let tokens = issue_tokens(pool.get_ref(), &config, &user).await?;

    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(user.id)
        .execute(pool.get_ref())
        .await
    {
        // not fatal for the login itself
        error!(error = %e, "Failed to update last_login_at");
    }

    info!(user_id = user.id, "Login successful");
    Ok(HttpResponse::Ok().json(tokens))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Rotated token pair", body = LoginResponse),
        (status = 401, description = "Missing, invalid or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let unauthorized = |msg: &str| ApiError::Unauthorized(msg.to_string());

    let token = bearer(&req).ok_or_else(|| unauthorized("Missing token"))?;
    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| unauthorized("Invalid or expired token"))?;
    if claims.token_type != TokenType::Refresh {
        return Err(unauthorized("Refresh token required"));
    }

    let record = sqlx::query_as::<_, (u64, u64, bool)>(
        "SELECT id, user_id, revoked FROM refresh_tokens WHERE jti = ?",
    )
    .bind(&claims.jti)
    .fetch_optional(pool.get_ref())
    .await?;

    let (token_id, user_id) = match record {
        Some((id, user_id, false)) => (id, user_id),
        _ => return Err(unauthorized("Refresh token revoked")),
    };

    // the conditional update makes a replayed token lose the race
    let revoked = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE id = ? AND revoked = 0")
        .bind(token_id)
        .execute(pool.get_ref())
        .await?;
    if revoked.rows_affected() == 0 {
        return Err(unauthorized("Refresh token revoked"));
    }

    let user = match find_user(pool.get_ref(), "id", user_id).await? {
        Some(user) if user.is_active => user,
        _ => return Err(unauthorized("Account is inactive")),
    };

    let tokens = issue_tokens(pool.get_ref(), &config, &user).await?;
    info!(user_id, "Tokens refreshed");
    Ok(HttpResponse::Ok().json(tokens))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Refresh token revoked, if it existed")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Some(token) = bearer(&req) else {
        return HttpResponse::NoContent().finish();
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    // idempotent
    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}

#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "The authenticated principal", body = AuthUser),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(auth: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(auth)
}
