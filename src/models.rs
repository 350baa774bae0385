use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Deserialize, Validate, ToSchema)]
pub struct LoginReqDto {
    #[schema(example = "owner@acme.test")]
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    #[schema(example = "secret-pass")]
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(FromRow)]
pub struct UserSql {
    pub id: u64, // matches BIGINT UNSIGNED
    pub email: String,
    pub password: String,
    pub business_id: Option<u64>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String,
    pub roles: Vec<String>,
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    /// Absent for superadmins who do not belong to a business
    pub business_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}
