use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Row as stored. The password hash never leaves the data layer;
/// handlers answer with `api::user::UserResponse`.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: u64,
    pub business_id: Option<u64>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub position: Option<String>,
    #[serde(skip_serializing)]
    pub password: String,
    pub is_active: bool,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
