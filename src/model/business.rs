use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 3,
        "name": "Acme Bakery",
        "email": "hello@acme.test",
        "phone": "+8801712345678",
        "address": "12 Market Street",
        "owner_id": 8,
        "is_active": true,
        "created_at": "2026-01-01T09:00:00",
        "updated_at": "2026-01-01T09:00:00"
    })
)]
pub struct Business {
    pub id: u64,
    pub name: String,
    #[schema(nullable = true)]
    pub email: Option<String>,
    #[schema(nullable = true)]
    pub phone: Option<String>,
    #[schema(nullable = true)]
    pub address: Option<String>,
    #[schema(nullable = true)]
    pub owner_id: Option<u64>,
    pub is_active: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: NaiveDateTime,
}
